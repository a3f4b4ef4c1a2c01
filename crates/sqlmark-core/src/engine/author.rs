//! Computes every `expected` value of an assignment from the author's
//! reference database, with the same probe runner candidates are graded by.

use super::{apply_script, routine};
use crate::db::Session;
use crate::errors::{DbError, MetadataError};
use crate::model::{Assignment, Observation, RoutineSuite};
use crate::probe::{to_observation, ProbeRunner};
use crate::report::CheckStatus;
use anyhow::{bail, Context};
use std::path::Path;

/// A resolved assignment plus everything worth telling the author about it.
#[derive(Debug, Clone)]
pub struct AuthorBuild {
    pub assignment: Assignment,
    pub warnings: Vec<String>,
}

/// Applies the author's setup and reference routines (committed), then
/// fills in every expectation. Existing expectations are recomputed.
pub fn build_expectations(
    session: &mut dyn Session,
    assignment: &Assignment,
    runner: ProbeRunner,
) -> anyhow::Result<AuthorBuild> {
    runner.install(session);
    let sources = assignment.author.clone().unwrap_or_default();
    let mut warnings = Vec::new();

    if let Some(setup) = &sources.setup {
        let (_, n) = apply_file(session, setup, "setup")?;
        tracing::info!(statements = n, path = %setup.display(), "author setup applied");
    }

    let mut resolved = assignment.clone();

    if let Some(suite) = resolved.function.as_mut() {
        let source = match &sources.function_source {
            Some(path) => Some(apply_file(session, path, "function source")?.0),
            None => None,
        };
        if let Some(source) = source {
            check_drift(session, suite, &source, &mut warnings);
        }
        for (idx, test) in suite.tests.iter_mut().enumerate() {
            let observed = runner.observe(session, &test.call);
            if let Observation::Error(msg) = &observed {
                warnings.push(format!("function test {} ({}) raised: {}", idx + 1, test.call, msg));
            }
            test.expected = Some(observed);
        }
    }

    if let Some(suite) = resolved.procedure.as_mut() {
        let source = match &sources.procedure_source {
            Some(path) => Some(apply_file(session, path, "procedure source")?.0),
            None => None,
        };
        if let Some(source) = source {
            check_drift(session, suite, &source, &mut warnings);
        }
        for (idx, test) in suite.tests.iter_mut().enumerate() {
            let queries: Vec<String> = test.checks.iter().map(|c| c.query.clone()).collect();
            let scoped = runner.scope(session, |scope| {
                let call = to_observation(scope.run(&test.call));
                let checks: Vec<Observation> = queries.iter().map(|q| scope.observe(q)).collect();
                (call, checks)
            });
            let (call, checks) = match scoped {
                Ok(parts) => parts,
                Err(e) => {
                    let err = Observation::Error(e.to_string());
                    (err.clone(), vec![err; queries.len()])
                }
            };
            if let Observation::Error(msg) = &call {
                warnings.push(format!(
                    "procedure test {} ({}) raised: {}; candidates cannot score it",
                    idx + 1,
                    test.call,
                    msg
                ));
            }
            test.expected = Some(call);
            for (check, observed) in test.checks.iter_mut().zip(checks) {
                check.expected = Some(observed);
            }
        }
    }

    if !resolved.queries.is_empty() {
        let Some(dir) = sources.queries_dir.as_deref() else {
            bail!("config error: queries are configured but author.queries_dir is not set");
        };
        for q in resolved.queries.iter_mut() {
            let path = dir.join(&q.file);
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read reference query script {}", path.display()))?;
            let observed = super::queries::observe_script(&runner, session, &source);
            if observed.iter().any(Observation::is_error) {
                warnings.push(format!("reference query script {} raised an error", q.file));
            }
            q.expected = Some(observed);
        }
    }

    for w in &warnings {
        tracing::warn!("{}", w);
    }
    Ok(AuthorBuild {
        assignment: resolved,
        warnings,
    })
}

/// Reads and applies an author script; returns its text and statement count.
fn apply_file(session: &mut dyn Session, path: &Path, what: &str) -> anyhow::Result<(String, usize)> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read author {} {}", what, path.display()))?;
    let n = apply_script(session, &source)
        .with_context(|| format!("author {} {} failed", what, path.display()))?;
    Ok((source, n))
}

/// Warns when the author's own routine disagrees with the authored spec.
fn check_drift<T>(
    session: &mut dyn Session,
    suite: &RoutineSuite<T>,
    source: &str,
    warnings: &mut Vec<String>,
) {
    let found = routine::extract(session, source, suite.spec.kind, "author");
    if matches!(
        found.parameters,
        Err(MetadataError::Catalog(DbError::Unsupported { .. }))
    ) {
        tracing::debug!(
            backend = session.backend(),
            "catalog not available; skipping author metadata drift check"
        );
        return;
    }
    for check in routine::compare_metadata(&suite.spec, &suite.marks, &found) {
        if check.status != CheckStatus::Passed {
            warnings.push(format!(
                "{} {}: spec says {}, author routine has {}",
                suite.spec.kind.label(),
                check.check.label(),
                check.expected,
                check.actual
            ));
        }
    }
}
