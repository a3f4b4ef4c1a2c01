use super::{CandidateSource, GradingSession};
use crate::db::Session;
use crate::model::{Observation, QueryScript};
use crate::probe::ProbeRunner;
use crate::report::{CheckStatus, QueryReport, RoutineStatus};
use crate::script;

/// Runs every statement of `source` inside one rolled-back scope and returns
/// one observation per statement. A scope that cannot be opened (or blows its
/// budget) yields a single error observation.
pub fn observe_script(runner: &ProbeRunner, session: &mut dyn Session, source: &str) -> Vec<Observation> {
    let statements = script::split_statements(source);
    runner
        .scope(session, |scope| {
            statements
                .iter()
                .map(|stmt| scope.observe(stmt))
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|e| vec![Observation::Error(e.to_string())])
}

/// Grades the candidate's query scripts, all-or-nothing per file.
pub fn grade_queries(
    grading: &mut GradingSession<'_>,
    scripts: &[QueryScript],
    candidate: &dyn CandidateSource,
) -> Vec<QueryReport> {
    scripts
        .iter()
        .map(|q| grade_one(grading, q, candidate))
        .collect()
}

fn grade_one(grading: &mut GradingSession<'_>, q: &QueryScript, candidate: &dyn CandidateSource) -> QueryReport {
    let id = candidate.id();
    let source = match candidate.read(&q.file) {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => return QueryReport::not_submitted(&q.file, q.marks),
        Err(e) => {
            tracing::error!(candidate = id, file = %q.file, error = %e, "could not read query script");
            return QueryReport {
                status: RoutineStatus::NotGradeable {
                    reason: format!("could not read {}: {:#}", q.file, e),
                },
                ..QueryReport::not_submitted(&q.file, q.marks)
            };
        }
    };

    let runner = grading.runner();
    let actual = observe_script(&runner, grading.session(), &source);
    let passed = q.expected.as_ref().is_some_and(|e| *e == actual);
    tracing::debug!(
        candidate = id,
        file = %q.file,
        statements = actual.len(),
        status = CheckStatus::from_match(passed).label(),
        "query script"
    );

    let render = |obs: &[Observation]| obs.iter().map(|o| o.to_string()).collect::<Vec<_>>();
    QueryReport {
        file: q.file.clone(),
        status: RoutineStatus::Graded,
        outcome: CheckStatus::from_match(passed),
        marks: if passed { q.marks } else { 0 },
        max_marks: q.marks,
        statements: actual.len(),
        expected: if passed {
            Vec::new()
        } else {
            q.expected.as_deref().map(render).unwrap_or_default()
        },
        actual: if passed { Vec::new() } else { render(&actual) },
    }
}
