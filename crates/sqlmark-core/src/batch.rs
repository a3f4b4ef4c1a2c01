//! Batch orchestration: iterate candidates, grade each one, hand the
//! reports to the sinks.
//!
//! Candidates are graded one at a time on a single session. Routines are
//! dropped and recreated per candidate under fixed names, so parallel
//! grading would need one isolated database per worker.

use crate::db::Session;
use crate::engine::{self, CandidateSource, Grader};
use crate::fingerprint::{self, Fingerprint};
use crate::model::Assignment;
use crate::probe::ProbeRunner;
use crate::report::{CandidateReport, RunSummary};
use crate::storage::{RunStatus, Store};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Legacy layout: sources live in `<candidate>/MySQL/`.
const LEGACY_SUBDIR: &str = "MySQL";

/// A candidate backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct Submission {
    id: String,
    dir: PathBuf,
}

impl Submission {
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let legacy = dir.join(LEGACY_SUBDIR);
        let dir = if legacy.is_dir() { legacy } else { dir };
        Self { id: id.into(), dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CandidateSource for Submission {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self, file: &str) -> anyhow::Result<Option<String>> {
        let path = self.dir.join(file);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(text))
    }
}

/// A candidate held in memory.
#[derive(Debug, Clone, Default)]
pub struct InlineSubmission {
    id: String,
    files: BTreeMap<String, String>,
}

impl InlineSubmission {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.files.insert(name.into(), body.into());
        self
    }
}

impl CandidateSource for InlineSubmission {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self, file: &str) -> anyhow::Result<Option<String>> {
        Ok(self.files.get(file).cloned())
    }
}

/// Supplies the candidates of a batch.
pub trait SubmissionSource {
    fn candidates(&self) -> anyhow::Result<Vec<Box<dyn CandidateSource>>>;
}

/// `<root>/<candidate_id>/...`, one directory per candidate, sorted by id.
pub struct DirectorySubmissions {
    root: PathBuf,
}

impl DirectorySubmissions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SubmissionSource for DirectorySubmissions {
    fn candidates(&self) -> anyhow::Result<Vec<Box<dyn CandidateSource>>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to list submissions in {}", self.root.display()))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            if id.starts_with('.') {
                continue;
            }
            dirs.push((id, entry.path()));
        }
        dirs.sort();
        Ok(dirs
            .into_iter()
            .map(|(id, dir)| Box::new(Submission::new(id, dir)) as Box<dyn CandidateSource>)
            .collect())
    }
}

impl SubmissionSource for Vec<InlineSubmission> {
    fn candidates(&self) -> anyhow::Result<Vec<Box<dyn CandidateSource>>> {
        Ok(self
            .iter()
            .cloned()
            .map(|s| Box::new(s) as Box<dyn CandidateSource>)
            .collect())
    }
}

/// Consumes reports as they are produced.
pub trait ReportSink {
    fn begin(&mut self, _assignment: &Assignment, _fingerprint: &Fingerprint) -> anyhow::Result<()> {
        Ok(())
    }

    fn candidate(
        &mut self,
        report: &CandidateReport,
        source_fingerprint: Option<&Fingerprint>,
    ) -> anyhow::Result<()>;

    fn finish(&mut self, _cancelled: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Persists a run to the [`Store`].
pub struct StoreSink {
    store: Store,
    run_id: Option<i64>,
}

impl StoreSink {
    pub fn new(store: Store) -> Self {
        Self { store, run_id: None }
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }
}

impl ReportSink for StoreSink {
    fn begin(&mut self, assignment: &Assignment, fingerprint: &Fingerprint) -> anyhow::Result<()> {
        self.store.init_schema()?;
        self.run_id = Some(self.store.create_run(assignment, fingerprint)?);
        Ok(())
    }

    fn candidate(
        &mut self,
        report: &CandidateReport,
        source_fingerprint: Option<&Fingerprint>,
    ) -> anyhow::Result<()> {
        let run_id = self.run_id.context("store sink used before begin")?;
        self.store
            .insert_candidate_report(run_id, report, source_fingerprint)
    }

    fn finish(&mut self, cancelled: bool) -> anyhow::Result<()> {
        let run_id = self.run_id.context("store sink used before begin")?;
        let status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        self.store.finalize_run(run_id, status)
    }
}

/// Applies the author setup script to the grading database.
pub fn apply_setup(session: &mut dyn Session, assignment: &Assignment) -> anyhow::Result<usize> {
    let Some(path) = assignment.author.as_ref().and_then(|a| a.setup.as_ref()) else {
        anyhow::bail!("config error: --apply-setup needs author.setup in the assignment");
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read setup script {}", path.display()))?;
    let n = engine::apply_script(session, &source)
        .with_context(|| format!("setup script {} failed", path.display()))?;
    tracing::info!(statements = n, path = %path.display(), "setup applied to grading database");
    Ok(n)
}

pub struct BatchRunner<'a> {
    assignment: &'a Assignment,
    runner: ProbeRunner,
    cancel: Arc<AtomicBool>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(assignment: &'a Assignment, runner: ProbeRunner) -> Self {
        Self {
            assignment,
            runner,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops the batch before the next candidate.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    fn source_files(&self) -> Vec<&str> {
        let a = self.assignment;
        let mut files: Vec<&str> = Vec::new();
        if let Some(s) = &a.function {
            files.push(s.source_file_name());
        }
        if let Some(s) = &a.procedure {
            files.push(s.source_file_name());
        }
        files.extend(a.queries.iter().map(|q| q.file.as_str()));
        files
    }

    pub fn run(
        &self,
        session: &mut dyn Session,
        submissions: &dyn SubmissionSource,
        sinks: &mut [&mut dyn ReportSink],
    ) -> anyhow::Result<RunSummary> {
        let fp = fingerprint::assignment(self.assignment)?;
        for sink in sinks.iter_mut() {
            sink.begin(self.assignment, &fp)?;
        }

        let candidates = submissions.candidates()?;
        tracing::info!(
            assignment = %self.assignment.assignment,
            candidates = candidates.len(),
            "batch started"
        );

        let grader = Grader::new(self.assignment, self.runner);
        let files = self.source_files();
        let mut summary = RunSummary {
            assignment: self.assignment.assignment.clone(),
            ..RunSummary::default()
        };

        for candidate in &candidates {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!(
                    graded = summary.candidates.len(),
                    remaining = candidates.len() - summary.candidates.len(),
                    "batch cancelled"
                );
                summary.cancelled = true;
                break;
            }

            let source_fp = match fingerprint::candidate_sources(candidate.as_ref(), &files) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    tracing::warn!(candidate = candidate.id(), error = %e, "could not fingerprint sources");
                    None
                }
            };
            let report = grader.grade(session, candidate.as_ref());
            for sink in sinks.iter_mut() {
                sink.candidate(&report, source_fp.as_ref())
                    .with_context(|| format!("failed to record report for {}", report.candidate))?;
            }
            summary.candidates.push(report);
        }

        for sink in sinks.iter_mut() {
            sink.finish(summary.cancelled)?;
        }
        tracing::info!(
            graded = summary.candidates.len(),
            cancelled = summary.cancelled,
            "batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_mysql_subdirectory_is_used_when_present() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        std::fs::create_dir_all(root.path().join("trn01/MySQL"))?;
        std::fs::write(root.path().join("trn01/MySQL/fun.txt"), "SELECT 1")?;
        std::fs::create_dir_all(root.path().join("trn02"))?;
        std::fs::write(root.path().join("trn02/q1.txt"), "SELECT 2")?;
        std::fs::write(root.path().join("stray.txt"), "ignored")?;

        let candidates = DirectorySubmissions::new(root.path()).candidates()?;
        let ids: Vec<&str> = candidates.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["trn01", "trn02"]);
        assert_eq!(candidates[0].read("fun.txt")?.as_deref(), Some("SELECT 1"));
        assert_eq!(candidates[1].read("q1.txt")?.as_deref(), Some("SELECT 2"));
        assert_eq!(candidates[1].read("fun.txt")?, None);
        Ok(())
    }
}
