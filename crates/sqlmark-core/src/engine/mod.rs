//! Routine test execution for one candidate.
//!
//! A candidate run walks `LoadSource -> ApplyDefinition -> ExtractMetadata ->
//! CompareMetadata -> RunTestCases -> Finalize` once per routine kind, then
//! grades the query scripts. Errors are contained at the smallest scope:
//! nothing raised while grading one candidate escapes [`Grader::grade`].

use crate::db::Session;
use crate::errors::DefinitionError;
use crate::model::Assignment;
use crate::probe::ProbeRunner;
use crate::report::CandidateReport;
use crate::script::{self, RoutineDeclaration};
use std::time::Instant;

pub mod author;
pub mod function;
pub mod procedure;
pub mod queries;
mod routine;

/// Where a candidate's files come from.
pub trait CandidateSource {
    fn id(&self) -> &str;

    /// Contents of `file`, or `None` when the candidate did not submit it.
    fn read(&self, file: &str) -> anyhow::Result<Option<String>>;
}

/// Exclusive use of a session for one candidate.
///
/// Routines the candidate declares are dropped again when the grading
/// session ends, so the next candidate starts from the catalog as it was.
pub struct GradingSession<'s> {
    session: &'s mut dyn Session,
    runner: ProbeRunner,
    declared: Vec<RoutineDeclaration>,
}

impl<'s> GradingSession<'s> {
    pub fn new(session: &'s mut dyn Session, runner: ProbeRunner) -> Self {
        runner.install(session);
        Self {
            session,
            runner,
            declared: Vec::new(),
        }
    }

    pub fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    pub fn runner(&self) -> ProbeRunner {
        self.runner
    }

    /// Executes every statement of `source`, in order and outside any probe:
    /// the definition must outlive the probes that call it.
    pub fn apply_definition(&mut self, source: &str) -> Result<usize, DefinitionError> {
        if let Some(decl) = script::routine_declaration(source) {
            if !self.declared.contains(&decl) {
                self.declared.push(decl);
            }
        }
        apply_script(&mut *self.session, source)
    }

    /// Drops the declared routines. Also runs on drop.
    pub fn close(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        for decl in std::mem::take(&mut self.declared) {
            let sql = format!("DROP {} IF EXISTS `{}`", decl.kind.as_sql(), decl.name);
            if let Err(e) = self.session.execute(&sql) {
                tracing::debug!(routine = %decl.name, error = %e, "routine cleanup failed");
            }
        }
    }
}

impl Drop for GradingSession<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Runs a script statement by statement; stops at the first failure.
pub fn apply_script(session: &mut dyn Session, source: &str) -> Result<usize, DefinitionError> {
    let statements = script::split_statements(source);
    for (idx, stmt) in statements.iter().enumerate() {
        session.execute(stmt).map_err(|e| DefinitionError {
            statement: idx + 1,
            message: e.to_string(),
        })?;
    }
    Ok(statements.len())
}

/// Grades candidates against one assignment.
pub struct Grader<'a> {
    assignment: &'a Assignment,
    runner: ProbeRunner,
}

impl<'a> Grader<'a> {
    pub fn new(assignment: &'a Assignment, runner: ProbeRunner) -> Self {
        Self { assignment, runner }
    }

    pub fn assignment(&self) -> &Assignment {
        self.assignment
    }

    pub fn grade(&self, session: &mut dyn Session, candidate: &dyn CandidateSource) -> CandidateReport {
        let started = Instant::now();
        let id = candidate.id().to_string();
        tracing::info!(candidate = %id, "grading candidate");

        let mut grading = GradingSession::new(session, self.runner);
        let function = self
            .assignment
            .function
            .as_ref()
            .map(|suite| function::grade_function(&mut grading, suite, candidate));
        let procedure = self
            .assignment
            .procedure
            .as_ref()
            .map(|suite| procedure::grade_procedure(&mut grading, suite, candidate));
        let queries = queries::grade_queries(&mut grading, &self.assignment.queries, candidate);
        grading.close();

        let mut report = CandidateReport {
            candidate: id,
            function,
            procedure,
            queries,
            total_marks: 0,
            max_marks: self.assignment.max_marks(),
        };
        report.total_marks = crate::scoring::candidate_total(&report);
        tracing::info!(
            candidate = %report.candidate,
            marks = report.total_marks,
            max_marks = report.max_marks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "candidate graded"
        );
        report
    }
}
