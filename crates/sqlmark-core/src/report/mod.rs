use crate::model::RoutineKind;
use serde::{Deserialize, Serialize};

pub mod console;
pub mod json;
pub mod junit;
pub mod log;
pub mod marks;

/// Whether a routine (or query script) entered the scoring pipeline at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RoutineStatus {
    Graded,
    /// No source file: neutral, outside scoring.
    NotSubmitted,
    /// The definition could not be applied; distinct from a graded zero.
    NotGradeable { reason: String },
}

impl RoutineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RoutineStatus::Graded => "graded",
            RoutineStatus::NotSubmitted => "not submitted",
            RoutineStatus::NotGradeable { .. } => "not gradeable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// Never evaluated because the enclosing call failed.
    Skipped,
}

impl CheckStatus {
    pub fn from_match(passed: bool) -> Self {
        if passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "Passed",
            CheckStatus::Failed => "Failed",
            CheckStatus::Skipped => "Skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataCheckKind {
    RoutineName,
    RoutineType,
    Parameters,
    ReturnType,
}

impl MetadataCheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            MetadataCheckKind::RoutineName => "Routine Name",
            MetadataCheckKind::RoutineType => "Routine Type",
            MetadataCheckKind::Parameters => "Parameters",
            MetadataCheckKind::ReturnType => "Return Type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCheck {
    pub check: MetadataCheckKind,
    pub status: CheckStatus,
    pub marks: u32,
    pub max_marks: u32,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// 1-based.
    pub index: usize,
    pub query: String,
    pub status: CheckStatus,
    pub marks: u32,
    pub max_marks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    /// 1-based.
    pub index: usize,
    pub call: String,
    pub status: CheckStatus,
    pub marks: u32,
    pub max_marks: u32,
    /// Only recorded for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckOutcome>,
}

impl TestCaseOutcome {
    /// The call and every nested check passed.
    pub fn fully_passed(&self) -> bool {
        self.status == CheckStatus::Passed
            && self.checks.iter().all(|c| c.status == CheckStatus::Passed)
    }
}

/// Outcome of grading one routine kind for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub candidate: String,
    pub kind: RoutineKind,
    pub routine: String,
    pub status: RoutineStatus,
    #[serde(default)]
    pub metadata: Vec<MetadataCheck>,
    #[serde(default)]
    pub test_cases: Vec<TestCaseOutcome>,
    pub total_marks: u32,
    pub max_marks: u32,
}

impl EvaluationReport {
    pub fn new(candidate: &str, kind: RoutineKind, routine: &str, max_marks: u32) -> Self {
        Self {
            candidate: candidate.to_string(),
            kind,
            routine: routine.to_string(),
            status: RoutineStatus::Graded,
            metadata: Vec::new(),
            test_cases: Vec::new(),
            total_marks: 0,
            max_marks,
        }
    }

    pub fn not_submitted(candidate: &str, kind: RoutineKind, routine: &str, max_marks: u32) -> Self {
        Self {
            status: RoutineStatus::NotSubmitted,
            ..Self::new(candidate, kind, routine, max_marks)
        }
    }

    pub fn not_gradeable(
        candidate: &str,
        kind: RoutineKind,
        routine: &str,
        max_marks: u32,
        reason: String,
    ) -> Self {
        Self {
            status: RoutineStatus::NotGradeable { reason },
            ..Self::new(candidate, kind, routine, max_marks)
        }
    }

    pub fn is_graded(&self) -> bool {
        self.status == RoutineStatus::Graded
    }

    /// Graded, and nothing failed.
    pub fn all_passed(&self) -> bool {
        self.is_graded()
            && self.metadata.iter().all(|m| m.status == CheckStatus::Passed)
            && self.test_cases.iter().all(TestCaseOutcome::fully_passed)
    }
}

/// Outcome of one free-form query script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReport {
    pub file: String,
    pub status: RoutineStatus,
    pub outcome: CheckStatus,
    pub marks: u32,
    pub max_marks: u32,
    pub statements: usize,
    /// Per-statement observations; only recorded for failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actual: Vec<String>,
}

impl QueryReport {
    pub fn not_submitted(file: &str, max_marks: u32) -> Self {
        Self {
            file: file.to_string(),
            status: RoutineStatus::NotSubmitted,
            outcome: CheckStatus::Skipped,
            marks: 0,
            max_marks,
            statements: 0,
            expected: Vec::new(),
            actual: Vec::new(),
        }
    }
}

/// Everything graded for one candidate in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<EvaluationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<EvaluationReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<QueryReport>,
    pub total_marks: u32,
    pub max_marks: u32,
}

impl CandidateReport {
    pub fn routines(&self) -> impl Iterator<Item = &EvaluationReport> {
        self.function.iter().chain(self.procedure.iter())
    }

    pub fn full_marks(&self) -> bool {
        self.total_marks == self.max_marks
    }
}

/// Summary of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub assignment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    pub candidates: Vec<CandidateReport>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn all_full_marks(&self) -> bool {
        self.candidates.iter().all(CandidateReport::full_marks)
    }
}
