//! Indented per-candidate execution log.
//!
//! ```text
//! trn01:
//!   function:
//!     Routine Name: Passed (2)
//!     Testcase 1: Failed (0/10)
//!       Call: SELECT get_bonus(5)
//!       Expected: [['150']]
//!       Actual:   [['100']]
//!   procedure: not submitted
//!   q1.txt: Passed (5/5)
//! ```

use super::{CandidateReport, CheckStatus, EvaluationReport, QueryReport, RoutineStatus};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

struct Indented {
    out: String,
}

impl Indented {
    fn line(&mut self, level: usize, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}{}", "  ".repeat(level), text.as_ref());
    }
}

pub fn render_candidate(report: &CandidateReport) -> String {
    let mut log = Indented { out: String::new() };
    log.line(0, format!("{}:", report.candidate));
    for routine in report.routines() {
        render_routine(&mut log, routine);
    }
    for q in &report.queries {
        render_query(&mut log, q);
    }
    log.line(1, format!("total: {}/{}", report.total_marks, report.max_marks));
    log.out
}

fn render_routine(log: &mut Indented, r: &EvaluationReport) {
    let kind = r.kind.label();
    match &r.status {
        RoutineStatus::NotSubmitted => {
            log.line(1, format!("{}: not submitted", kind));
            return;
        }
        RoutineStatus::NotGradeable { reason } => {
            log.line(1, format!("{}: not gradeable", kind));
            log.line(2, format!("Reason: {}", reason));
            return;
        }
        RoutineStatus::Graded if r.all_passed() => {
            log.line(1, format!("{}: execute successfully ({}/{})", kind, r.total_marks, r.max_marks));
            return;
        }
        RoutineStatus::Graded => log.line(1, format!("{}: {}/{}", kind, r.total_marks, r.max_marks)),
    }

    for m in &r.metadata {
        log.line(2, format!("{}: {} ({})", m.check.label(), m.status.label(), m.marks));
        if m.status != CheckStatus::Passed {
            log.line(3, format!("Expected: {}", m.expected));
            log.line(3, format!("Actual:   {}", m.actual));
        }
    }
    for tc in &r.test_cases {
        log.line(
            2,
            format!("Testcase {}: {} ({}/{})", tc.index, tc.status.label(), tc.marks, tc.max_marks),
        );
        if tc.status != CheckStatus::Passed {
            log.line(3, format!("Call: {}", tc.call));
            log.line(3, format!("Expected: {}", tc.expected.as_deref().unwrap_or("")));
            log.line(3, format!("Actual:   {}", tc.actual.as_deref().unwrap_or("")));
        }
        for c in &tc.checks {
            log.line(
                3,
                format!("Check {}: {} ({}/{})", c.index, c.status.label(), c.marks, c.max_marks),
            );
            if c.status == CheckStatus::Failed {
                log.line(4, format!("Query: {}", c.query));
                log.line(4, format!("Expected: {}", c.expected.as_deref().unwrap_or("")));
                log.line(4, format!("Actual:   {}", c.actual.as_deref().unwrap_or("")));
            }
        }
    }
}

fn render_query(log: &mut Indented, q: &QueryReport) {
    match (&q.status, q.outcome) {
        (RoutineStatus::NotSubmitted, _) => log.line(1, format!("{}: not submitted", q.file)),
        (RoutineStatus::NotGradeable { reason }, _) => {
            log.line(1, format!("{}: not gradeable", q.file));
            log.line(2, format!("Reason: {}", reason));
        }
        (_, CheckStatus::Passed) => {
            log.line(1, format!("{}: execute successfully ({}/{})", q.file, q.marks, q.max_marks))
        }
        _ => {
            log.line(1, format!("{}: Failed (0/{})", q.file, q.max_marks));
            log.line(2, "Expected:");
            for e in &q.expected {
                log.line(3, e);
            }
            log.line(2, "Actual:");
            for a in &q.actual {
                log.line(3, a);
            }
        }
    }
}

/// Appends one block per candidate to the log file.
pub fn append_log(reports: &[CandidateReport], path: &Path) -> anyhow::Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for r in reports {
        f.write_all(render_candidate(r).as_bytes())?;
        f.write_all(b"\n")?;
    }
    Ok(())
}
