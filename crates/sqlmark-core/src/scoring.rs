//! Mark aggregation. Plain summation: integer marks, no weighting, nothing negative.

use crate::report::{CandidateReport, CheckStatus, EvaluationReport, QueryReport};

/// Σ passed metadata checks + Σ passed test cases + Σ passed check queries.
pub fn total_marks(report: &EvaluationReport) -> u32 {
    let metadata: u32 = report
        .metadata
        .iter()
        .filter(|m| m.status == CheckStatus::Passed)
        .map(|m| m.marks)
        .sum();
    let cases: u32 = report
        .test_cases
        .iter()
        .map(|tc| {
            let own = if tc.status == CheckStatus::Passed { tc.marks } else { 0 };
            own + tc
                .checks
                .iter()
                .filter(|c| c.status == CheckStatus::Passed)
                .map(|c| c.marks)
                .sum::<u32>()
        })
        .sum();
    metadata + cases
}

pub fn query_marks(reports: &[QueryReport]) -> u32 {
    reports
        .iter()
        .filter(|q| q.outcome == CheckStatus::Passed)
        .map(|q| q.marks)
        .sum()
}

pub fn candidate_total(report: &CandidateReport) -> u32 {
    report.routines().map(|r| r.total_marks).sum::<u32>() + query_marks(&report.queries)
}

/// Average marks awarded per test case (own call marks only), rounded to two
/// decimals. 0 when there are no test cases.
pub fn average_marks_per_test_case(report: &EvaluationReport) -> f64 {
    let n = report.test_cases.len();
    if n == 0 {
        return 0.0;
    }
    let awarded: u32 = report
        .test_cases
        .iter()
        .filter(|tc| tc.status == CheckStatus::Passed)
        .map(|tc| tc.marks)
        .sum();
    (f64::from(awarded) / n as f64 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoutineKind;
    use crate::report::{CheckOutcome, MetadataCheck, MetadataCheckKind, TestCaseOutcome};

    fn case(status: CheckStatus, marks: u32, checks: Vec<(CheckStatus, u32)>) -> TestCaseOutcome {
        TestCaseOutcome {
            index: 1,
            call: "CALL p()".into(),
            status,
            marks,
            max_marks: marks,
            expected: None,
            actual: None,
            checks: checks
                .into_iter()
                .enumerate()
                .map(|(i, (status, marks))| CheckOutcome {
                    index: i + 1,
                    query: "SELECT 1".into(),
                    status,
                    marks,
                    max_marks: marks,
                    expected: None,
                    actual: None,
                })
                .collect(),
        }
    }

    fn report(cases: Vec<TestCaseOutcome>) -> EvaluationReport {
        let mut r = EvaluationReport::new("c1", RoutineKind::Procedure, "p", 100);
        r.metadata.push(MetadataCheck {
            check: MetadataCheckKind::RoutineName,
            status: CheckStatus::Passed,
            marks: 2,
            max_marks: 2,
            expected: "p".into(),
            actual: "p".into(),
        });
        r.metadata.push(MetadataCheck {
            check: MetadataCheckKind::Parameters,
            status: CheckStatus::Failed,
            marks: 0,
            max_marks: 3,
            expected: "(no parameters)".into(),
            actual: "IN x int".into(),
        });
        r.test_cases = cases;
        r
    }

    #[test]
    fn sums_only_passed_items() {
        let r = report(vec![
            case(CheckStatus::Passed, 4, vec![(CheckStatus::Failed, 0), (CheckStatus::Passed, 3)]),
            case(CheckStatus::Failed, 0, vec![(CheckStatus::Passed, 2)]),
        ]);
        assert_eq!(total_marks(&r), 2 + 4 + 3 + 2);
    }

    #[test]
    fn average_guards_empty() {
        assert_eq!(average_marks_per_test_case(&report(vec![])), 0.0);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        let r = report(vec![
            case(CheckStatus::Passed, 10, vec![]),
            case(CheckStatus::Failed, 0, vec![]),
            case(CheckStatus::Failed, 0, vec![]),
        ]);
        assert_eq!(average_marks_per_test_case(&r), 3.33);
    }
}
