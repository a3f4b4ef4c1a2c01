use super::routine::{self, Prepared};
use super::{CandidateSource, GradingSession};
use crate::model::{Observation, ProcedureTest, RoutineSuite};
use crate::probe::to_observation;
use crate::report::{CheckOutcome, CheckStatus, EvaluationReport, TestCaseOutcome};

/// Grades the candidate's stored procedure.
///
/// Each call runs with its check queries in one rolled-back scope, so the
/// checks observe the call's side effects and nothing outlives the test case.
/// Checks run whenever the call itself executed; an erroring call scores 0
/// and skips its checks.
pub fn grade_procedure(
    grading: &mut GradingSession<'_>,
    suite: &RoutineSuite<ProcedureTest>,
    candidate: &dyn CandidateSource,
) -> EvaluationReport {
    let source = match routine::load_and_apply(grading, suite, candidate) {
        Prepared::Ready(source) => source,
        Prepared::Aborted(report) => return report,
    };
    let id = candidate.id();
    let spec = &suite.spec;

    let found = routine::extract(grading.session(), &source, spec.kind, id);
    let mut report = EvaluationReport::new(id, spec.kind, &spec.name, suite.max_marks());
    report.metadata = routine::compare_metadata(spec, &suite.marks, &found);

    for (idx, test) in suite.tests.iter().enumerate() {
        let outcome = run_test_case(grading, idx + 1, test);
        tracing::debug!(
            candidate = id,
            routine = %spec.name,
            statement = %test.call,
            status = outcome.status.label(),
            marks = outcome.marks,
            "procedure test case"
        );
        report.test_cases.push(outcome);
    }

    report.total_marks = crate::scoring::total_marks(&report);
    report
}

fn run_test_case(grading: &mut GradingSession<'_>, index: usize, test: &ProcedureTest) -> TestCaseOutcome {
    let runner = grading.runner();
    let scoped = runner.scope(grading.session(), |scope| {
        let call = scope.run(&test.call);
        let checks = match call {
            Ok(_) => Some(
                test.checks
                    .iter()
                    .map(|c| scope.observe(&c.query))
                    .collect::<Vec<_>>(),
            ),
            Err(_) => None,
        };
        (to_observation(call), checks)
    });

    let (call, checks) = match scoped {
        Ok(parts) => parts,
        Err(e) => (Observation::Error(e.to_string()), None),
    };

    let Some(checks) = checks else {
        return TestCaseOutcome {
            index,
            call: test.call.clone(),
            status: CheckStatus::Failed,
            marks: 0,
            max_marks: test.marks,
            expected: Some(
                test.expected
                    .as_ref()
                    .map_or_else(|| "(not computed)".to_string(), |e| e.to_string()),
            ),
            actual: Some(call.to_string()),
            checks: skipped_checks(test),
        };
    };

    let (status, marks, expected, actual) = routine::score(test.expected.as_ref(), &call, test.marks);
    let checks = test
        .checks
        .iter()
        .zip(checks)
        .enumerate()
        .map(|(i, (check, observed))| {
            let (status, marks, expected, actual) =
                routine::score(check.expected.as_ref(), &observed, check.marks);
            CheckOutcome {
                index: i + 1,
                query: check.query.clone(),
                status,
                marks,
                max_marks: check.marks,
                expected,
                actual,
            }
        })
        .collect();

    TestCaseOutcome {
        index,
        call: test.call.clone(),
        status,
        marks,
        max_marks: test.marks,
        expected,
        actual,
        checks,
    }
}

fn skipped_checks(test: &ProcedureTest) -> Vec<CheckOutcome> {
    test.checks
        .iter()
        .enumerate()
        .map(|(i, check)| CheckOutcome {
            index: i + 1,
            query: check.query.clone(),
            status: CheckStatus::Skipped,
            marks: 0,
            max_marks: check.marks,
            expected: None,
            actual: None,
        })
        .collect()
}
