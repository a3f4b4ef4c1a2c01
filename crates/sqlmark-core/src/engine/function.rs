use super::routine::{self, Prepared};
use super::{CandidateSource, GradingSession};
use crate::model::{FunctionTest, RoutineSuite};
use crate::report::{EvaluationReport, TestCaseOutcome};

/// Grades the candidate's stored function.
pub fn grade_function(
    grading: &mut GradingSession<'_>,
    suite: &RoutineSuite<FunctionTest>,
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

    let runner = grading.runner();
    for (idx, test) in suite.tests.iter().enumerate() {
        let actual = runner.observe(grading.session(), &test.call);
        let (status, marks, expected, actual) =
            routine::score(test.expected.as_ref(), &actual, test.marks);
        tracing::debug!(
            candidate = id,
            routine = %spec.name,
            statement = %test.call,
            status = status.label(),
            marks,
            "function test case"
        );
        report.test_cases.push(TestCaseOutcome {
            index: idx + 1,
            call: test.call.clone(),
            status,
            marks,
            max_marks: test.marks,
            expected,
            actual,
            checks: Vec::new(),
        });
    }

    report.total_marks = crate::scoring::total_marks(&report);
    report
}
