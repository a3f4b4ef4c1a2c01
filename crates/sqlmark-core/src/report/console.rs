use super::{CandidateReport, CheckStatus, EvaluationReport, RoutineStatus};

pub fn print_summary(reports: &[CandidateReport]) {
    let mut full = 0;
    let mut partial = 0;
    let mut not_gradeable = 0;

    for r in reports {
        for routine in r.routines() {
            if let RoutineStatus::NotGradeable { reason } = &routine.status {
                not_gradeable += 1;
                eprintln!(
                    "NOT GRADEABLE [{} {}]: {}",
                    r.candidate,
                    routine.kind.label(),
                    reason
                );
            }
        }
        if r.full_marks() {
            full += 1;
        } else {
            partial += 1;
            for line in failures(r) {
                eprintln!("FAIL [{}]: {}", r.candidate, line);
            }
        }
        eprintln!("{}: {}/{}", r.candidate, r.total_marks, r.max_marks);
    }

    eprintln!(
        "Candidates: {} full={} partial={} not_gradeable={}",
        reports.len(),
        full,
        partial,
        not_gradeable
    );
}

fn failures(r: &CandidateReport) -> Vec<String> {
    let mut out = Vec::new();
    for routine in r.routines() {
        routine_failures(routine, &mut out);
    }
    for q in &r.queries {
        match (&q.status, q.outcome) {
            (RoutineStatus::NotSubmitted, _) => out.push(format!("{}: not submitted", q.file)),
            (_, CheckStatus::Failed) => out.push(format!("{}: output differs", q.file)),
            _ => {}
        }
    }
    out
}

fn routine_failures(routine: &EvaluationReport, out: &mut Vec<String>) {
    let kind = routine.kind.label();
    if routine.status == RoutineStatus::NotSubmitted {
        out.push(format!("{}: not submitted", kind));
        return;
    }
    for m in &routine.metadata {
        if m.status != CheckStatus::Passed {
            out.push(format!(
                "{} {}: expected {}, got {}",
                kind,
                m.check.label(),
                m.expected,
                m.actual
            ));
        }
    }
    for tc in &routine.test_cases {
        if tc.status != CheckStatus::Passed {
            out.push(format!("{} test {} ({})", kind, tc.index, tc.call));
        }
        for c in &tc.checks {
            if c.status == CheckStatus::Failed {
                out.push(format!("{} test {} check {} ({})", kind, tc.index, c.index, c.query));
            }
        }
    }
}
