use super::{CandidateReport, CheckStatus, EvaluationReport, RoutineStatus};
use std::path::Path;

/// One `<testsuite>` per candidate; every metadata check, test case, check
/// query and query script is a `<testcase>`.
pub fn write_junit(assignment: &str, reports: &[CandidateReport], out: &Path) -> anyhow::Result<()> {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(r#"<testsuites name="{}">"#, escape(assignment)));
    xml.push('\n');

    for r in reports {
        xml.push_str(&format!(
            r#"  <testsuite name="{}" marks="{}" max_marks="{}">"#,
            escape(&r.candidate),
            r.total_marks,
            r.max_marks
        ));
        xml.push('\n');
        for routine in r.routines() {
            routine_cases(routine, &mut xml);
        }
        for q in &r.queries {
            let name = format!("query {}", q.file);
            let body = match (&q.status, q.outcome) {
                (RoutineStatus::NotSubmitted, _) => skipped("not submitted"),
                (RoutineStatus::NotGradeable { reason }, _) => error(reason),
                (_, CheckStatus::Failed) => failure(&format!(
                    "expected {:?}, got {:?}",
                    q.expected, q.actual
                )),
                _ => String::new(),
            };
            case(&mut xml, &name, &body);
        }
        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    std::fs::write(out, xml)?;
    Ok(())
}

fn routine_cases(routine: &EvaluationReport, xml: &mut String) {
    let kind = routine.kind.label();
    match &routine.status {
        RoutineStatus::NotSubmitted => {
            case(xml, kind, &skipped("not submitted"));
            return;
        }
        RoutineStatus::NotGradeable { reason } => {
            case(xml, kind, &error(reason));
            return;
        }
        RoutineStatus::Graded => {}
    }
    for m in &routine.metadata {
        let body = if m.status == CheckStatus::Passed {
            String::new()
        } else {
            failure(&format!("expected {}, got {}", m.expected, m.actual))
        };
        case(xml, &format!("{} {}", kind, m.check.label()), &body);
    }
    for tc in &routine.test_cases {
        let body = match tc.status {
            CheckStatus::Passed => String::new(),
            _ => failure(&format!(
                "expected {}, got {}",
                tc.expected.as_deref().unwrap_or(""),
                tc.actual.as_deref().unwrap_or("")
            )),
        };
        case(xml, &format!("{} test {}: {}", kind, tc.index, tc.call), &body);
        for c in &tc.checks {
            let body = match c.status {
                CheckStatus::Passed => String::new(),
                CheckStatus::Skipped => skipped("call failed"),
                CheckStatus::Failed => failure(&format!(
                    "expected {}, got {}",
                    c.expected.as_deref().unwrap_or(""),
                    c.actual.as_deref().unwrap_or("")
                )),
            };
            case(
                xml,
                &format!("{} test {} check {}: {}", kind, tc.index, c.index, c.query),
                &body,
            );
        }
    }
}

fn case(xml: &mut String, name: &str, body: &str) {
    xml.push_str(&format!(r#"    <testcase name="{}">"#, escape(name)));
    xml.push_str(body);
    xml.push_str("</testcase>\n");
}

fn skipped(message: &str) -> String {
    format!(r#"<skipped message="{}"/>"#, escape(message))
}

fn failure(message: &str) -> String {
    format!(r#"<failure message="{}"/>"#, escape(message))
}

fn error(message: &str) -> String {
    format!(r#"<error message="{}"/>"#, escape(message))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
