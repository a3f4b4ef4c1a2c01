//! Marks sheet: one CSV row per candidate.

use super::CandidateReport;
use crate::scoring;
use std::collections::BTreeSet;
use std::path::Path;

pub fn render_marks(reports: &[CandidateReport]) -> String {
    let files: BTreeSet<&str> = reports
        .iter()
        .flat_map(|r| r.queries.iter().map(|q| q.file.as_str()))
        .collect();

    let mut header = vec![
        "candidate".to_string(),
        "function".to_string(),
        "procedure".to_string(),
    ];
    header.extend(files.iter().map(|f| format!("{}_res", f)));
    header.push("fun_avg_marks".into());
    header.push("total".into());

    let mut out = String::new();
    push_row(&mut out, &header);

    for r in reports {
        let mut row = vec![
            r.candidate.clone(),
            r.function.as_ref().map_or(0, |f| f.total_marks).to_string(),
            r.procedure.as_ref().map_or(0, |p| p.total_marks).to_string(),
        ];
        for file in &files {
            let marks = r
                .queries
                .iter()
                .find(|q| q.file == *file)
                .map_or(0, |q| q.marks);
            row.push(marks.to_string());
        }
        let avg = r
            .function
            .as_ref()
            .map_or(0.0, scoring::average_marks_per_test_case);
        row.push(format!("{:.2}", avg));
        row.push(r.total_marks.to_string());
        push_row(&mut out, &row);
    }
    out
}

pub fn write_marks(reports: &[CandidateReport], out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, render_marks(reports))?;
    Ok(())
}

fn push_row(out: &mut String, fields: &[String]) {
    let line = fields
        .iter()
        .map(|f| field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

fn field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoutineKind;
    use crate::report::{CheckStatus, EvaluationReport, QueryReport, RoutineStatus, TestCaseOutcome};

    fn query(file: &str, marks: u32) -> QueryReport {
        QueryReport {
            file: file.into(),
            status: RoutineStatus::Graded,
            outcome: CheckStatus::from_match(marks > 0),
            marks,
            max_marks: 5,
            statements: 1,
            expected: vec![],
            actual: vec![],
        }
    }

    #[test]
    fn one_row_per_candidate_with_query_columns() {
        let mut function = EvaluationReport::new("a", RoutineKind::Function, "f", 20);
        for (i, passed) in [true, false, true].into_iter().enumerate() {
            function.test_cases.push(TestCaseOutcome {
                index: i + 1,
                call: format!("SELECT f({})", i),
                status: CheckStatus::from_match(passed),
                marks: if passed { 5 } else { 0 },
                max_marks: 5,
                expected: None,
                actual: None,
                checks: vec![],
            });
        }
        function.total_marks = 10;

        let reports = vec![
            CandidateReport {
                candidate: "a".into(),
                function: Some(function),
                procedure: None,
                queries: vec![query("q2.txt", 5), query("q1.txt", 0)],
                total_marks: 15,
                max_marks: 30,
            },
            CandidateReport {
                candidate: "b, jr".into(),
                function: None,
                procedure: None,
                queries: vec![query("q1.txt", 5)],
                total_marks: 5,
                max_marks: 30,
            },
        ];

        let csv = render_marks(&reports);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "candidate,function,procedure,q1.txt_res,q2.txt_res,fun_avg_marks,total"
        );
        assert_eq!(lines[1], "a,10,0,0,5,3.33,15");
        assert_eq!(lines[2], "\"b, jr\",0,0,5,0,0.00,5");
    }
}
