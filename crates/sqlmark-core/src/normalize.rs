use crate::db::{Row, StatementOutput};
use crate::model::{CanonicalResult, Observation};

/// Converts engine rows into their canonical, order-independent form.
///
/// Every value is stringified (NULL becomes [`crate::db::NULL_TOKEN`]) and
/// the rows are sorted. An empty input yields `None`: "no rows" and "not
/// applicable" are deliberately the same value downstream.
pub fn normalize(rows: &[Row]) -> Option<CanonicalResult> {
    if rows.is_empty() {
        return None;
    }
    let stringified = rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();
    Some(CanonicalResult::from_rows(stringified))
}

/// Statements without a result set normalize like an empty result.
pub fn normalize_output(output: &StatementOutput) -> Option<CanonicalResult> {
    match output {
        StatementOutput::Rows(rows) => normalize(rows),
        StatementOutput::Affected(_) => None,
    }
}

/// Re-canonicalizes an already canonical value. Used to prove idempotence
/// and to accept hand-written expectations in any row order.
pub fn renormalize(result: &CanonicalResult) -> Option<CanonicalResult> {
    if result.is_empty() {
        return None;
    }
    Some(CanonicalResult::from_rows(result.rows().to_vec()))
}

/// Brings a hand-authored expectation into canonical shape.
pub fn canonical_observation(obs: Observation) -> Observation {
    match obs {
        Observation::Rows(rows) => Observation::from_canonical(renormalize(&rows)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;

    fn rows() -> Vec<Row> {
        vec![
            vec![SqlValue::Int(5), SqlValue::Text("B".into())],
            vec![SqlValue::Int(1), SqlValue::Null],
            vec![SqlValue::Int(3), SqlValue::Text("".into())],
        ]
    }

    #[test]
    fn sorts_and_stringifies() {
        let c = normalize(&rows()).unwrap();
        assert_eq!(
            c.rows(),
            &[
                vec!["1".to_string(), "NULL".to_string()],
                vec!["3".to_string(), "".to_string()],
                vec!["5".to_string(), "B".to_string()],
            ]
        );
    }

    #[test]
    fn permutation_invariant() {
        let base = normalize(&rows());
        let mut reversed = rows();
        reversed.reverse();
        assert_eq!(normalize(&reversed), base);
        let mut rotated = rows();
        rotated.rotate_left(1);
        assert_eq!(normalize(&rotated), base);
    }

    #[test]
    fn idempotent() {
        let once = normalize(&rows()).unwrap();
        let twice = renormalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input_is_the_null_sentinel() {
        // "no rows" and "statement produced no result set" collapse into the
        // same value; a grader cannot tell them apart.
        assert_eq!(normalize(&[]), None);
        assert_eq!(normalize_output(&StatementOutput::Affected(3)), None);
        assert_eq!(normalize_output(&StatementOutput::Rows(vec![])), None);
    }

    #[test]
    fn hand_written_rows_are_sorted() {
        let obs = Observation::Rows(CanonicalResult::from_rows(vec![
            vec!["b".into()],
            vec!["a".into()],
        ]));
        let Observation::Rows(c) = canonical_observation(obs) else {
            panic!("expected rows");
        };
        assert_eq!(c.rows()[0], vec!["a".to_string()]);
    }
}
