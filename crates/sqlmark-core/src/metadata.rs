//! Routine metadata read back from the live catalog.

use crate::db::{CatalogParameter, Session};
use crate::errors::{DbError, MetadataError};
use crate::model::{ParamMode, Parameter, RoutineKind};
use regex::Regex;
use std::sync::OnceLock;

/// Sentinel for a creation statement whose return type could not be read.
pub const UNKNOWN_RETURN_TYPE: &str = "unknown";

/// Ordered parameter list of `routine` in `schema`.
///
/// A routine without parameters yields an empty list. The catalog row with
/// ordinal position 0 (a function's return value) is not a parameter.
pub fn extract_parameters(
    session: &mut dyn Session,
    schema: &str,
    routine: &str,
) -> Result<Vec<Parameter>, MetadataError> {
    let mut rows = session.routine_parameters(schema, routine)?;
    rows.sort_by_key(|r| r.ordinal_position);
    rows.into_iter()
        .filter(|r| r.ordinal_position > 0)
        .map(to_parameter)
        .collect()
}

fn to_parameter(row: CatalogParameter) -> Result<Parameter, MetadataError> {
    let mode = ParamMode::from_catalog(row.mode.as_deref()).ok_or_else(|| {
        MetadataError::Catalog(DbError::Engine(format!(
            "unrecognised parameter mode {:?} at position {}",
            row.mode.unwrap_or_default(),
            row.ordinal_position
        )))
    })?;
    let data_type = row
        .dtd_identifier
        .filter(|t| !t.trim().is_empty())
        .or(row.data_type)
        .unwrap_or_default();
    let name = row.name.filter(|n| !n.trim().is_empty());
    Ok(Parameter {
        mode,
        name,
        data_type,
    })
}

/// Declared return type of a function, lowercased.
///
/// Never fails: an unparseable creation statement yields
/// [`UNKNOWN_RETURN_TYPE`] and a catalog failure yields `"error: <message>"`,
/// both of which simply fail the return-type check.
pub fn extract_return_type(session: &mut dyn Session, routine: &str) -> String {
    match session.routine_definition(RoutineKind::Function, routine) {
        Ok(definition) => {
            parse_return_type(&definition).unwrap_or_else(|| UNKNOWN_RETURN_TYPE.to_string())
        }
        Err(e) => format!("error: {}", e),
    }
}

fn returns_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bRETURNS\s+([a-z]+(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?(?:\s+unsigned)?)",
        )
        .unwrap_or_else(|e| panic!("return type pattern: {e}"))
    })
}

/// Extracts the `RETURNS <type>` token from a creation statement.
pub fn parse_return_type(definition: &str) -> Option<String> {
    let caps = returns_re().captures(definition)?;
    Some(crate::model::normalize_type(caps.get(1)?.as_str()))
}

/// Order-sensitive parameter list comparison.
pub fn parameters_match(expected: &[Parameter], actual: &[Parameter]) -> bool {
    expected.len() == actual.len() && expected.iter().zip(actual).all(|(e, a)| e.matches(a))
}

/// Return types compare after the same normalization as parameter types.
pub fn return_types_match(expected: &str, actual: &str) -> bool {
    crate::model::normalize_type(expected) == crate::model::normalize_type(actual)
}
