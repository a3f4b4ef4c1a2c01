use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,
    pub assignment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<RoutineSuite<FunctionTest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<RoutineSuite<ProcedureTest>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<QueryScript>,
}

impl Assignment {
    pub fn is_legacy(&self) -> bool {
        self.version == 0
    }

    pub fn max_marks(&self) -> u32 {
        let function = self.function.as_ref().map(|s| s.max_marks()).unwrap_or(0);
        let procedure = self.procedure.as_ref().map(|s| s.max_marks()).unwrap_or(0);
        let queries: u32 = self.queries.iter().map(|q| q.marks).sum();
        function + procedure + queries
    }

    /// Human-readable locations of every expectation that has not been computed yet.
    pub fn missing_expectations(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if let Some(suite) = &self.function {
            for (idx, t) in suite.tests.iter().enumerate() {
                if t.expected.is_none() {
                    missing.push(format!("function test {} ({})", idx + 1, t.call));
                }
            }
        }
        if let Some(suite) = &self.procedure {
            for (idx, t) in suite.tests.iter().enumerate() {
                if t.expected.is_none() {
                    missing.push(format!("procedure test {} ({})", idx + 1, t.call));
                }
                for (cidx, c) in t.checks.iter().enumerate() {
                    if c.expected.is_none() {
                        missing.push(format!(
                            "procedure test {} check {} ({})",
                            idx + 1,
                            cidx + 1,
                            c.query
                        ));
                    }
                }
            }
        }
        for q in &self.queries {
            if q.expected.is_none() {
                missing.push(format!("query script {}", q.file));
            }
        }
        missing
    }
}

/// Author-side scripts used to compute expectations. Paths are resolved
/// against the assignment file's directory when the config is loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorSources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_source: Option<PathBuf>,
    /// Directory holding the reference version of every `queries` file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineSuite<T> {
    pub spec: RoutineSpec,
    #[serde(default)]
    pub marks: MetadataMarks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default = "Vec::new")]
    pub tests: Vec<T>,
}

impl<T: Marked> RoutineSuite<T> {
    /// Candidate file holding the routine definition.
    pub fn source_file_name(&self) -> &str {
        match &self.source_file {
            Some(f) => f.as_str(),
            None => match self.spec.kind {
                RoutineKind::Function => "fun.txt",
                RoutineKind::Procedure => "proc.txt",
            },
        }
    }

    pub fn max_marks(&self) -> u32 {
        self.marks.total(self.spec.kind) + self.tests.iter().map(|t| t.max_marks()).sum::<u32>()
    }
}

pub trait Marked {
    fn max_marks(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutineKind {
    #[serde(alias = "function", alias = "Function")]
    Function,
    #[serde(alias = "procedure", alias = "Procedure")]
    Procedure,
}

impl RoutineKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNCTION" => Some(RoutineKind::Function),
            "PROCEDURE" => Some(RoutineKind::Procedure),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoutineKind::Function => "function",
            RoutineKind::Procedure => "procedure",
        }
    }
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamMode {
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "OUT", alias = "out")]
    Out,
    #[serde(rename = "INOUT", alias = "inout")]
    InOut,
}

impl ParamMode {
    /// Catalog rows carry no mode for function parameters; those are IN.
    pub fn from_catalog(mode: Option<&str>) -> Option<Self> {
        match mode.map(|m| m.trim().to_ascii_uppercase()) {
            None => Some(ParamMode::In),
            Some(m) if m.is_empty() || m == "IN" => Some(ParamMode::In),
            Some(m) if m == "OUT" => Some(ParamMode::Out),
            Some(m) if m == "INOUT" => Some(ParamMode::InOut),
            Some(_) => None,
        }
    }
}

impl fmt::Display for ParamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamMode::In => "IN",
            ParamMode::Out => "OUT",
            ParamMode::InOut => "INOUT",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub mode: ParamMode,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Parameter {
    pub fn new(mode: ParamMode, name: Option<&str>, data_type: &str) -> Self {
        Self {
            mode,
            name: name.map(str::to_string),
            data_type: data_type.to_string(),
        }
    }

    /// Mode must match exactly; name and type are compared case-insensitively.
    /// An unnamed parameter only matches another unnamed one.
    pub fn matches(&self, other: &Parameter) -> bool {
        let name_eq = match (&self.name, &other.name) {
            (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            (None, None) => true,
            _ => false,
        };
        self.mode == other.mode
            && name_eq
            && normalize_type(&self.data_type) == normalize_type(&other.data_type)
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(n) => write!(f, "{} {} {}", self.mode, n, self.data_type),
            None => write!(f, "{} <unnamed> {}", self.mode, self.data_type),
        }
    }
}

/// Lowercases a declared type and collapses inner whitespace, so that
/// `DECIMAL( 10, 2 )` and `decimal(10,2)` compare equal.
pub fn normalize_type(t: &str) -> String {
    let lowered = t.trim().to_ascii_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut chars = lowered.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            let next = chars.peek().copied();
            let prev = out.chars().last();
            if matches!(next, Some('(' | ')' | ',')) || matches!(prev, Some('(' | ',')) {
                continue;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

pub fn format_parameters(params: &[Parameter]) -> String {
    if params.is_empty() {
        return "(no parameters)".into();
    }
    params
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutineSpec {
    pub name: String,
    pub kind: RoutineKind,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

impl Eq for Parameter {}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataMarks {
    #[serde(default)]
    pub name: u32,
    #[serde(default)]
    pub kind: u32,
    #[serde(default)]
    pub parameters: u32,
    #[serde(default)]
    pub return_type: u32,
}

impl MetadataMarks {
    pub fn total(&self, kind: RoutineKind) -> u32 {
        let base = self.name + self.kind + self.parameters;
        match kind {
            RoutineKind::Function => base + self.return_type,
            RoutineKind::Procedure => base,
        }
    }
}

/// Sorted rows of stringified column values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalResult(Vec<Vec<String>>);

impl CanonicalResult {
    /// Builds a canonical value from rows that are already stringified; the
    /// rows are sorted so the value stays order-independent.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        rows.sort();
        Self(rows)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CanonicalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            for (j, v) in row.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "'{}'", v)?;
            }
            f.write_str("]")?;
        }
        f.write_str("]")
    }
}

/// What a statement produced, in comparable form.
///
/// `NoRows` covers both an empty result set and a statement that produced
/// no result set at all; the two cannot be told apart once observed.
///
/// In YAML and JSON it is written as `{ rows: [...] }`, `no_rows` or
/// `{ error: ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ObservationRepr", into = "ObservationRepr")]
pub enum Observation {
    Rows(CanonicalResult),
    NoRows,
    Error(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ObservationRepr {
    Marker(NoRowsMarker),
    Rows(RowsRepr),
    Error(ErrorRepr),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NoRowsMarker {
    NoRows,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RowsRepr {
    rows: CanonicalResult,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorRepr {
    error: String,
}

impl From<ObservationRepr> for Observation {
    fn from(repr: ObservationRepr) -> Self {
        match repr {
            ObservationRepr::Marker(NoRowsMarker::NoRows) => Observation::NoRows,
            ObservationRepr::Rows(RowsRepr { rows }) => Observation::Rows(rows),
            ObservationRepr::Error(ErrorRepr { error }) => Observation::Error(error),
        }
    }
}

impl From<Observation> for ObservationRepr {
    fn from(obs: Observation) -> Self {
        match obs {
            Observation::NoRows => ObservationRepr::Marker(NoRowsMarker::NoRows),
            Observation::Rows(rows) => ObservationRepr::Rows(RowsRepr { rows }),
            Observation::Error(error) => ObservationRepr::Error(ErrorRepr { error }),
        }
    }
}

impl Observation {
    pub fn from_canonical(result: Option<CanonicalResult>) -> Self {
        match result {
            Some(rows) => Observation::Rows(rows),
            None => Observation::NoRows,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Observation::Error(_))
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Rows(rows) => write!(f, "{}", rows),
            Observation::NoRows => f.write_str("(no rows)"),
            Observation::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTest {
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Observation>,
    #[serde(default)]
    pub marks: u32,
}

impl Marked for FunctionTest {
    fn max_marks(&self) -> u32 {
        self.marks
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureTest {
    pub call: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Observation>,
    #[serde(default)]
    pub marks: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckQuery>,
}

impl Marked for ProcedureTest {
    fn max_marks(&self) -> u32 {
        self.marks + self.checks.iter().map(|c| c.marks).sum::<u32>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Observation>,
    #[serde(default)]
    pub marks: u32,
}

/// A free-form query file graded all-or-nothing against the author's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryScript {
    pub file: String,
    #[serde(default)]
    pub marks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<Observation>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_name_and_type_ignore_case() {
        let a = Parameter::new(ParamMode::In, Some("Emp_Id"), "INT");
        let b = Parameter::new(ParamMode::In, Some("emp_id"), "int");
        let c = Parameter::new(ParamMode::Out, Some("emp_id"), "int");
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn unnamed_parameter_never_matches_named() {
        let named = Parameter::new(ParamMode::In, Some("x"), "int");
        let unnamed = Parameter::new(ParamMode::In, None, "int");
        assert!(!named.matches(&unnamed));
        assert!(unnamed.matches(&unnamed.clone()));
    }

    #[test]
    fn type_whitespace_is_collapsed() {
        assert_eq!(normalize_type("DECIMAL( 10, 2 )"), "decimal(10,2)");
        assert_eq!(normalize_type("  int   unsigned "), "int unsigned");
    }

    #[test]
    fn catalog_mode_defaults_to_in() {
        assert_eq!(ParamMode::from_catalog(None), Some(ParamMode::In));
        assert_eq!(ParamMode::from_catalog(Some("inout")), Some(ParamMode::InOut));
        assert_eq!(ParamMode::from_catalog(Some("sideways")), None);
    }

    #[test]
    fn observation_yaml_shapes() {
        let rows: Observation = serde_yaml::from_str("rows: [['150']]").unwrap();
        assert_eq!(
            rows,
            Observation::Rows(CanonicalResult::from_rows(vec![vec!["150".into()]]))
        );
        let none: Observation = serde_yaml::from_str("no_rows").unwrap();
        assert_eq!(none, Observation::NoRows);
        let err: Observation = serde_yaml::from_str("error: boom").unwrap();
        assert_eq!(err, Observation::Error("boom".into()));
    }

    #[test]
    fn observation_writes_the_shape_it_reads() {
        let obs = Observation::Rows(CanonicalResult::from_rows(vec![vec!["1".into()]]));
        let yaml = serde_yaml::to_string(&obs).unwrap();
        assert!(!yaml.contains('!'), "{yaml}");
        assert_eq!(serde_yaml::from_str::<Observation>(&yaml).unwrap(), obs);

        assert_eq!(
            serde_json::to_string(&Observation::Error("x".into())).unwrap(),
            r#"{"error":"x"}"#
        );
        assert_eq!(serde_json::to_string(&Observation::NoRows).unwrap(), r#""no_rows""#);
    }

    #[test]
    fn observation_rejects_mixed_keys() {
        assert!(serde_yaml::from_str::<Observation>("{ rows: [], error: boom }").is_err());
    }

    #[test]
    fn canonical_result_displays_like_a_row_list() {
        let r = CanonicalResult::from_rows(vec![
            vec!["5".into(), "B".into()],
            vec!["1".into(), "A".into()],
        ]);
        assert_eq!(r.to_string(), "[['1', 'A'], ['5', 'B']]");
    }

    #[test]
    fn procedure_max_marks_includes_checks() {
        let t = ProcedureTest {
            call: "CALL p()".into(),
            expected: None,
            marks: 4,
            checks: vec![
                CheckQuery {
                    query: "SELECT 1".into(),
                    expected: None,
                    marks: 2,
                },
                CheckQuery {
                    query: "SELECT 2".into(),
                    expected: None,
                    marks: 3,
                },
            ],
        };
        assert_eq!(t.max_marks(), 9);
    }
}
