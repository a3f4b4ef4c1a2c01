use crate::errors::ConfigError;
use crate::model::{Assignment, RoutineKind, RoutineSuite};
use crate::normalize::canonical_observation;
use std::collections::HashSet;
use std::path::Path;

pub mod path_resolver;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

pub fn load_config(path: &Path, strict: bool) -> Result<Assignment, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);

    let mut cfg: Assignment = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // anchors and extension keys are allowed anywhere
    let unknown: Vec<&String> = ignored_keys
        .iter()
        .filter(|k| {
            let leaf = k.rsplit('.').next().unwrap_or(k.as_str());
            leaf != "definitions" && !leaf.starts_with('_') && !leaf.starts_with("x-")
        })
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields detected in strict mode: {:?} (file: {})",
                unknown,
                path.display()
            )));
        }
        tracing::warn!(fields = ?unknown, file = %path.display(), "ignored unknown config fields");
    }

    if cfg.version != 0 && cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: 0, {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }

    if cfg.is_legacy() {
        tracing::warn!(
            file = %path.display(),
            "configVersion 0 is deprecated; set configVersion: {}",
            SUPPORTED_CONFIG_VERSION
        );
    }

    validate(&cfg)?;
    canonicalize_expectations(&mut cfg);
    normalize_paths(&mut cfg, path);
    Ok(cfg)
}

/// Structural checks that serde cannot express.
pub fn validate(cfg: &Assignment) -> Result<(), ConfigError> {
    if cfg.assignment.trim().is_empty() {
        return Err(ConfigError("assignment name is empty".into()));
    }
    if cfg.function.is_none() && cfg.procedure.is_none() && cfg.queries.is_empty() {
        return Err(ConfigError(
            "assignment has no function suite, procedure suite or queries".into(),
        ));
    }

    let mut files = HashSet::new();
    if let Some(suite) = &cfg.function {
        check_suite(suite, RoutineKind::Function)?;
        if suite.spec.return_type.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(ConfigError(format!(
                "function spec {} needs a return_type",
                suite.spec.name
            )));
        }
        for (i, t) in suite.tests.iter().enumerate() {
            require_statement(&t.call, || format!("function test {}", i + 1))?;
        }
        files.insert(suite.source_file_name().to_string());
    }
    if let Some(suite) = &cfg.procedure {
        check_suite(suite, RoutineKind::Procedure)?;
        if suite.spec.return_type.is_some() {
            return Err(ConfigError(format!(
                "procedure spec {} cannot declare a return_type",
                suite.spec.name
            )));
        }
        for (i, t) in suite.tests.iter().enumerate() {
            require_statement(&t.call, || format!("procedure test {}", i + 1))?;
            for (j, c) in t.checks.iter().enumerate() {
                require_statement(&c.query, || format!("procedure test {} check {}", i + 1, j + 1))?;
            }
        }
        if !files.insert(suite.source_file_name().to_string()) {
            return Err(ConfigError(format!(
                "function and procedure share source file {}",
                suite.source_file_name()
            )));
        }
    }
    for q in &cfg.queries {
        if q.file.trim().is_empty() {
            return Err(ConfigError("query script with empty file name".into()));
        }
        if !files.insert(q.file.clone()) {
            return Err(ConfigError(format!("duplicate query file {}", q.file)));
        }
    }
    Ok(())
}

fn check_suite<T: crate::model::Marked>(suite: &RoutineSuite<T>, kind: RoutineKind) -> Result<(), ConfigError> {
    if suite.spec.kind != kind {
        return Err(ConfigError(format!(
            "the {} suite declares spec kind {}",
            kind.label(),
            suite.spec.kind
        )));
    }
    if suite.spec.name.trim().is_empty() {
        return Err(ConfigError(format!("{} spec has no name", kind.label())));
    }
    Ok(())
}

fn require_statement(sql: &str, what: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if sql.trim().is_empty() {
        return Err(ConfigError(format!("{} has an empty statement", what())));
    }
    Ok(())
}

/// Grading needs every expectation; the author builder fills them in.
pub fn require_expectations(cfg: &Assignment) -> Result<(), ConfigError> {
    let missing = cfg.missing_expectations();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfigError(format!(
        "{} expectation(s) not computed yet (run `sqlmark expected` first): {}",
        missing.len(),
        missing.join(", ")
    )))
}

/// Hand-written rows may come in any order.
fn canonicalize_expectations(cfg: &mut Assignment) {
    if let Some(suite) = cfg.function.as_mut() {
        for t in &mut suite.tests {
            t.expected = t.expected.take().map(canonical_observation);
        }
    }
    if let Some(suite) = cfg.procedure.as_mut() {
        for t in &mut suite.tests {
            t.expected = t.expected.take().map(canonical_observation);
            for c in &mut t.checks {
                c.expected = c.expected.take().map(canonical_observation);
            }
        }
    }
    for q in &mut cfg.queries {
        if let Some(list) = q.expected.take() {
            q.expected = Some(list.into_iter().map(canonical_observation).collect());
        }
    }
}

fn normalize_paths(cfg: &mut Assignment, config_path: &Path) {
    let r = path_resolver::PathResolver::new(config_path);
    if let Some(author) = cfg.author.as_mut() {
        r.resolve_opt(&mut author.setup);
        r.resolve_opt(&mut author.function_source);
        r.resolve_opt(&mut author.procedure_source);
        r.resolve_opt(&mut author.queries_dir);
    }
}

/// Writes a resolved assignment (e.g. after the author build). Author paths
/// under the target's directory are written relative to it again.
pub fn save_assignment(cfg: &Assignment, path: &Path) -> Result<(), ConfigError> {
    let mut out = cfg.clone();
    if let Some(author) = out.author.as_mut() {
        let r = path_resolver::PathResolver::new(path);
        r.relativize_opt(&mut author.setup);
        r.relativize_opt(&mut author.function_source);
        r.relativize_opt(&mut author.procedure_source);
        r.relativize_opt(&mut author.queries_dir);
    }
    let body = serde_yaml::to_string(&out)
        .map_err(|e| ConfigError(format!("failed to serialize assignment: {}", e)))?;
    std::fs::write(path, body)
        .map_err(|e| ConfigError(format!("failed to write {}: {}", path.display(), e)))?;
    Ok(())
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

pub const SAMPLE_CONFIG: &str = r#"configVersion: 1
assignment: hr-routines
author:
  setup: author/setup.sql
  function_source: author/fun.txt
  procedure_source: author/proc.txt
  queries_dir: author/queries
function:
  spec:
    name: get_bonus
    kind: FUNCTION
    parameters:
      - { mode: IN, name: p_emp_id, type: int }
    return_type: int
  marks: { name: 2, kind: 2, parameters: 3, return_type: 3 }
  tests:
    - call: SELECT get_bonus(5)
      marks: 10
    - call: SELECT get_bonus(99)
      marks: 5
procedure:
  spec:
    name: raise_salary
    kind: PROCEDURE
    parameters:
      - { mode: IN, name: p_emp_id, type: int }
      - { mode: IN, name: p_pct, type: int }
  marks: { name: 2, kind: 2, parameters: 3 }
  tests:
    - call: CALL raise_salary(5, 10)
      marks: 4
      checks:
        - query: SELECT id, salary FROM emp WHERE id = 5
          marks: 6
queries:
  - file: q1.txt
    marks: 5
"#;
