use super::{CandidateSource, GradingSession};
use crate::db::Session;
use crate::errors::MetadataError;
use crate::metadata;
use crate::model::{
    format_parameters, Marked, MetadataMarks, Observation, Parameter, RoutineKind, RoutineSpec,
    RoutineSuite,
};
use crate::report::{CheckStatus, EvaluationReport, MetadataCheck, MetadataCheckKind};
use crate::script::{self, RoutineDeclaration};

/// Result of the `LoadSource` and `ApplyDefinition` steps.
pub(crate) enum Prepared {
    Ready(String),
    Aborted(EvaluationReport),
}

pub(crate) fn load_and_apply<T: Marked>(
    grading: &mut GradingSession<'_>,
    suite: &RoutineSuite<T>,
    candidate: &dyn CandidateSource,
) -> Prepared {
    let id = candidate.id();
    let spec = &suite.spec;
    let max = suite.max_marks();
    let file = suite.source_file_name();

    let source = match candidate.read(file) {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::info!(candidate = id, kind = spec.kind.label(), file, "no submission");
            return Prepared::Aborted(EvaluationReport::not_submitted(id, spec.kind, &spec.name, max));
        }
        Err(e) => {
            tracing::error!(candidate = id, file, error = %e, "could not read submission");
            return Prepared::Aborted(EvaluationReport::not_gradeable(
                id,
                spec.kind,
                &spec.name,
                max,
                format!("could not read {}: {:#}", file, e),
            ));
        }
    };

    match grading.apply_definition(&source) {
        Ok(n) => {
            tracing::debug!(candidate = id, kind = spec.kind.label(), statements = n, "definition applied");
            Prepared::Ready(source)
        }
        Err(e) => {
            tracing::error!(candidate = id, kind = spec.kind.label(), error = %e, "definition rejected");
            Prepared::Aborted(EvaluationReport::not_gradeable(
                id,
                spec.kind,
                &spec.name,
                max,
                e.to_string(),
            ))
        }
    }
}

/// What the catalog says about the candidate's routine.
pub(crate) struct ExtractedMetadata {
    pub declaration: Option<RoutineDeclaration>,
    pub parameters: Result<Vec<Parameter>, MetadataError>,
    /// Functions only.
    pub return_type: Option<String>,
}

pub(crate) fn extract(
    session: &mut dyn Session,
    source: &str,
    kind: RoutineKind,
    candidate: &str,
) -> ExtractedMetadata {
    let Some(declaration) = script::routine_declaration(source) else {
        tracing::warn!(candidate, kind = kind.label(), "no routine declaration recognised");
        let return_type = (kind == RoutineKind::Function)
            .then(|| format!("error: {}", MetadataError::NoDeclaration));
        return ExtractedMetadata {
            declaration: None,
            parameters: Err(MetadataError::NoDeclaration),
            return_type,
        };
    };

    let parameters = session
        .current_schema()
        .map_err(MetadataError::from)
        .and_then(|schema| metadata::extract_parameters(session, &schema, &declaration.name));
    let return_type = (kind == RoutineKind::Function)
        .then(|| metadata::extract_return_type(session, &declaration.name));

    ExtractedMetadata {
        declaration: Some(declaration),
        parameters,
        return_type,
    }
}

/// Independent pass/fail checks for name, kind, parameters and (functions)
/// return type.
pub(crate) fn compare_metadata(
    spec: &RoutineSpec,
    marks: &MetadataMarks,
    found: &ExtractedMetadata,
) -> Vec<MetadataCheck> {
    let mut checks = Vec::with_capacity(4);

    let actual_name = found
        .declaration
        .as_ref()
        .map(|d| d.name.clone())
        .unwrap_or_else(|| "unknown".to_string());
    checks.push(check(
        MetadataCheckKind::RoutineName,
        actual_name == spec.name,
        marks.name,
        spec.name.clone(),
        actual_name,
    ));

    let actual_kind = found.declaration.as_ref().map(|d| d.kind);
    checks.push(check(
        MetadataCheckKind::RoutineType,
        actual_kind == Some(spec.kind),
        marks.kind,
        spec.kind.to_string(),
        actual_kind.map_or_else(|| "unknown".to_string(), |k| k.to_string()),
    ));

    let (params_ok, actual_params) = match &found.parameters {
        Ok(params) => (
            metadata::parameters_match(&spec.parameters, params),
            format_parameters(params),
        ),
        Err(e) => (false, format!("error: {}", e)),
    };
    checks.push(check(
        MetadataCheckKind::Parameters,
        params_ok,
        marks.parameters,
        format_parameters(&spec.parameters),
        actual_params,
    ));

    if spec.kind == RoutineKind::Function {
        let expected = spec.return_type.clone().unwrap_or_default();
        let actual = found.return_type.clone().unwrap_or_default();
        let ok = spec.return_type.is_some() && metadata::return_types_match(&expected, &actual);
        checks.push(check(
            MetadataCheckKind::ReturnType,
            ok,
            marks.return_type,
            expected.to_ascii_lowercase(),
            actual,
        ));
    }
    checks
}

fn check(
    kind: MetadataCheckKind,
    passed: bool,
    marks: u32,
    expected: String,
    actual: String,
) -> MetadataCheck {
    MetadataCheck {
        check: kind,
        status: CheckStatus::from_match(passed),
        marks: if passed { marks } else { 0 },
        max_marks: marks,
        expected,
        actual,
    }
}

/// Compares an observation with its expectation. An expectation that was
/// never computed fails the comparison.
pub(crate) fn score(
    expected: Option<&Observation>,
    actual: &Observation,
    marks: u32,
) -> (CheckStatus, u32, Option<String>, Option<String>) {
    let passed = expected.is_some_and(|e| e == actual);
    if passed {
        (CheckStatus::Passed, marks, None, None)
    } else {
        (
            CheckStatus::Failed,
            0,
            Some(expected.map_or_else(|| "(not computed)".to_string(), |e| e.to_string())),
            Some(actual.to_string()),
        )
    }
}
