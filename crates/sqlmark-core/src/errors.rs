use std::fmt;
use std::time::Duration;

/// Failure reported by a database session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// The engine rejected the statement (syntax, constraint, missing object, ...).
    #[error("{0}")]
    Engine(String),
    /// The statement was interrupted after exceeding the session timeout.
    #[error("statement interrupted after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The backend cannot answer this request (e.g. catalog introspection on SQLite).
    #[error("unsupported by {backend}: {what}")]
    Unsupported {
        backend: &'static str,
        what: &'static str,
    },
}

/// Probe-level failure: a call or check query that could not produce a comparable result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{message}")]
    Statement { message: String },
    #[error("probe exceeded {budget_ms}ms (ran {elapsed_ms}ms)")]
    Timeout { budget_ms: u64, elapsed_ms: u64 },
    #[error("could not open transaction: {message}")]
    Transaction { message: String },
    #[error("transaction control statement {keyword} is not allowed here")]
    TransactionControl { keyword: String },
    #[error("statement ended the enclosing transaction; later statements were not run")]
    TransactionClosed,
}

impl ExecutionError {
    pub fn from_db(err: DbError) -> Self {
        match err {
            DbError::Timeout(budget) => ExecutionError::Timeout {
                budget_ms: budget.as_millis() as u64,
                elapsed_ms: budget.as_millis() as u64,
            },
            other => ExecutionError::Statement {
                message: other.to_string(),
            },
        }
    }
}

/// The candidate's routine definition could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("statement {statement} of the definition failed: {message}")]
pub struct DefinitionError {
    /// 1-based position of the failing statement in the source.
    pub statement: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("no CREATE PROCEDURE/FUNCTION declaration found")]
    NoDeclaration,
    #[error("catalog lookup failed: {0}")]
    Catalog(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_probe_timeout() {
        let err = ExecutionError::from_db(DbError::Timeout(Duration::from_millis(250)));
        assert_eq!(
            err,
            ExecutionError::Timeout {
                budget_ms: 250,
                elapsed_ms: 250
            }
        );
    }

    #[test]
    fn engine_error_keeps_original_message() {
        let err = ExecutionError::from_db(DbError::Engine("Unknown column 'x'".into()));
        assert_eq!(err.to_string(), "Unknown column 'x'");
    }

    #[test]
    fn config_error_is_prefixed() {
        let err = ConfigError("no suites".into());
        assert_eq!(err.to_string(), "config error: no suites");
    }
}
