//! Transactional probes.
//!
//! Every probe runs between `begin` and an unconditional `rollback`, so a
//! candidate statement never leaves committed state behind, whatever it
//! does. A rollback failure is logged and never replaces the outcome.

use crate::db::Session;
use crate::errors::ExecutionError;
use crate::model::{CanonicalResult, Observation};
use crate::normalize::normalize_output;
use crate::script;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeRunner {
    timeout: Option<Duration>,
}

impl ProbeRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Pushes the per-statement timeout down to the session. Called once when
    /// a session is handed to the runner.
    pub fn install(&self, session: &mut dyn Session) {
        session.set_statement_timeout(self.timeout);
    }

    /// Runs one statement in its own rolled-back transaction.
    pub fn probe(
        &self,
        session: &mut dyn Session,
        statement: &str,
    ) -> Result<Option<CanonicalResult>, ExecutionError> {
        self.scope(session, |scope| scope.run(statement))
            .and_then(|inner| inner)
    }

    /// Like [`ProbeRunner::probe`], folded into an [`Observation`].
    pub fn observe(&self, session: &mut dyn Session, statement: &str) -> Observation {
        to_observation(self.probe(session, statement))
    }

    /// Opens a transaction, hands a [`ProbeScope`] to `body`, then rolls back.
    ///
    /// Statements inside one scope see each other's effects (a procedure call
    /// and its check queries), and none of them survive the scope. The whole
    /// scope, rollback included, is measured against the timeout budget.
    pub fn scope<T>(
        &self,
        session: &mut dyn Session,
        body: impl FnOnce(&mut ProbeScope<'_>) -> T,
    ) -> Result<T, ExecutionError> {
        session
            .begin()
            .map_err(|e| ExecutionError::Transaction {
                message: e.to_string(),
            })?;

        let started = Instant::now();
        let out = {
            let mut scope = ProbeScope {
                session: &mut *session,
                closed: false,
            };
            body(&mut scope)
        };

        if let Err(e) = session.rollback() {
            tracing::warn!(
                backend = session.backend(),
                error = %e,
                "rollback after probe failed"
            );
        }

        let elapsed = started.elapsed();
        if let Some(budget) = self.timeout {
            if elapsed > budget {
                return Err(ExecutionError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }
        }
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "probe scope closed");
        Ok(out)
    }
}

/// Statement access inside an open probe transaction.
///
/// Statements that would end the transaction are refused. If the backend
/// reports the transaction closed anyway, the scope stops running statements.
pub struct ProbeScope<'a> {
    session: &'a mut dyn Session,
    closed: bool,
}

impl ProbeScope<'_> {
    pub fn run(&mut self, statement: &str) -> Result<Option<CanonicalResult>, ExecutionError> {
        if self.closed {
            return Err(ExecutionError::TransactionClosed);
        }
        if let Some(keyword) = script::transaction_control(statement) {
            tracing::warn!(statement, "transaction control refused inside probe");
            return Err(ExecutionError::TransactionControl { keyword });
        }

        let result = self.session.execute(statement);
        if self.session.in_transaction() == Some(false) {
            self.closed = true;
            tracing::error!(statement, "statement ended the probe transaction");
            return Err(ExecutionError::TransactionClosed);
        }
        let output = result.map_err(ExecutionError::from_db)?;
        tracing::debug!(statement, "probe statement executed");
        Ok(normalize_output(&output))
    }

    pub fn observe(&mut self, statement: &str) -> Observation {
        to_observation(self.run(statement))
    }
}

pub fn to_observation(result: Result<Option<CanonicalResult>, ExecutionError>) -> Observation {
    match result {
        Ok(rows) => Observation::from_canonical(rows),
        Err(e) => Observation::Error(e.to_string()),
    }
}
