#![allow(dead_code)]

use sqlmark_core::db::{CatalogParameter, Session, SqlValue, StatementOutput};
use sqlmark_core::errors::DbError;
use sqlmark_core::model::{Assignment, RoutineKind};
use std::collections::{HashMap, VecDeque};

/// Scripted session: answers are looked up by the exact (trimmed) statement
/// text. A queue of answers is consumed in order; its last entry repeats.
/// Unscripted statements succeed without a result set.
#[derive(Default)]
pub struct FakeSession {
    responses: HashMap<String, VecDeque<Result<StatementOutput, DbError>>>,
    parameters: HashMap<String, Result<Vec<CatalogParameter>, DbError>>,
    definitions: HashMap<String, Result<String, DbError>>,
    pub executed: Vec<String>,
    pub begins: usize,
    pub rollbacks: usize,
    pub commits: usize,
    pub open_transaction: bool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, sql: &str, out: Result<StatementOutput, DbError>) -> &mut Self {
        self.responses
            .entry(sql.trim().to_string())
            .or_default()
            .push_back(out);
        self
    }

    pub fn rows(&mut self, sql: &str, rows: &[&[&str]]) -> &mut Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|v| SqlValue::Text(v.to_string())).collect())
            .collect();
        self.respond(sql, Ok(StatementOutput::Rows(rows)))
    }

    pub fn fail(&mut self, sql: &str, message: &str) -> &mut Self {
        self.respond(sql, Err(DbError::Engine(message.to_string())))
    }

    /// Catalog rows for `routine`, as `(mode, name, type)` in declaration order.
    pub fn catalog(&mut self, routine: &str, params: &[(&str, &str, &str)]) -> &mut Self {
        let rows = params
            .iter()
            .enumerate()
            .map(|(i, (mode, name, ty))| CatalogParameter {
                ordinal_position: (i + 1) as u32,
                name: Some(name.to_string()),
                mode: Some(mode.to_string()),
                data_type: Some(ty.split('(').next().unwrap_or(ty).to_string()),
                dtd_identifier: Some(ty.to_string()),
            })
            .collect();
        self.parameters.insert(routine.to_string(), Ok(rows));
        self
    }

    pub fn catalog_error(&mut self, routine: &str, message: &str) -> &mut Self {
        self.parameters
            .insert(routine.to_string(), Err(DbError::Engine(message.to_string())));
        self
    }

    pub fn definition(&mut self, routine: &str, create: &str) -> &mut Self {
        self.definitions.insert(routine.to_string(), Ok(create.to_string()));
        self
    }

    pub fn definition_error(&mut self, routine: &str, message: &str) -> &mut Self {
        self.definitions
            .insert(routine.to_string(), Err(DbError::Engine(message.to_string())));
        self
    }

    pub fn executed_matching(&self, prefix: &str) -> Vec<&String> {
        self.executed
            .iter()
            .filter(|s| s.to_ascii_uppercase().starts_with(&prefix.to_ascii_uppercase()))
            .collect()
    }
}

impl Session for FakeSession {
    fn backend(&self) -> &'static str {
        "fake"
    }

    fn execute(&mut self, sql: &str) -> Result<StatementOutput, DbError> {
        let key = sql.trim().to_string();
        self.executed.push(key.clone());
        match self.responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(StatementOutput::Affected(0))),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(StatementOutput::Affected(0))),
            None => Ok(StatementOutput::Affected(0)),
        }
    }

    fn begin(&mut self) -> Result<(), DbError> {
        assert!(!self.open_transaction, "nested transaction");
        self.begins += 1;
        self.open_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.commits += 1;
        self.open_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.rollbacks += 1;
        self.open_transaction = false;
        Ok(())
    }

    fn current_schema(&mut self) -> Result<String, DbError> {
        Ok("grading".to_string())
    }

    fn routine_parameters(
        &mut self,
        _schema: &str,
        routine: &str,
    ) -> Result<Vec<CatalogParameter>, DbError> {
        self.parameters
            .get(routine)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn routine_definition(&mut self, kind: RoutineKind, routine: &str) -> Result<String, DbError> {
        self.definitions.get(routine).cloned().unwrap_or_else(|| {
            Err(DbError::Engine(format!(
                "{} {} does not exist",
                kind.as_sql(),
                routine
            )))
        })
    }
}

pub fn assignment(yaml: &str) -> Assignment {
    serde_yaml::from_str(yaml).expect("test assignment must parse")
}
