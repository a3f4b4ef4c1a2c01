use super::{CatalogParameter, Row, Session, SqlValue, StatementOutput};
use crate::errors::DbError;
use crate::model::RoutineKind;
use anyhow::Context;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// SQLite-backed session. SQLite has no stored routines, so catalog
/// introspection reports [`DbError::Unsupported`]; statements, transactions
/// and query-script grading work normally.
pub struct SqliteSession {
    conn: Connection,
    timeout: Option<Duration>,
}

impl SqliteSession {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn,
            timeout: None,
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn,
            timeout: None,
        })
    }

    /// Runs `f`, interrupting the connection if it outlives the timeout.
    fn guarded<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, DbError> {
        let Some(timeout) = self.timeout else {
            return f(&self.conn).map_err(engine_error);
        };

        let handle = self.conn.get_interrupt_handle();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_watchdog = fired.clone();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watchdog = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                fired_in_watchdog.store(true, Ordering::SeqCst);
                handle.interrupt();
            }
        });

        let result = f(&self.conn);
        let _ = done_tx.send(());
        let _ = watchdog.join();

        match result {
            Err(_) if fired.load(Ordering::SeqCst) => Err(DbError::Timeout(timeout)),
            other => other.map_err(engine_error),
        }
    }
}

fn engine_error(e: rusqlite::Error) -> DbError {
    DbError::Engine(e.to_string())
}

fn from_value_ref(v: ValueRef<'_>) -> SqlValue {
    match v {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Bytes(b.to_vec()),
    }
}

fn run_statement(conn: &Connection, sql: &str) -> rusqlite::Result<StatementOutput> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    if columns == 0 {
        let affected = stmt.execute([])?;
        return Ok(StatementOutput::Affected(affected as u64));
    }

    let mut rows = stmt.query([])?;
    let mut out: Vec<Row> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for idx in 0..columns {
            values.push(from_value_ref(row.get_ref(idx)?));
        }
        out.push(values);
    }
    Ok(StatementOutput::Rows(out))
}

impl Session for SqliteSession {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn execute(&mut self, sql: &str) -> Result<StatementOutput, DbError> {
        self.guarded(|conn| run_statement(conn, sql))
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN").map_err(engine_error)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT").map_err(engine_error)
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.conn.is_autocommit() {
            // nothing open; SQLite would report "no transaction is active"
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK").map_err(engine_error)
    }

    fn current_schema(&mut self) -> Result<String, DbError> {
        Ok("main".to_string())
    }

    fn routine_parameters(
        &mut self,
        _schema: &str,
        _routine: &str,
    ) -> Result<Vec<CatalogParameter>, DbError> {
        Err(DbError::Unsupported {
            backend: "sqlite",
            what: "stored routine catalog",
        })
    }

    fn routine_definition(
        &mut self,
        _kind: RoutineKind,
        _routine: &str,
    ) -> Result<String, DbError> {
        Err(DbError::Unsupported {
            backend: "sqlite",
            what: "stored routine definitions",
        })
    }

    fn set_statement_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn in_transaction(&self) -> Option<bool> {
        Some(!self.conn.is_autocommit())
    }
}
