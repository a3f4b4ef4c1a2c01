use super::{CatalogParameter, Row, Session, SqlValue, StatementOutput};
use crate::errors::DbError;
use crate::model::RoutineKind;
use anyhow::Context;
use mysql::prelude::Queryable;
use mysql::{Conn, Opts, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// ER_QUERY_TIMEOUT: "maximum statement execution time exceeded".
const ER_QUERY_TIMEOUT: u16 = 3024;

/// MySQL-backed session.
///
/// `max_execution_time` only bounds read-only SELECTs, so every statement run
/// under a timeout is also watched from a second connection that issues
/// `KILL QUERY` once the budget is spent.
pub struct MySqlSession {
    conn: Conn,
    opts: Opts,
    timeout: Option<Duration>,
}

impl MySqlSession {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let opts = Opts::from_url(url).context("invalid mysql url")?;
        let conn = Conn::new(opts.clone()).context("failed to connect to mysql")?;
        Ok(Self {
            conn,
            opts,
            timeout: None,
        })
    }

    /// Runs `f`, killing the running statement if it outlives the timeout.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Conn) -> mysql::Result<T>,
    ) -> Result<T, DbError> {
        let Some(timeout) = self.timeout else {
            return f(&mut self.conn).map_err(|e| self.map_err(e));
        };

        let connection_id = self.conn.connection_id();
        let opts = self.opts.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_watchdog = fired.clone();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watchdog = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                fired_in_watchdog.store(true, Ordering::SeqCst);
                let killed = Conn::new(opts)
                    .and_then(|mut killer| killer.query_drop(format!("KILL QUERY {}", connection_id)));
                if let Err(e) = killed {
                    tracing::warn!(connection_id, error = %e, "could not kill runaway statement");
                }
            }
        });

        let result = f(&mut self.conn);
        let _ = done_tx.send(());
        let _ = watchdog.join();

        match result {
            Err(_) if fired.load(Ordering::SeqCst) => Err(DbError::Timeout(timeout)),
            other => other.map_err(|e| self.map_err(e)),
        }
    }

    fn map_err(&self, e: mysql::Error) -> DbError {
        match (&e, self.timeout) {
            (mysql::Error::MySqlError(server), Some(t)) if server.code == ER_QUERY_TIMEOUT => {
                DbError::Timeout(t)
            }
            _ => DbError::Engine(e.to_string()),
        }
    }
}

fn from_value(v: Value) -> SqlValue {
    match v {
        Value::NULL => SqlValue::Null,
        Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => SqlValue::UInt(u),
        Value::Float(f) => SqlValue::Float(f as f64),
        Value::Double(d) => SqlValue::Float(d),
        Value::Date(y, m, d, 0, 0, 0, 0) => SqlValue::Text(format!("{:04}-{:02}-{:02}", y, m, d)),
        Value::Date(y, m, d, hh, mm, ss, us) => {
            let mut s = format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, hh, mm, ss);
            if us > 0 {
                s.push_str(&format!(".{:06}", us));
            }
            SqlValue::Text(s)
        }
        Value::Time(neg, days, hh, mm, ss, us) => {
            let hours = days * 24 + hh as u32;
            let sign = if neg { "-" } else { "" };
            let mut s = format!("{}{}:{:02}:{:02}", sign, hours, mm, ss);
            if us > 0 {
                s.push_str(&format!(".{:06}", us));
            }
            SqlValue::Text(s)
        }
    }
}

impl Session for MySqlSession {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    /// Returns the first result set that has columns; a CALL that selects
    /// nothing yields `Affected`.
    fn execute(&mut self, sql: &str) -> Result<StatementOutput, DbError> {
        self.guarded(|conn| {
            let mut result = conn.query_iter(sql)?;
            let mut first: Option<Vec<Row>> = None;
            let mut affected = 0u64;
            while let Some(set) = result.iter() {
                let has_columns = !set.columns().as_ref().is_empty();
                affected += set.affected_rows();
                let mut rows = Vec::new();
                for row in set {
                    let row = row?;
                    rows.push(mysql::Row::unwrap(row).into_iter().map(from_value).collect());
                }
                if has_columns && first.is_none() {
                    first = Some(rows);
                }
            }
            Ok(match first {
                Some(rows) => StatementOutput::Rows(rows),
                None => StatementOutput::Affected(affected),
            })
        })
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn
            .query_drop("START TRANSACTION")
            .map_err(|e| self.map_err(e))
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("COMMIT").map_err(|e| self.map_err(e))
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("ROLLBACK").map_err(|e| self.map_err(e))
    }

    fn current_schema(&mut self) -> Result<String, DbError> {
        let db: Option<Option<String>> = self
            .conn
            .query_first("SELECT DATABASE()")
            .map_err(|e| self.map_err(e))?;
        db.flatten()
            .ok_or_else(|| DbError::Engine("no database selected".into()))
    }

    fn routine_parameters(
        &mut self,
        schema: &str,
        routine: &str,
    ) -> Result<Vec<CatalogParameter>, DbError> {
        self.conn
            .exec_map(
                "SELECT ORDINAL_POSITION, PARAMETER_NAME, PARAMETER_MODE, DATA_TYPE, DTD_IDENTIFIER
                 FROM INFORMATION_SCHEMA.PARAMETERS
                 WHERE SPECIFIC_SCHEMA = ? AND SPECIFIC_NAME = ?
                 ORDER BY ORDINAL_POSITION",
                (schema, routine),
                |(ordinal_position, name, mode, data_type, dtd_identifier): (
                    u32,
                    Option<String>,
                    Option<String>,
                    Option<String>,
                    Option<String>,
                )| CatalogParameter {
                    ordinal_position,
                    name,
                    mode,
                    data_type,
                    dtd_identifier,
                },
            )
            .map_err(|e| self.map_err(e))
    }

    fn routine_definition(&mut self, kind: RoutineKind, routine: &str) -> Result<String, DbError> {
        let sql = format!("SHOW CREATE {} `{}`", kind.as_sql(), routine.replace('`', ""));
        let row: Option<mysql::Row> = self.conn.query_first(sql).map_err(|e| self.map_err(e))?;
        // columns: name, sql_mode, Create Function|Procedure, ...
        row.and_then(|r| r.get::<Option<String>, usize>(2))
            .flatten()
            .ok_or_else(|| {
                DbError::Engine(format!(
                    "no creation statement visible for {} {}",
                    kind.as_sql(),
                    routine
                ))
            })
    }

    fn set_statement_timeout(&mut self, timeout: Option<Duration>) {
        let ms = timeout.map(|t| t.as_millis() as u64).unwrap_or(0);
        if let Err(e) = self
            .conn
            .query_drop(format!("SET SESSION max_execution_time = {}", ms))
        {
            tracing::warn!(error = %e, "could not set max_execution_time; relying on probe budget");
        }
        self.timeout = timeout;
    }
}
