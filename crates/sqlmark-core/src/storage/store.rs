use crate::fingerprint::Fingerprint;
use crate::model::Assignment;
use crate::report::CandidateReport;
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Run history: one row per batch run, one per graded candidate.
#[derive(Clone)]
pub struct Store {
    pub conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub id: i64,
    pub assignment: String,
    pub assignment_fingerprint: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open run store {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("run store lock poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn create_run(&self, cfg: &Assignment, fingerprint: &Fingerprint) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs(assignment, assignment_fingerprint, started_at, status, config_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cfg.assignment,
                fingerprint.hex,
                now_rfc3339(),
                RunStatus::Running.as_str(),
                serde_json::to_string(cfg)?
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finalize_run(&self, run_id: i64, status: RunStatus) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET status=?1, finished_at=?2 WHERE id=?3",
            params![status.as_str(), now_rfc3339(), run_id],
        )?;
        if n == 0 {
            anyhow::bail!("run {} does not exist", run_id);
        }
        Ok(())
    }

    pub fn insert_candidate_report(
        &self,
        run_id: i64,
        report: &CandidateReport,
        source_fingerprint: Option<&Fingerprint>,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO candidate_reports(run_id, candidate, total_marks, max_marks, source_fingerprint, report_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id, candidate) DO UPDATE SET
               total_marks=excluded.total_marks,
               max_marks=excluded.max_marks,
               source_fingerprint=excluded.source_fingerprint,
               report_json=excluded.report_json",
            params![
                run_id,
                report.candidate,
                report.total_marks,
                report.max_marks,
                source_fingerprint.map(|f| f.hex.as_str()),
                serde_json::to_string(report)?
            ],
        )?;
        Ok(())
    }

    pub fn run(&self, run_id: i64) -> anyhow::Result<Option<RunRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, assignment, assignment_fingerprint, started_at, finished_at, status
                 FROM runs WHERE id=?1",
                params![run_id],
                run_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn latest_run(&self, assignment: &str) -> anyhow::Result<Option<RunRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, assignment, assignment_fingerprint, started_at, finished_at, status
                 FROM runs WHERE assignment=?1 ORDER BY id DESC LIMIT 1",
                params![assignment],
                run_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Reports of a run, in candidate order.
    pub fn fetch_run_reports(&self, run_id: i64) -> anyhow::Result<Vec<CandidateReport>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT report_json FROM candidate_reports WHERE run_id=?1 ORDER BY candidate",
        )?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for r in rows {
            let json = r?;
            out.push(serde_json::from_str(&json).context("corrupt report_json in run store")?);
        }
        Ok(out)
    }
}

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        assignment: row.get(1)?,
        assignment_fingerprint: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: row.get(5)?,
    })
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
