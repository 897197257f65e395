//! SQLite-backed run and request-log store.

use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;

use super::store::{FlowRun, RequestLog, RunStatus, RunStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS flow_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flow_name TEXT NOT NULL,
    status TEXT NOT NULL,
    input_data TEXT,
    output_data TEXT,
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE TABLE IF NOT EXISTS request_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    method TEXT NOT NULL,
    status INTEGER NOT NULL,
    user_agent TEXT,
    duration_ms INTEGER,
    timestamp TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        conn.execute_batch(SCHEMA).context("failed to apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA).context("failed to apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in store: {raw}"))
}

type RunRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
);

fn read_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn create_run(&self, flow_name: &str, input_data: Option<String>) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO flow_runs (flow_name, status, input_data, started_at)
             VALUES (?1, 'running', ?2, ?3)",
            params![flow_name, input_data, Utc::now().to_rfc3339()],
        )
        .context("failed to insert flow run")?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_run(&self, id: i64, output_data: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE flow_runs
                 SET status = 'completed', output_data = ?1, completed_at = ?2
                 WHERE id = ?3 AND status = 'running'",
                params![output_data, Utc::now().to_rfc3339(), id],
            )
            .context("failed to complete flow run")?;
        if updated == 0 {
            bail!("flow run {id} is not in running state");
        }
        Ok(())
    }

    async fn fail_run(&self, id: i64, error_message: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE flow_runs
                 SET status = 'failed', error_message = ?1, completed_at = ?2
                 WHERE id = ?3 AND status = 'running'",
                params![error_message, Utc::now().to_rfc3339(), id],
            )
            .context("failed to mark flow run failed")?;
        if updated == 0 {
            bail!("flow run {id} is not in running state");
        }
        Ok(())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<FlowRun>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, flow_name, status, input_data, output_data, error_message,
                    started_at, completed_at
             FROM flow_runs
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], read_run_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read flow runs")?;

        let mut runs = Vec::with_capacity(rows.len());
        for (id, flow_name, status, input_data, output_data, error_message, started_at, completed_at) in
            rows
        {
            runs.push(FlowRun {
                id,
                flow_name,
                status: RunStatus::parse(&status)
                    .with_context(|| format!("unknown run status in store: {status}"))?,
                input_data,
                output_data,
                error_message,
                started_at: parse_timestamp(&started_at)?,
                completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(runs)
    }

    async fn log_request(
        &self,
        path: &str,
        method: &str,
        status: u16,
        user_agent: Option<&str>,
        duration_ms: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO request_logs (path, method, status, user_agent, duration_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path,
                method,
                status,
                user_agent,
                duration_ms,
                Utc::now().to_rfc3339()
            ],
        )
        .context("failed to insert request log")?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLog>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, path, method, status, user_agent, duration_ms, timestamp
             FROM request_logs
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u16>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read request logs")?;

        let mut logs = Vec::with_capacity(rows.len());
        for (id, path, method, status, user_agent, duration_ms, timestamp) in rows {
            logs.push(RequestLog {
                id,
                path,
                method,
                status,
                user_agent,
                duration_ms,
                timestamp: parse_timestamp(&timestamp)?,
            });
        }
        Ok(logs)
    }
}
