use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{AnalysisContent, AnalysisReport, ColumnMapping, ReportStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    status TEXT NOT NULL,
    column_mapping TEXT,
    analysis TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reports_owner_created ON reports (owner_id, created_at);
";

/// Row shape as stored; JSON columns are decoded outside the connection thread.
struct StoredReport {
    id: String,
    owner_id: String,
    filename: String,
    status: String,
    column_mapping: Option<String>,
    analysis: Option<String>,
    created_at: i64,
}

/// SQLite persistence for analysis reports.
#[derive(Clone)]
pub struct ReportStore {
    conn: Connection,
}

impl ReportStore {
    pub async fn open(path: &str) -> Result<Self, AppError> {
        info!("Opening report database at {}", path);
        let conn = Connection::open(path)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Self::with_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self, AppError> {
        conn.call(|conn: &mut rusqlite::Connection| -> rusqlite::Result<()> {
            conn.execute_batch(SCHEMA)
        })
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn insert(&self, report: &AnalysisReport) -> Result<(), AppError> {
        let row = to_row(report)?;
        debug!("Inserting report {} ({})", row.id, row.status);
        self.conn
            .call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<usize> {
                conn.execute(
                    "INSERT INTO reports (id, owner_id, filename, status, column_mapping, analysis, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id,
                        row.owner_id,
                        row.filename,
                        row.status,
                        row.column_mapping,
                        row.analysis,
                        row.created_at
                    ],
                )
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persists status, mapping and analysis of an existing report.
    pub async fn update(&self, report: &AnalysisReport) -> Result<(), AppError> {
        let row = to_row(report)?;
        debug!("Updating report {} to {}", row.id, row.status);
        let id = row.id.clone();
        let updated = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<usize> {
                conn.execute(
                    "UPDATE reports SET status = ?1, column_mapping = ?2, analysis = ?3 WHERE id = ?4",
                    params![row.status, row.column_mapping, row.analysis, row.id],
                )
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("Report {} not found", id)));
        }
        Ok(())
    }

    /// Looks a report up for its owner only; other identities get `None`.
    pub async fn get(&self, report_id: &str, owner_id: &str) -> Result<Option<AnalysisReport>, AppError> {
        let report_id = report_id.to_string();
        let owner_id = owner_id.to_string();
        let row = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<Option<StoredReport>> {
                conn.query_row(
                    "SELECT id, owner_id, filename, status, column_mapping, analysis, created_at
                     FROM reports WHERE id = ?1 AND owner_id = ?2",
                    params![report_id, owner_id],
                    read_row,
                )
                .optional()
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(from_row).transpose()
    }

    /// All reports of `owner_id`, newest first.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<AnalysisReport>, AppError> {
        let owner_id = owner_id.to_string();
        let rows = self
            .conn
            .call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<Vec<StoredReport>> {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, filename, status, column_mapping, analysis, created_at
                     FROM reports WHERE owner_id = ?1 ORDER BY created_at DESC, rowid DESC",
                )?;
                let rows = stmt.query_map(params![owner_id], read_row)?;
                rows.collect()
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(from_row).collect()
    }

    /// Number of completed reports for `owner_id` created at or after `since`.
    pub async fn count_completed_since(&self, owner_id: &str, since: DateTime<Utc>) -> Result<u32, AppError> {
        let owner_id = owner_id.to_string();
        let since = since.timestamp();
        self.conn
            .call(move |conn: &mut rusqlite::Connection| -> rusqlite::Result<u32> {
                conn.query_row(
                    "SELECT COUNT(*) FROM reports WHERE owner_id = ?1 AND status = ?2 AND created_at >= ?3",
                    params![owner_id, ReportStatus::Completed.as_str(), since],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredReport> {
    Ok(StoredReport {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        filename: row.get(2)?,
        status: row.get(3)?,
        column_mapping: row.get(4)?,
        analysis: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn to_row(report: &AnalysisReport) -> Result<StoredReport, AppError> {
    Ok(StoredReport {
        id: report.id.clone(),
        owner_id: report.owner_id.clone(),
        filename: report.filename.clone(),
        status: report.status.as_str().to_string(),
        column_mapping: report.column_mapping.as_ref().map(serde_json::to_string).transpose()?,
        analysis: report.analysis.as_ref().map(serde_json::to_string).transpose()?,
        created_at: report.created_at.timestamp(),
    })
}

fn from_row(row: StoredReport) -> Result<AnalysisReport, AppError> {
    let status = ReportStatus::parse(&row.status)
        .ok_or_else(|| AppError::Database(format!("Unknown report status '{}'", row.status)))?;
    let column_mapping = row
        .column_mapping
        .as_deref()
        .map(serde_json::from_str::<ColumnMapping>)
        .transpose()?;
    let analysis = row
        .analysis
        .as_deref()
        .map(serde_json::from_str::<AnalysisContent>)
        .transpose()?;
    let created_at = Utc
        .timestamp_opt(row.created_at, 0)
        .single()
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp {}", row.created_at)))?;

    Ok(AnalysisReport {
        id: row.id,
        owner_id: row.owner_id,
        filename: row.filename,
        status,
        column_mapping,
        analysis,
        created_at,
    })
}
