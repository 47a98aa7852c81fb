//! SQLite-backed [`JobStore`].

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{AnalysisJob, InsertOutcome, JobStatus, JobStore, StoreError, migrations};
use crate::analysis::FinalAnalysis;

const SELECT_COLUMNS: &str = "SELECT document_id, status, summary, sentiment, language, \
     key_characters, themes, content_digest, error, created_at, last_updated FROM analysis_jobs";

/// Job store over a single SQLite connection.
///
/// Cloning is cheap. Calls are serialized through a mutex and executed on the blocking pool.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrations::run_all(&conn)?;
        tracing::info!(path = %path.display(), "Job store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn get(&self, document_id: &str) -> Result<Option<AnalysisJob>, StoreError> {
        let document_id = document_id.to_string();
        self.call(move |conn| fetch(conn, &document_id)).await
    }

    async fn insert(
        &self,
        document_id: &str,
        content_digest: &str,
    ) -> Result<InsertOutcome, StoreError> {
        let document_id = document_id.to_string();
        let content_digest = content_digest.to_string();
        self.call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let now = timestamp()?;
            let inserted = tx.execute(
                "INSERT INTO analysis_jobs (document_id, status, content_digest, created_at, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(document_id) DO NOTHING",
                params![document_id, JobStatus::InProgress.as_str(), content_digest, now],
            )?;
            let job = fetch(&tx, &document_id)?.ok_or_else(|| StoreError::Corrupt {
                document_id: document_id.clone(),
                detail: "job missing after insert".into(),
            })?;
            tx.commit()?;
            Ok(if inserted == 1 {
                InsertOutcome::Created(job)
            } else {
                InsertOutcome::Duplicate(job)
            })
        })
        .await
    }

    async fn restart(
        &self,
        document_id: &str,
        content_digest: &str,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        let document_id = document_id.to_string();
        let content_digest = content_digest.to_string();
        self.call(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let updated = tx.execute(
                "UPDATE analysis_jobs
                 SET status = 'in_progress', summary = '', sentiment = '', language = '',
                     key_characters = '[]', themes = '[]', error = NULL,
                     content_digest = ?2, last_updated = ?3
                 WHERE document_id = ?1 AND status IN ('completed', 'failed')",
                params![document_id, content_digest, timestamp()?],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let job = fetch(&tx, &document_id)?;
            tx.commit()?;
            Ok(job)
        })
        .await
    }

    async fn complete(
        &self,
        document_id: &str,
        analysis: &FinalAnalysis,
    ) -> Result<(), StoreError> {
        let document_id = document_id.to_string();
        let analysis = analysis.clone();
        self.call(move |conn| {
            let updated = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'completed', summary = ?2, sentiment = ?3, language = ?4,
                     key_characters = ?5, themes = ?6, error = NULL, last_updated = ?7
                 WHERE document_id = ?1 AND status = 'in_progress'",
                params![
                    document_id,
                    analysis.summary,
                    analysis.sentiment,
                    analysis.language,
                    serde_json::to_string(&analysis.key_characters)?,
                    serde_json::to_string(&analysis.themes)?,
                    timestamp()?,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotInProgress(document_id));
            }
            Ok(())
        })
        .await
    }

    async fn fail(&self, document_id: &str, reason: &str) -> Result<(), StoreError> {
        let document_id = document_id.to_string();
        let reason = reason.to_string();
        self.call(move |conn| {
            let updated = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'failed', summary = '', sentiment = '', language = '',
                     key_characters = '[]', themes = '[]', error = ?2, last_updated = ?3
                 WHERE document_id = ?1 AND status = 'in_progress'",
                params![document_id, reason, timestamp()?],
            )?;
            if updated == 0 {
                return Err(StoreError::NotInProgress(document_id));
            }
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<AnalysisJob>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY document_id"))?;
            let rows = stmt
                .query_map([], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(JobRow::into_job).collect()
        })
        .await
    }

    async fn fail_interrupted(&self, reason: &str) -> Result<usize, StoreError> {
        let reason = reason.to_string();
        self.call(move |conn| {
            let updated = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'failed', summary = '', sentiment = '', language = '',
                     key_characters = '[]', themes = '[]', error = ?1, last_updated = ?2
                 WHERE status = 'in_progress'",
                params![reason, timestamp()?],
            )?;
            Ok(updated)
        })
        .await
    }
}

/// Raw column values of an `analysis_jobs` row.
struct JobRow {
    document_id: String,
    status: String,
    summary: String,
    sentiment: String,
    language: String,
    key_characters: String,
    themes: String,
    content_digest: String,
    error: Option<String>,
    created_at: String,
    last_updated: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            document_id: row.get("document_id")?,
            status: row.get("status")?,
            summary: row.get("summary")?,
            sentiment: row.get("sentiment")?,
            language: row.get("language")?,
            key_characters: row.get("key_characters")?,
            themes: row.get("themes")?,
            content_digest: row.get("content_digest")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            last_updated: row.get("last_updated")?,
        })
    }

    fn into_job(self) -> Result<AnalysisJob, StoreError> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| StoreError::Corrupt {
            document_id: self.document_id.clone(),
            detail: format!("unknown status '{}'", self.status),
        })?;
        Ok(AnalysisJob {
            status,
            summary: self.summary,
            sentiment: self.sentiment,
            language: self.language,
            key_characters: serde_json::from_str(&self.key_characters)?,
            themes: serde_json::from_str(&self.themes)?,
            content_digest: self.content_digest,
            error: self.error,
            created_at: self.created_at,
            last_updated: self.last_updated,
            document_id: self.document_id,
        })
    }
}

fn fetch(conn: &Connection, document_id: &str) -> Result<Option<AnalysisJob>, StoreError> {
    let row = conn
        .query_row(
            &format!("{SELECT_COLUMNS} WHERE document_id = ?1"),
            params![document_id],
            JobRow::from_row,
        )
        .optional()?;
    row.map(JobRow::into_job).transpose()
}

fn timestamp() -> Result<String, StoreError> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}
