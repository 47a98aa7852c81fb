//! Persistent analysis job records.
//!
//! One record exists per document id. The primary key is the single-flight control: inserting an
//! `in_progress` record either creates the job or reports the existing one, atomically. Writes
//! that start a run return the record they wrote, so a run is never left without its job. Status
//! only moves forward from `in_progress` to `completed` or `failed`; the sole way back is
//! [`JobStore::restart`], which succeeds only while the record is still terminal.

mod migrations;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::analysis::FinalAnalysis;

pub use sqlite::SqliteJobStore;

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// A run is executing.
    InProgress,
    /// The final analysis was written.
    Completed,
    /// The run ended without a result.
    Failed,
}

impl JobStatus {
    /// Stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no run is attached to the job.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted analysis record for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisJob {
    /// Document the job belongs to.
    pub document_id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Consolidated summary; empty unless completed.
    pub summary: String,
    /// Consolidated sentiment; empty unless completed.
    pub sentiment: String,
    /// Consolidated language; empty unless completed.
    pub language: String,
    /// Distinct key characters; empty unless completed.
    pub key_characters: Vec<String>,
    /// Distinct themes; empty unless completed.
    pub themes: Vec<String>,
    /// SHA-256 of the analyzed text.
    pub content_digest: String,
    /// Failure reason when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Time of the last transition (RFC 3339).
    pub last_updated: String,
}

/// Result of attempting to create a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new `in_progress` record was written.
    Created(AnalysisJob),
    /// A record already existed and was left untouched.
    Duplicate(AnalysisJob),
}

impl InsertOutcome {
    /// Whether a new record was written.
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Errors raised by job persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The database directory could not be prepared.
    #[error("IO error for path '{path}': {source}")]
    Io {
        /// Path being prepared.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// A schema migration failed.
    #[error("Migration failed at version {version}: {reason}")]
    Migration {
        /// Version that failed.
        version: u32,
        /// SQLite diagnostic.
        reason: String,
    },
    /// The connection mutex was poisoned.
    #[error("Job store lock poisoned")]
    LockPoisoned,
    /// The blocking task running a store call was lost.
    #[error("Job store task failed: {0}")]
    Task(String),
    /// A list column could not be encoded or decoded.
    #[error("Failed to encode job fields: {0}")]
    Encoding(#[from] serde_json::Error),
    /// A timestamp could not be formatted.
    #[error("Failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    /// A stored row held an unexpected value.
    #[error("Corrupt job record for '{document_id}': {detail}")]
    Corrupt {
        /// Document whose row is corrupt.
        document_id: String,
        /// What was wrong.
        detail: String,
    },
    /// A completion or failure targeted a job that is not running.
    #[error("Job '{0}' is not in progress")]
    NotInProgress(String),
}

/// Storage backend for analysis jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch the job for a document.
    async fn get(&self, document_id: &str) -> Result<Option<AnalysisJob>, StoreError>;

    /// Create an `in_progress` job unless one already exists.
    async fn insert(
        &self,
        document_id: &str,
        content_digest: &str,
    ) -> Result<InsertOutcome, StoreError>;

    /// Move a terminal job back to `in_progress`, clearing its fields.
    ///
    /// Returns the restarted record, or `None` when the job is missing or already in progress.
    async fn restart(
        &self,
        document_id: &str,
        content_digest: &str,
    ) -> Result<Option<AnalysisJob>, StoreError>;

    /// Write the final analysis and mark the job `completed`.
    async fn complete(
        &self,
        document_id: &str,
        analysis: &FinalAnalysis,
    ) -> Result<(), StoreError>;

    /// Clear the fields, record `reason`, and mark the job `failed`.
    async fn fail(&self, document_id: &str, reason: &str) -> Result<(), StoreError>;

    /// All jobs ordered by document id.
    async fn list(&self) -> Result<Vec<AnalysisJob>, StoreError>;

    /// Mark every `in_progress` job `failed`. Returns the number of jobs updated.
    async fn fail_interrupted(&self, reason: &str) -> Result<usize, StoreError>;
}
