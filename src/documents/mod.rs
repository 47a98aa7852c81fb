//! Document source collaborator.
//!
//! Acquisition of remote texts happens elsewhere; the pipeline only needs the cached text of a
//! document by id. [`DirectoryDocumentSource`] serves the on-disk cache (`<dir>/<id>.txt`).

mod directory;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

pub use directory::DirectoryDocumentSource;

const MAX_ID_LEN: usize = 128;

/// A fetched document. The text never changes once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Stable external identifier.
    pub id: String,
    /// Full document text.
    pub text: String,
    /// Where the text was read from.
    pub source_path: PathBuf,
}

impl Document {
    /// SHA-256 of the text, hex encoded.
    pub fn content_digest(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }
}

/// Errors raised while acquiring documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The id is empty, too long, or contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid document id '{0}'")]
    InvalidId(String),
    /// No cached text exists for the id.
    #[error("Document '{0}' not found")]
    NotFound(String),
    /// Reading the cache failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}

/// Provides document text by id.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a document.
    async fn fetch(&self, id: &str) -> Result<Document, DocumentError>;

    /// Ids of every available document, sorted.
    async fn list(&self) -> Result<Vec<String>, DocumentError>;
}

/// Reject ids that could escape the cache directory.
pub fn validate_id(id: &str) -> Result<(), DocumentError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DocumentError::InvalidId(id.to_string()))
    }
}
