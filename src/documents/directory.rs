//! Directory-backed document cache.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{Document, DocumentError, DocumentSource, validate_id};

const EXTENSION: &str = "txt";

/// Serves `<root>/<id>.txt` files.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    root: PathBuf,
}

impl DirectoryDocumentSource {
    /// Serve documents cached under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.{EXTENSION}"))
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    async fn fetch(&self, id: &str) -> Result<Document, DocumentError> {
        validate_id(id)?;
        let path = self.path_for(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Document {
                id: id.to_string(),
                text,
                source_path: path,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(DocumentError::NotFound(id.to_string()))
            }
            Err(source) => Err(DocumentError::Io { path, source }),
        }
    }

    async fn list(&self) -> Result<Vec<String>, DocumentError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_ids(&root))
            .await
            .map_err(|error| DocumentError::Io {
                path: self.root.clone(),
                source: std::io::Error::other(error),
            })?
    }
}

fn list_ids(root: &Path) -> Result<Vec<String>, DocumentError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| DocumentError::Io {
            path: root.to_path_buf(),
            source: error.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION)
        {
            continue;
        }
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|id| validate_id(id).is_ok());
        if let Some(id) = id {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_cached_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("2701.txt"), "Call me Ishmael.").expect("write");
        let source = DirectoryDocumentSource::new(dir.path());

        let document = source.fetch("2701").await.expect("document");
        assert_eq!(document.id, "2701");
        assert_eq!(document.text, "Call me Ishmael.");
        assert_eq!(document.source_path, dir.path().join("2701.txt"));
    }

    #[tokio::test]
    async fn missing_and_invalid_ids_are_distinguished() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = DirectoryDocumentSource::new(dir.path());

        assert!(matches!(
            source.fetch("absent").await,
            Err(DocumentError::NotFound(id)) if id == "absent"
        ));
        assert!(matches!(
            source.fetch("../secret").await,
            Err(DocumentError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn lists_text_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.txt", "a.txt", "notes.md", "bad name.txt"] {
            std::fs::write(dir.path().join(name), "text").expect("write");
        }
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("nested").join("c.txt"), "text").expect("write");

        let ids = DirectoryDocumentSource::new(dir.path())
            .list()
            .await
            .expect("list");
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ids = DirectoryDocumentSource::new(dir.path().join("absent"))
            .list()
            .await
            .expect("list");
        assert!(ids.is_empty());
    }
}
