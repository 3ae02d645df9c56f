//! Blob storage for uploaded documents.
//!
//! Paths are relative keys of the form `<owner_public_id>/<uuid>-<file name>`;
//! [`LocalBlobStore`] maps them below a root directory.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

const MAX_FILE_NAME_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), StorageError>;
    async fn get(&self, path: &str) -> Result<Bytes, StorageError>;
    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes).await?;
        debug!(path, size = bytes.len(), "stored blob");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        let target = self.resolve(path)?;
        match fs::read(&target).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Keep letters, digits, dots, dashes and underscores; everything else
/// becomes `_`. Never returns an empty or dot-only name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

pub fn blob_path(owner_public_id: &str, file_name: &str) -> String {
    format!(
        "{owner_public_id}/{}-{}",
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\akte van overlijden.pdf"), "akte_van_overlijden.pdf");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn blob_path_is_scoped_to_owner() {
        let path = blob_path("owner123", "testament.pdf");
        assert!(path.starts_with("owner123/"));
        assert!(path.ends_with("-testament.pdf"));
    }

    #[tokio::test]
    async fn local_store_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store
            .put("owner/abc-file.txt", Bytes::from_static(b"hallo"))
            .await
            .unwrap();
        let bytes = store.get("owner/abc-file.txt").await.unwrap();
        assert_eq!(&bytes[..], b"hallo");

        store.delete("owner/abc-file.txt").await.unwrap();
        assert!(matches!(
            store.get("owner/abc-file.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let result = store.put("../escape.txt", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }
}
