//! Object storage for submission files.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub mod signed;
pub mod upload;

pub use signed::{SignedUrl, UrlSigner};
pub use upload::{UploadError, object_path, validate_upload};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("url error: {0}")]
    UrlError(#[from] url::ParseError),
}

#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    fn bucket(&self) -> &str;

    async fn put(&self, path: &str, bytes: &[u8]) -> StorageResult<()>;

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    async fn delete(&self, path: &str) -> StorageResult<()>;
}

/// Stores objects as files under `root/bucket/`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new<P: Into<PathBuf>>(root: P, bucket: &str) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.to_string(),
        }
    }

    pub fn from_config(storage: &crate::config::Storage) -> Self {
        Self::new(storage.root(), storage.bucket())
    }

    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(self.root.join(&self.bucket)).await?;
        Ok(())
    }

    /// Maps an object path to a file, refusing anything that could escape the bucket.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(&self.bucket).join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(&self, path: &str, bytes: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!("stored object at {}", target.display());
        Ok(())
    }

    async fn get(&self, path: &str) -> StorageResult<Vec<u8>> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "bucket");

        store.put("a/b/file.txt", b"hello").await.unwrap();
        assert_eq!(store.get("a/b/file.txt").await.unwrap(), b"hello");

        store.delete("a/b/file.txt").await.unwrap();
        assert!(matches!(
            store.get("a/b/file.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "bucket");

        for path in ["../escape", "/etc/passwd", "a/../../b", ""] {
            assert!(matches!(
                store.put(path, b"x").await,
                Err(StorageError::InvalidPath(_))
            ));
        }
    }
}
