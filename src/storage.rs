//! Persistence for generated artifacts (audio and the like).

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Location and size of a stored object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    /// URL path under which the object is served
    pub path: String,
    pub size: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(&self, data: Bytes, file_name: &str, content_type: &str) -> Result<StoredFile>;
}

/// Writes uploads to a local directory served at `serve_prefix`
pub struct LocalFileStore {
    root: PathBuf,
    serve_prefix: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, serve_prefix: &str) -> Self {
        Self {
            root: root.into(),
            serve_prefix: serve_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

/// Reject names that could escape the upload directory
fn safe_file_name(file_name: &str) -> Result<&str> {
    let valid = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && file_name != "."
        && file_name != "..";
    if !valid {
        anyhow::bail!("Invalid file name: {:?}", file_name);
    }
    Ok(file_name)
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(&self, data: Bytes, file_name: &str, content_type: &str) -> Result<StoredFile> {
        let file_name = safe_file_name(file_name)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.root.display()))?;

        let target = self.root.join(file_name);
        tokio::fs::write(&target, &data)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        debug!(file = %target.display(), content_type, size = data.len(), "Stored upload");

        Ok(StoredFile {
            path: format!("{}/{}", self.serve_prefix, file_name),
            size: data.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert!(safe_file_name("elevenlabs-tts-1.mp3").is_ok());
        assert!(safe_file_name("../etc/passwd").is_err());
        assert!(safe_file_name("a\\b").is_err());
        assert!(safe_file_name("..").is_err());
        assert!(safe_file_name("").is_err());
    }

    #[tokio::test]
    async fn test_local_upload_writes_file() {
        let root = std::env::temp_dir().join(format!("switchyard-store-{}", uuid::Uuid::new_v4()));
        let store = LocalFileStore::new(&root, "/api/files/serve/");

        let stored = store
            .upload(Bytes::from_static(b"ID3audio"), "clip.mp3", "audio/mpeg")
            .await
            .unwrap();

        assert_eq!(stored.path, "/api/files/serve/clip.mp3");
        assert_eq!(stored.size, 8);
        assert_eq!(tokio::fs::read(root.join("clip.mp3")).await.unwrap(), b"ID3audio");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
