use std::path::PathBuf;

use async_trait::async_trait;
use pictura_core::{BlobStore, StoreError};

use super::clean_path;

/// Blob store rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    /// Create a store writing under `root`, served publicly at `public_url`
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        clean_path(path)
            .map(|clean| self.root.join(clean))
            .ok_or_else(|| StoreError::Io(format!("invalid blob path '{path}'")))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "stored blob");

        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.resolve(path)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, path: &str) -> String {
        let clean = clean_path(path).unwrap_or_default();
        format!("{}/{clean}", self.public_url.trim_end_matches('/'))
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/storage");

        store.put("ai-generated-images/a.png", b"\x89PNG").await.unwrap();
        assert!(dir.path().join("ai-generated-images/a.png").exists());
        assert_eq!(
            store.get("ai-generated-images/a.png").await.unwrap().as_deref(),
            Some(&b"\x89PNG"[..])
        );

        assert!(store.delete("ai-generated-images/a.png").await.unwrap());
        assert!(!store.delete("ai-generated-images/a.png").await.unwrap());
        assert!(store.get("ai-generated-images/a.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("root"), "/storage");

        assert!(store.put("../escape.png", b"x").await.is_err());
        assert!(store.local_path("../escape.png").is_none());
    }

    #[test]
    fn url_and_local_path() {
        let store = LocalBlobStore::new("/srv/pictura", "https://cdn.example.com/images/");

        assert_eq!(store.url("/a/b.png"), "https://cdn.example.com/images/a/b.png");
        assert_eq!(store.local_path("a/b.png"), Some(PathBuf::from("/srv/pictura/a/b.png")));
    }
}
