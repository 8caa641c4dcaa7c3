//! Payment-proof blob stores: local filesystem and in-memory.

use super::{BlobError, BlobStore};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Reject uploads that are too large or not an image/PDF.
pub fn validate_upload(size: usize, mime_type: &str, max: usize) -> Result<(), BlobError> {
    if size > max {
        return Err(BlobError::TooLarge { size, max });
    }
    let mime = mime_type.trim().to_ascii_lowercase();
    let is_image = mime
        .strip_prefix("image/")
        .map(|sub| !sub.is_empty())
        .unwrap_or(false);
    if !is_image && mime != "application/pdf" {
        return Err(BlobError::UnsupportedType(mime_type.to_string()));
    }
    Ok(())
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Content-addressed reference: truncated SHA-256 plus an extension.
fn blob_ref_for(bytes: &[u8], mime_type: &str) -> String {
    let digest = Sha256::digest(bytes);
    format!("{}.{}", hex::encode(&digest[..16]), extension_for(mime_type))
}

fn is_safe_ref(blob_ref: &str) -> bool {
    !blob_ref.is_empty()
        && blob_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
        && !blob_ref.starts_with('.')
}

/// Stores blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    fn path_for(&self, blob_ref: &str) -> Result<PathBuf, BlobError> {
        if !is_safe_ref(blob_ref) {
            return Err(BlobError::NotFound(blob_ref.to_string()));
        }
        Ok(self.root.join(blob_ref))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, BlobError> {
        validate_upload(bytes.len(), mime_type, self.max_bytes)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;

        let blob_ref = blob_ref_for(&bytes, mime_type);
        let path = self.path_for(&blob_ref)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| BlobError::Io(e.to_string()))?;

        debug!(blob_ref = %blob_ref, size = bytes.len(), "stored proof upload");
        Ok(blob_ref)
    }

    async fn get(&self, blob_ref: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(blob_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(blob_ref.to_string()))
            }
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), BlobError> {
        let path = self.path_for(blob_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e.to_string())),
        }
    }
}

/// Keeps blobs in memory; used by tests and single-process setups.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    max_bytes: usize,
}

impl MemoryBlobStore {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            max_bytes,
        }
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, BlobError> {
        validate_upload(bytes.len(), mime_type, self.max_bytes)?;
        let blob_ref = blob_ref_for(&bytes, mime_type);
        self.blobs.write().await.insert(blob_ref.clone(), bytes);
        Ok(blob_ref)
    }

    async fn get(&self, blob_ref: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .await
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_ref.to_string()))
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), BlobError> {
        self.blobs.write().await.remove(blob_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload(10, "image/png", 100).is_ok());
        assert!(validate_upload(10, "application/pdf", 100).is_ok());
        assert!(matches!(
            validate_upload(101, "image/png", 100),
            Err(BlobError::TooLarge { size: 101, max: 100 })
        ));
        assert!(matches!(
            validate_upload(10, "text/html", 100),
            Err(BlobError::UnsupportedType(_))
        ));
        assert!(validate_upload(10, "image/", 100).is_err());
    }

    #[tokio::test]
    async fn test_local_store_roundtrip_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().join("uploads"), 1024);

        let blob_ref = store.put(b"%PDF-1.4 proof".to_vec(), "application/pdf").await.unwrap();
        assert!(blob_ref.ends_with(".pdf"));
        assert_eq!(store.get(&blob_ref).await.unwrap(), b"%PDF-1.4 proof".to_vec());

        store.delete(&blob_ref).await.unwrap();
        assert!(matches!(store.get(&blob_ref).await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_store_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path(), 1024);
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.get(".hidden").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_is_content_addressed() {
        let store = MemoryBlobStore::default();
        let a = store.put(vec![1, 2, 3], "image/png").await.unwrap();
        let b = store.put(vec![1, 2, 3], "image/png").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
    }
}
