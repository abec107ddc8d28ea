//! Profile photo storage.
//!
//! Photos live as files under a storage directory and are tracked by the
//! `media` table; the rest of the system only holds a `MediaId`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MediaError;
use crate::profile::{MediaId, UserId};
use crate::store::Database;

/// A stored photo, loaded back into memory.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a new photo for `owner` and return its reference.
    async fn store(
        &self,
        owner: UserId,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<MediaId, MediaError>;

    async fn fetch(&self, id: MediaId) -> Result<StoredBlob, MediaError>;

    /// Remove both the file and its record.
    async fn delete(&self, id: MediaId) -> Result<(), MediaError>;
}

/// Files on local disk, records in the database.
pub struct LocalBlobStore {
    root: PathBuf,
    db: Arc<dyn Database>,
}

impl LocalBlobStore {
    pub async fn new(root: impl Into<PathBuf>, db: Arc<dyn Database>) -> Result<Self, MediaError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, db })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

/// Keep only short alphanumeric extensions such as `jpg` or `png`.
fn clean_extension(extension: Option<&str>) -> Option<String> {
    let ext = extension?.trim_start_matches('.');
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        owner: UserId,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<MediaId, MediaError> {
        // Unique per upload so a replacement never clobbers the file it replaces.
        let file_name = match clean_extension(extension) {
            Some(ext) => format!("{owner}_{}.{ext}", Uuid::new_v4().simple()),
            None => format!("{owner}_{}", Uuid::new_v4().simple()),
        };
        let path = self.path_for(&file_name);
        tokio::fs::write(&path, bytes).await?;

        match self.db.insert_media(&file_name).await {
            Ok(id) => {
                debug!(user_id = owner, media_id = %id, size = bytes.len(), "Photo stored");
                Ok(id)
            }
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %io, "Failed to remove orphaned photo");
                }
                Err(e.into())
            }
        }
    }

    async fn fetch(&self, id: MediaId) -> Result<StoredBlob, MediaError> {
        let record = self
            .db
            .get_media(id)
            .await?
            .ok_or(MediaError::NotFound(id.0))?;
        let bytes = match tokio::fs::read(self.path_for(&record.file_name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::NotFound(id.0));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(StoredBlob {
            file_name: record.file_name,
            bytes,
        })
    }

    async fn delete(&self, id: MediaId) -> Result<(), MediaError> {
        let record = self
            .db
            .get_media(id)
            .await?
            .ok_or(MediaError::NotFound(id.0))?;

        match tokio::fs::remove_file(self.path_for(&record.file_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(media_id = %id, "Photo file already missing");
            }
            Err(e) => return Err(e.into()),
        }
        self.db.delete_media(id).await?;
        debug!(media_id = %id, "Photo deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn blob_store() -> (tempfile::TempDir, LocalBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = LocalBlobStore::new(dir.path().join("storage"), db)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_fetch_delete() {
        let (_dir, store) = blob_store().await;
        let id = store.store(7, b"jpeg bytes", Some("jpg")).await.unwrap();

        let blob = store.fetch(id).await.unwrap();
        assert_eq!(blob.bytes, b"jpeg bytes");
        assert!(blob.file_name.starts_with("7_"));
        assert!(blob.file_name.ends_with(".jpg"));
        assert!(store.root().join(&blob.file_name).exists());

        store.delete(id).await.unwrap();
        assert!(!store.root().join(&blob.file_name).exists());
        assert!(matches!(store.fetch(id).await, Err(MediaError::NotFound(_))));
        assert!(matches!(store.delete(id).await, Err(MediaError::NotFound(_))));
    }

    #[tokio::test]
    async fn replacement_keeps_both_files_until_delete() {
        let (_dir, store) = blob_store().await;
        let old = store.store(7, b"old", Some(".png")).await.unwrap();
        let new = store.store(7, b"new", Some("png")).await.unwrap();
        assert_ne!(old, new);

        store.delete(old).await.unwrap();
        assert_eq!(store.fetch(new).await.unwrap().bytes, b"new");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, store) = blob_store().await;
        let id = store.store(1, b"x", None).await.unwrap();
        let name = store.fetch(id).await.unwrap().file_name;
        tokio::fs::remove_file(store.root().join(name)).await.unwrap();

        assert!(matches!(store.fetch(id).await, Err(MediaError::NotFound(_))));
        // Deleting still clears the record.
        store.delete(id).await.unwrap();
    }

    #[test]
    fn extension_cleanup() {
        assert_eq!(clean_extension(Some("JPG")).as_deref(), Some("jpg"));
        assert_eq!(clean_extension(Some(".webp")).as_deref(), Some("webp"));
        assert_eq!(clean_extension(Some("../x")), None);
        assert_eq!(clean_extension(Some("")), None);
        assert_eq!(clean_extension(None), None);
    }
}
