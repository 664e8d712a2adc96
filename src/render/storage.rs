//! Filesystem storage for rendered pages
//!
//! Entries are sharded by the first two characters of their fingerprint:
//! `<base>/ab/cdef….png`. Writes go to a temporary sibling and are renamed
//! into place so a reader never sees a partially written file.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use super::fingerprint::Fingerprint;
use crate::error::{CoreError, Result};

const ENTRY_EXTENSION: &str = "png";

#[derive(Debug, Clone)]
pub struct CacheStorage {
    base_path: PathBuf,
}

impl CacheStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hash = fingerprint.as_str();
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.base_path
            .join(prefix)
            .join(format!("{}.{}", rest, ENTRY_EXTENSION))
    }

    /// Persist an entry, returning its final path
    pub async fn write(&self, fingerprint: &Fingerprint, data: &[u8]) -> Result<PathBuf> {
        let path = self.entry_path(fingerprint);
        let write_failure = |e: std::io::Error| {
            CoreError::CacheWriteFailure(format!("{}: {}", path.display(), e))
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_failure)?;
        }

        let staging = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, data).await.map_err(write_failure)?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(write_failure(e));
        }

        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Remove an entry file; a missing file is not an error
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }

    pub async fn remove_many(&self, paths: &[PathBuf]) {
        for path in paths {
            self.remove(path).await;
        }
    }

    /// Every file under the shard directories older than `min_age`
    pub async fn list_files(&self, min_age: Duration) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let now = SystemTime::now();

        let mut shards = match tokio::fs::read_dir(&self.base_path).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if !metadata.is_file() {
                    continue;
                }
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age >= min_age {
                    files.push(entry.path());
                }
            }
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageId, VersionId};
    use tempfile::TempDir;

    fn fingerprint() -> Fingerprint {
        Fingerprint::compute(VersionId::new(), PageId::new(), &[])
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().to_path_buf());
        let fp = fingerprint();

        let path = storage.write(&fp, b"rendered").await.unwrap();
        assert_eq!(path, storage.entry_path(&fp));
        assert!(path.starts_with(temp_dir.path().join(&fp.as_str()[..2])));
        assert_eq!(storage.read(&path).await.unwrap(), b"rendered");

        let files = storage.list_files(Duration::ZERO).await.unwrap();
        assert_eq!(files, vec![path.clone()]);

        storage.remove(&path).await;
        storage.remove(&path).await;
        assert!(storage.read(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_unwritable_base_is_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let storage = CacheStorage::new(blocker);
        let result = storage.write(&fingerprint(), b"data").await;
        assert!(matches!(result, Err(CoreError::CacheWriteFailure(_))));
    }

    #[tokio::test]
    async fn test_list_files_on_missing_base() {
        let temp_dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(temp_dir.path().join("missing"));
        assert!(storage.list_files(Duration::ZERO).await.unwrap().is_empty());
    }
}
