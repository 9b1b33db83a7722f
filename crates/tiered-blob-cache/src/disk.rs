//! Disk layer
//!
//! One file per record in a single flat directory; the file name is the
//! digest of the key and the file's modification time doubles as the LRU
//! and freshness clock. Writes publish atomically (temp file + rename) so a
//! concurrent reader never observes a half-written record.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;

use crate::error::{CacheError, Result};
use crate::index::MetadataRef;

/// Suffix for in-flight writes, invisible to scans
const TMP_SUFFIX: &str = ".tmp";

pub(crate) struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Ensure the cache directory exists
    pub(crate) async fn init(&self) -> Result<()> {
        if let Ok(meta) = fs::metadata(&self.dir).await {
            if !meta.is_dir() {
                return Err(CacheError::Config(format!(
                    "cache path {} exists and is not a directory",
                    self.dir.display()
                )));
            }
        }
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Atomically publish a record, returning its modification time and size
    pub(crate) async fn write(&self, name: &str, bytes: &[u8]) -> Result<(DateTime<Utc>, u64)> {
        let target = self.path(name);
        let tmp = self.path(&format!("{}{}", name, TMP_SUFFIX));

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &target).await?;

        let meta = fs::metadata(&target).await?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok((modified, meta.len()))
    }

    pub(crate) async fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(name)).await?)
    }

    pub(crate) async fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            // Already gone is as good as removed
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every record by removing and recreating the directory
    pub(crate) async fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Modification time of a record, `None` when absent
    pub(crate) async fn modified(&self, name: &str) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(self.path(name)).await.ok()?;
        if !meta.is_file() {
            return None;
        }
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Update a record's modification time to now without rewriting content,
    /// promoting it in LRU order
    pub(crate) fn touch(&self, name: &str) -> std::io::Result<()> {
        let file = std::fs::OpenOptions::new()
            .append(true)
            .open(self.path(name))?;
        file.set_modified(SystemTime::now())
    }

    /// Modification time of the cache directory itself
    pub(crate) async fn dir_modified(&self) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(&self.dir).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Enumerate top-level records: subdirectories and in-flight temp files
    /// are not part of the cache
    pub(crate) async fn scan(&self) -> Result<Vec<MetadataRef>> {
        let mut refs = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue,
            };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            refs.push(MetadataRef {
                name,
                key: None,
                modified_at: modified,
                size: meta.len(),
            });
        }
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn store(dir: &std::path::Path) -> DiskStore {
        let store = DiskStore::new(dir.to_path_buf());
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        let (modified, size) = store.write("abc123", b"hello").await.unwrap();
        assert_eq!(size, 5);
        assert!(modified <= Utc::now());

        assert_eq!(store.read("abc123").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("abc123", b"hello").await.unwrap();
        assert!(!dir.path().join("abc123.tmp").exists());
        assert!(dir.path().join("abc123").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("abc123", b"first").await.unwrap();
        store.write("abc123", b"second!").await.unwrap();
        assert_eq!(store.read("abc123").await.unwrap(), b"second!");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("abc123", b"hello").await.unwrap();
        store.remove("abc123").await.unwrap();
        assert!(store.read("abc123").await.is_err());

        // Removing again is not an error
        store.remove("abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_all_keeps_directory() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("a", b"1").await.unwrap();
        store.write("b", b"2").await.unwrap();
        store.remove_all().await.unwrap();

        assert!(dir.path().is_dir());
        assert!(store.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_modified_for_missing_record() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;
        assert!(store.modified("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_touch_advances_modification_time() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("abc123", b"hello").await.unwrap();
        let before = store.modified("abc123").await.unwrap();

        // Filesystem timestamps can be second-granular
        tokio::time::sleep(Duration::from_millis(1100)).await;
        store.touch("abc123").unwrap();

        let after = store.modified("abc123").await.unwrap();
        assert!(after > before);
        // Content untouched
        assert_eq!(store.read("abc123").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_scan_skips_subdirectories_and_temp_files() {
        let dir = tempdir().unwrap();
        let store = store(dir.path()).await;

        store.write("real", b"data").await.unwrap();
        fs::create_dir(dir.path().join("subdir")).await.unwrap();
        fs::write(dir.path().join("half.tmp"), b"partial")
            .await
            .unwrap();

        let refs = store.scan().await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "real");
        assert_eq!(refs[0].size, 4);
        assert!(refs[0].key.is_none());
    }

    #[tokio::test]
    async fn test_init_rejects_file_as_cache_dir() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        fs::write(&file_path, b"occupied").await.unwrap();

        let store = DiskStore::new(file_path);
        assert!(store.init().await.is_err());
    }
}
