//! Filesystem cache backend.
//!
//! One file per entry at `<root>/<sha1(key)>.<extension>`. Freshness is the
//! reader's job: [`get`](CacheStore::get) reports the file's mtime and the
//! caller compares it against the datasource TTL. The mtime is stamped from
//! the store's [`Clock`] on write, so writer and reader agree on time. There is no sweeper;
//! stale files are simply overwritten on the next successful fetch.
//!
//! Writes go to a uniquely named temp file in the same directory and are
//! renamed into place, so a reader never observes a half-written entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::store::{CacheStore, StoredEntry};
use crate::clock::{Clock, SystemClock};
use crate::{MimirError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache entries as files under a root directory.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
    extension: String,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    /// Open (and create, if absent) the cache directory.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            MimirError::Configuration(format!(
                "failed to create cache dir {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self {
            root,
            extension: extension.into().trim_start_matches('.').to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp written entries with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha1::digest(key.as_bytes()));
        self.root.join(format!("{digest}.{}", self.extension))
    }

    /// Write `payload` to `path` and set its mtime to the current clock time.
    async fn write_stamped(&self, path: &Path, payload: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(payload).await?;
        file.flush().await?;
        let file = file.into_std().await;
        file.set_modified(self.clock.now())
    }

    fn tmp_path_for(&self, path: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.root
            .join(format!(".{file_name}.{}.{n}.tmp", std::process::id()))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("extension", &self.extension)
            .finish()
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> MimirError {
    MimirError::Cache(format!("failed to {action} {}: {err}", path.display()))
}

#[async_trait]
impl CacheStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error("stat", &path, e))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let path = self.path_for(key);

        // Metadata and contents come from the same handle, so a concurrent
        // rename cannot pair one version's mtime with another's bytes.
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("open", &path, e)),
        };
        let metadata = file
            .metadata()
            .await
            .map_err(|e| io_error("stat", &path, e))?;
        let written_at = metadata
            .modified()
            .map_err(|e| io_error("read mtime of", &path, e))?;

        let mut payload = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut payload)
            .await
            .map_err(|e| io_error("read", &path, e))?;

        Ok(Some(StoredEntry {
            payload,
            written_at: Some(written_at),
        }))
    }

    async fn put(&self, key: &str, payload: &[u8], _ttl: Duration) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = self.tmp_path_for(&path);

        if let Err(e) = self.write_stamped(&tmp_path, payload).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("write", &tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_error("rename cache file into", &path, e));
        }
        Ok(())
    }

    async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}
