//! Local filesystem keyed store.
//!
//! A [`MemoryStore`] whose contents are written to a single JSON snapshot.
//! Writes accumulate in memory and reach disk on [`KeyedStore::flush`], or
//! automatically once `flush_every` write batches are pending. Unflushed
//! writes are lost when the store is dropped.
//!
//! Intended for the CLI and for single-process deployments; shared
//! deployments should put a networked store behind [`KeyedStore`] instead.
//!
//! ## Snapshot Format
//!
//! ```text
//! {
//!   "saved_at": "2026-10-15T09:00:00Z",
//!   "slots": { "jobdedup:fp:abc": { "value": {...}, "expires_at": 1760000000000 } }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::storage::memory::Slot;
use crate::storage::{Command, KeyedStore, MemoryStore, Reply};

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    slots: HashMap<String, Slot>,
}

/// Write batches buffered before an automatic snapshot.
const DEFAULT_FLUSH_EVERY: usize = 1000;

/// File-persisted keyed store.
pub struct LocalStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Write batches applied since the last snapshot
    pending: AtomicUsize,
    /// Automatic snapshot threshold (0 = only on explicit flush)
    flush_every: usize,
    /// Serializes snapshot writes so the newest state lands last.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = match read_bytes(&path).await? {
            Some(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                log::info!(
                    "Loaded {} keys from {} (saved {})",
                    snapshot.slots.len(),
                    path.display(),
                    snapshot.saved_at
                );
                MemoryStore::from_snapshot(snapshot.slots)
            }
            None => {
                log::warn!("No snapshot at {}, starting empty", path.display());
                MemoryStore::new()
            }
        };

        Ok(Self {
            path,
            inner,
            pending: AtomicUsize::new(0),
            flush_every: DEFAULT_FLUSH_EVERY,
            write_lock: Mutex::new(()),
        })
    }

    /// Snapshot automatically after `n` write batches (0 disables).
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether writes are waiting for a snapshot.
    pub fn is_dirty(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Write the current contents to disk.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let flushed = self.pending.swap(0, Ordering::SeqCst);
        log::debug!(
            "Writing snapshot to {} ({} pending batches)",
            self.path.display(),
            flushed
        );
        let snapshot = Snapshot {
            saved_at: Utc::now(),
            slots: self.inner.snapshot()?,
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        if let Err(e) = write_bytes(&self.path, &bytes).await {
            self.pending.fetch_add(flushed.max(1), Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyedStore for LocalStore {
    async fn exec(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
        let writes = batch.iter().any(Command::is_write);
        let replies = self.inner.exec(batch).await?;
        if writes {
            let pending = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
            if self.flush_every > 0 && pending >= self.flush_every {
                self.persist().await?;
            }
        }
        Ok(replies)
    }

    async fn flush(&self) -> Result<()> {
        if self.is_dirty() {
            self.persist().await?;
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.scan_prefix(prefix).await
    }
}

/// Read bytes, returning None if the file doesn't exist.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write bytes atomically (write to temp, then rename).
async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
