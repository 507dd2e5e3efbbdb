//! Durable JSON storage for the chain.
//!
//! The whole chain is written as one JSON array. Each save writes its own
//! uniquely named `.tmp` sibling and renames it into place, so a crash
//! mid-write never leaves a truncated ledger behind and two saves never share
//! a temp file.
//!
//! The write itself runs on the blocking pool and keeps running after a save
//! times out. Saves are numbered; a late write only renames its file into
//! place if no newer save has started since, so a stale chain never replaces
//! a newer one.

use crate::block::Block;
use crate::error::StoreError;
use chrono::Utc;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// File-backed chain storage.
///
/// Clones share the save sequence, so they coordinate renames.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    timeout: Duration,
    latest_save: Arc<AtomicU64>,
    rename_lock: Arc<Mutex<()>>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            latest_save: Arc::new(AtomicU64::new(0)),
            rename_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored chain. `None` when the file is missing, blank or `[]`.
    pub async fn load(&self) -> Result<Option<Vec<Block>>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let blocks: Vec<Block> = serde_json::from_slice(&bytes)?;
        if blocks.is_empty() {
            return Ok(None);
        }
        Ok(Some(blocks))
    }

    /// Atomically replace the stored chain, bounded by the configured timeout.
    pub async fn save(&self, blocks: &[Block]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(blocks)?;
        let write = PendingWrite {
            path: self.path.clone(),
            sequence: self.latest_save.fetch_add(1, Ordering::SeqCst) + 1,
            latest_save: Arc::clone(&self.latest_save),
            rename_lock: Arc::clone(&self.rename_lock),
        };

        let task = tokio::task::spawn_blocking(move || write.run(&bytes));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StoreError::Io(std::io::Error::other(join))),
            Err(_) => Err(StoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Move an unreadable ledger file aside so a fresh chain can take its place.
    ///
    /// The target name carries a timestamp, so earlier quarantined files are kept.
    pub async fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();

        let mut target = self.path.with_file_name(format!("{stem}.{stamp}.corrupt"));
        let mut attempt = 1;
        while fs::try_exists(&target).await? {
            target = self
                .path
                .with_file_name(format!("{stem}.{stamp}-{attempt}.corrupt"));
            attempt += 1;
        }

        fs::rename(&self.path, &target).await?;
        Ok(target)
    }

    #[cfg(test)]
    pub(crate) fn hold_writes(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.rename_lock.lock()
    }
}

/// One save, run on the blocking pool.
struct PendingWrite {
    path: PathBuf,
    sequence: u64,
    latest_save: Arc<AtomicU64>,
    rename_lock: Arc<Mutex<()>>,
}

impl PendingWrite {
    fn run(self, bytes: &[u8]) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let prefix = match self.path.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".ledger.".to_string(),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        let _guard = self.rename_lock.lock();
        if self.latest_save.load(Ordering::SeqCst) != self.sequence {
            // The temp file is removed on drop.
            debug!(sequence = self.sequence, "superseded ledger write discarded");
            return Ok(());
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
