//! Durable retry queue for failed batches.

use crate::store::{read_json, write_json};
use crate::{OutboxResult, RetryEntry};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Ordered list of failed batches awaiting a sweep.
///
/// Every mutation rewrites the whole mirror file. The file is read once,
/// lazily, on the first operation that needs the queue contents.
#[derive(Debug)]
pub struct RetryQueue {
    path: PathBuf,
    entries: Vec<RetryEntry>,
    loaded: bool,
}

impl RetryQueue {
    /// Create an unloaded queue mirrored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory queue with the file contents.
    ///
    /// A missing or corrupt file loads as an empty queue.
    pub async fn load(&mut self) -> usize {
        self.entries = read_json::<Vec<RetryEntry>>(&self.path)
            .await
            .unwrap_or_default();
        self.loaded = true;
        debug!(count = self.entries.len(), "Loaded retry queue");
        self.entries.len()
    }

    /// Load from disk unless this queue has already been loaded.
    pub async fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.load().await;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Overwrite the mirror with the in-memory queue.
    pub async fn save(&self) -> OutboxResult<()> {
        write_json(&self.path, &self.entries).await?;
        debug!(count = self.entries.len(), "Saved retry queue");
        Ok(())
    }

    /// Append `entry` and persist.
    pub async fn enqueue(&mut self, entry: RetryEntry) {
        self.ensure_loaded().await;
        self.entries.push(entry);
        self.persist().await;
    }

    /// Atomically take every queued entry, leaving the queue empty.
    ///
    /// Entries enqueued afterwards form a fresh queue instead of being
    /// overwritten by whoever is processing the drained ones.
    pub async fn drain_all(&mut self) -> Vec<RetryEntry> {
        self.ensure_loaded().await;
        let drained = std::mem::take(&mut self.entries);
        if !drained.is_empty() {
            self.persist().await;
        }
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the queued entries.
    pub fn entries(&self) -> &[RetryEntry] {
        &self.entries
    }

    /// Drop the in-memory copy without touching the file.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.loaded = false;
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            error!(error = %e, "Failed to save retry queue");
        }
    }
}
