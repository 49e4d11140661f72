//! Durable set of transaction ids the collector has already accepted.

use crate::store::{read_json, write_json};
use crate::OutboxResult;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Delivered-id ledger used to keep transactions from being sent twice.
///
/// The in-memory set is authoritative; the file is rewritten in full after
/// every change and read once, lazily, before the first lookup.
#[derive(Debug)]
pub struct SentIdLedger {
    path: PathBuf,
    ids: HashSet<String>,
    loaded: bool,
}

impl SentIdLedger {
    /// Create an unloaded ledger mirrored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: HashSet::new(),
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory set with the file contents.
    ///
    /// A missing or corrupt file loads as an empty set.
    pub async fn load(&mut self) -> &HashSet<String> {
        self.ids = read_json::<HashSet<String>>(&self.path)
            .await
            .unwrap_or_default();
        self.loaded = true;
        debug!(count = self.ids.len(), "Loaded sent transaction IDs");
        &self.ids
    }

    /// Load from disk unless this ledger has already been loaded.
    pub async fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.load().await;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Record `ids` as delivered and persist the full set.
    ///
    /// The ids count as delivered for this process even if the write fails;
    /// the failure is only logged.
    pub async fn mark_delivered<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_loaded().await;
        let before = self.ids.len();
        self.ids.extend(ids.into_iter().map(Into::into));
        if self.ids.len() == before {
            return;
        }

        if let Err(e) = self.save().await {
            error!(error = %e, "Failed to save sent transaction IDs");
        }
    }

    /// Overwrite the mirror with the full in-memory set.
    pub async fn save(&self) -> OutboxResult<()> {
        let mut ids: Vec<&String> = self.ids.iter().collect();
        ids.sort();
        write_json(&self.path, &ids).await
    }

    /// Forget the in-memory state. The file is left in place and will be
    /// re-read on the next [`ensure_loaded`](Self::ensure_loaded).
    pub fn reset(&mut self) {
        self.ids.clear();
        self.loaded = false;
    }
}
