//! JSON file mirrors for the ledger and the retry queue.
//!
//! File access runs on the blocking pool; callers await it while holding the
//! engine lock, which keeps writes to one mirror ordered.

use crate::{OutboxError, OutboxResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::task;
use tracing::{debug, warn};

/// Read `path` as JSON. Missing or undecodable files yield `None`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let owned = path.to_path_buf();
    let content = match task::spawn_blocking(move || std::fs::read(owned)).await {
        Ok(Ok(content)) => content,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No persisted file, starting empty");
            return None;
        }
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Failed to read persisted file, starting empty");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Read task failed, starting empty");
            return None;
        }
    };

    match serde_json::from_slice(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Persisted file is corrupt, starting empty");
            None
        }
    }
}

/// Overwrite `path` with `value` as JSON.
///
/// The content goes to a sibling temp file first and is renamed into place, so
/// a crash mid-write leaves the previous mirror intact.
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> OutboxResult<()> {
    let data = serde_json::to_vec(value)?;
    let owned = path.to_path_buf();
    task::spawn_blocking(move || write_bytes(&owned, &data))
        .await
        .map_err(|e| OutboxError::Persistence {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?
}

fn write_bytes(path: &Path, data: &[u8]) -> OutboxResult<()> {
    let io_err = |source| OutboxError::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, data).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
