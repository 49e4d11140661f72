//! Key/value storage for installation secrets.

use crate::{SourceError, SourceResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Service name scoping every stored key.
pub const SERVICE_NAME: &str = "com.adcider.attribution";

/// Trait for secure storage backends.
pub trait SecureStorage: Send + Sync {
    /// Store a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> SourceResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> SourceResult<Option<String>>;

    /// Delete a value. Returns whether it existed.
    fn delete(&self, key: &str) -> SourceResult<bool>;

    /// Check if a key exists.
    fn has(&self, key: &str) -> SourceResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Storage backed by a JSON object on disk.
///
/// Keys are namespaced by [`SERVICE_NAME`]. Every write rewrites the file.
pub struct FileStorage {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, reading any existing content.
    pub fn open(path: impl Into<PathBuf>) -> SourceResult<Self> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Identity store is corrupt, starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = data.len(), "Opened file storage");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scoped(key: &str) -> String {
        format!("{}/{}", SERVICE_NAME, key)
    }

    fn write(&self, data: &HashMap<String, String>) -> SourceResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(data)?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SecureStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> SourceResult<()> {
        debug!(service = SERVICE_NAME, key = %key, "Setting secret");
        let mut data = self.data.lock();
        let previous = data.insert(Self::scoped(key), value.to_string());
        if let Err(e) = self.write(&data) {
            match previous {
                Some(old) => data.insert(Self::scoped(key), old),
                None => data.remove(&Self::scoped(key)),
            };
            return Err(SourceError::Storage(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> SourceResult<Option<String>> {
        debug!(service = SERVICE_NAME, key = %key, "Getting secret");
        Ok(self.data.lock().get(&Self::scoped(key)).cloned())
    }

    fn delete(&self, key: &str) -> SourceResult<bool> {
        debug!(service = SERVICE_NAME, key = %key, "Deleting secret");
        let mut data = self.data.lock();
        let Some(old) = data.remove(&Self::scoped(key)) else {
            return Ok(false);
        };
        if let Err(e) = self.write(&data) {
            data.insert(Self::scoped(key), old);
            return Err(SourceError::Storage(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            )));
        }
        Ok(true)
    }
}

/// In-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> SourceResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> SourceResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> SourceResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}
