//! Stable per-installation identity.

use crate::SecureStorage;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Storage key holding the installation uid.
pub const INSTALLATION_UID_KEY: &str = "installation_uid";

/// Source of the uid every batch is reported under.
pub trait IdentityProvider: Send + Sync {
    /// The installation id. Never empty.
    fn installation_id(&self) -> String;
}

/// Installation uid kept in [`SecureStorage`], generated on first use.
#[derive(Clone)]
pub struct InstallationIdentity {
    storage: Arc<dyn SecureStorage>,
}

impl InstallationIdentity {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Forget the stored uid. A missing uid counts as removed.
    pub fn remove_installation_id(&self) -> bool {
        match self.storage.delete(INSTALLATION_UID_KEY) {
            Ok(true) => {
                info!("Removed installation uid");
                true
            }
            Ok(false) => {
                debug!("No installation uid to remove");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to remove installation uid");
                false
            }
        }
    }

    fn read(&self) -> Option<String> {
        match self.storage.get(INSTALLATION_UID_KEY) {
            Ok(Some(uid)) if !uid.is_empty() => Some(uid),
            Ok(_) => {
                debug!("No installation uid stored");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to read installation uid");
                None
            }
        }
    }
}

impl IdentityProvider for InstallationIdentity {
    fn installation_id(&self) -> String {
        if let Some(uid) = self.read() {
            debug!("Retrieved existing installation uid");
            return uid;
        }

        let uid = Uuid::new_v4().to_string().to_uppercase();
        match self.storage.set(INSTALLATION_UID_KEY, &uid) {
            Ok(()) => info!("Generated and saved new installation uid"),
            Err(e) => error!(error = %e, "Failed to save installation uid, using temporary uid"),
        }
        uid
    }
}
