//! Producers feeding the attribution outbox.
//!
//! This crate provides:
//! - SecureStorage: key/value persistence for the installation id
//! - InstallationIdentity: stable per-install uid
//! - AttributionTokenSource / AttributionReporter: the install attribution token
//! - ProductCatalog / CachedProductCatalog: product metadata for classification
//! - TransactionObserver: forwards purchase transactions to the outbox

mod catalog;
mod error;
mod identity;
mod observer;
mod reporter;
mod storage;
mod token;
mod transaction;

pub use catalog::{CachedProductCatalog, ProductCatalog, StaticProductCatalog};
pub use error::{SourceError, SourceResult};
pub use identity::{IdentityProvider, InstallationIdentity, INSTALLATION_UID_KEY};
pub use observer::{TransactionObserver, TransactionStream};
pub use reporter::AttributionReporter;
pub use storage::{FileStorage, MemoryStorage, SecureStorage, SERVICE_NAME};
pub use token::{AttributionTokenSource, StaticTokenSource, UnavailableTokenSource};
pub use transaction::{
    classify, OfferType, ProductInfo, ProductType, PurchaseTransaction, RevocationReason,
};
