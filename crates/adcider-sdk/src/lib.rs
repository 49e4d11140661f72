//! AdCider install attribution SDK.
//!
//! [`AttributionSdk`] wires the installation identity, the attribution token
//! reporter and the transaction observer to the delivery outbox.
//!
//! ```ignore
//! let sdk = AttributionSdk::new(SdkComponents::load()?);
//! sdk.initialize(SdkOptions::new("api-key"), transactions).await?;
//! ```

mod components;
mod error;
mod sdk;

pub use components::SdkComponents;
pub use error::{SdkError, SdkResult};
pub use sdk::{AttributionSdk, SdkOptions};

pub use adcider_outbox::{Price, TransactionKind, TransactionRecord};
pub use adcider_sources::{
    OfferType, ProductInfo, ProductType, PurchaseTransaction, RevocationReason, TransactionStream,
};
