//! Purchase transactions and their classification.

use adcider_outbox::{Price, TransactionKind, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a purchase was revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevocationReason {
    DeveloperIssue,
    Other,
    /// A reason code this crate does not know.
    Unrecognized(i32),
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::DeveloperIssue => "Developer Issue",
            RevocationReason::Other => "Other",
            RevocationReason::Unrecognized(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Consumable,
    NonConsumable,
    AutoRenewable,
    NonRenewable,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferType {
    Introductory,
    Promotional,
    Other,
}

/// Product metadata needed to classify a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub product_type: ProductType,
    /// Offer attached to the subscription's introductory period, if any.
    pub introductory_offer: Option<OfferType>,
}

impl ProductInfo {
    pub fn new(id: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            id: id.into(),
            product_type,
            introductory_offer: None,
        }
    }

    pub fn with_introductory_offer(mut self, offer: OfferType) -> Self {
        self.introductory_offer = Some(offer);
        self
    }
}

/// A verified purchase as delivered by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    pub id: u64,
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub purchased_quantity: i64,
    pub price: Option<Price>,
    pub currency_code: Option<String>,
    pub original_id: Option<u64>,
    pub app_account_token: Option<Uuid>,
    pub is_upgraded: bool,
    pub revocation_date: Option<DateTime<Utc>>,
    pub revocation_reason: Option<RevocationReason>,
}

impl PurchaseTransaction {
    pub fn new(id: u64, product_id: impl Into<String>, purchase_date: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: product_id.into(),
            purchase_date,
            purchased_quantity: 1,
            price: None,
            currency_code: None,
            original_id: None,
            app_account_token: None,
            is_upgraded: false,
            revocation_date: None,
            revocation_reason: None,
        }
    }

    /// Wire record for this purchase.
    pub fn to_record(&self, product: Option<&ProductInfo>) -> TransactionRecord {
        TransactionRecord {
            transaction_id: self.id.to_string(),
            product_id: self.product_id.clone(),
            purchase_date: self.purchase_date,
            quantity: self.purchased_quantity,
            price: self.price.clone(),
            currency_code: self.currency_code.clone(),
            original_transaction_id: self.original_id,
            app_account_token: self.app_account_token,
            is_upgraded: self.is_upgraded,
            revocation_date: self.revocation_date,
            revocation_reason: self.revocation_reason.map(|r| r.as_str().to_string()),
            kind: classify(product),
        }
    }
}

/// Classify a purchase from its product metadata.
pub fn classify(product: Option<&ProductInfo>) -> TransactionKind {
    let Some(product) = product else {
        return TransactionKind::Unknown;
    };

    match product.product_type {
        ProductType::Consumable => TransactionKind::Consumable,
        ProductType::NonConsumable => TransactionKind::NonConsumable,
        ProductType::AutoRenewable | ProductType::NonRenewable => {
            if product.introductory_offer == Some(OfferType::Introductory) {
                TransactionKind::Trial
            } else {
                TransactionKind::Subscription
            }
        }
        ProductType::Other => TransactionKind::Unknown,
    }
}
