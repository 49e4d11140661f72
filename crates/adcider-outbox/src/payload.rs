//! Wire and persistence shapes.
//!
//! Field names follow the collector's JSON contract, so most structs carry
//! explicit serde renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Decimal amount kept as the literal the store reported.
///
/// Serialized as a bare JSON number with every digit intact; it never goes
/// through a float.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Price(String);

impl Price {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Price {
    type Err = serde_json::Error;

    /// Accepts any JSON number literal, e.g. `4.99` or `1.2e3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        serde_json::from_str::<serde_json::Number>(s)?;
        Ok(Price(s.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawValue::from_string(self.0.clone())
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        raw.get().parse().map_err(serde::de::Error::custom)
    }
}

/// Purchase classification reported alongside each transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Consumable,
    NonConsumable,
    Trial,
    Subscription,
    Unknown,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Consumable => "consumable",
            TransactionKind::NonConsumable => "non-consumable",
            TransactionKind::Trial => "trial",
            TransactionKind::Subscription => "subscription",
            TransactionKind::Unknown => "unknown",
        }
    }
}

/// One purchase event. Only `transaction_id` is interpreted by the engine;
/// everything else is passed through to the collector untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: String,
    #[serde(rename = "productID")]
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub quantity: i64,
    pub price: Option<Price>,
    pub currency_code: Option<String>,
    #[serde(rename = "originalTransactionID")]
    pub original_transaction_id: Option<u64>,
    pub app_account_token: Option<Uuid>,
    pub is_upgraded: bool,
    pub revocation_date: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

impl TransactionRecord {
    /// Minimal record with the pass-through fields left empty.
    pub fn new(
        transaction_id: impl Into<String>,
        product_id: impl Into<String>,
        purchase_date: DateTime<Utc>,
        kind: TransactionKind,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            product_id: product_id.into(),
            purchase_date,
            quantity: 1,
            price: None,
            currency_code: None,
            original_transaction_id: None,
            app_account_token: None,
            is_upgraded: false,
            revocation_date: None,
            revocation_reason: None,
            kind,
        }
    }
}

/// Body of one POST to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPayload {
    pub uid: String,
    pub bundle_id: Option<String>,
    pub apple_attribution_token: Option<String>,
    pub transactions: Vec<TransactionRecord>,
}

impl BatchPayload {
    /// Transaction ids carried by this batch, in order.
    pub fn transaction_ids(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.transaction_id.clone())
            .collect()
    }
}

/// A failed batch waiting for the next sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryEntry {
    pub batch: BatchPayload,
    /// Failed sweep attempts so far (the initial send is not counted).
    pub attempt_count: u32,
    pub last_attempt: DateTime<Utc>,
}

impl RetryEntry {
    /// Entry for a batch whose first send just failed.
    pub fn first_failure(batch: BatchPayload) -> Self {
        Self {
            batch,
            attempt_count: 0,
            last_attempt: Utc::now(),
        }
    }

    /// The same batch after one more failed sweep attempt.
    pub fn failed_again(self) -> Self {
        Self {
            batch: self.batch,
            attempt_count: self.attempt_count.saturating_add(1),
            last_attempt: Utc::now(),
        }
    }
}
