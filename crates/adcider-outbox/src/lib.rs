//! Reliable delivery of attribution batches.
//!
//! This crate provides:
//! - AttributionOutbox: the batching engine that merges fragments, flushes,
//!   deduplicates and schedules retry sweeps
//! - SentIdLedger: durable set of already-delivered transaction ids
//! - RetryQueue: durable list of failed batches with attempt counters
//! - BackoffPolicy: exponential delay with symmetric jitter
//! - HttpDeliveryClient: single-attempt JSON POST to the collector

mod backoff;
mod engine;
mod error;
mod ledger;
mod payload;
mod queue;
mod sender;
mod store;

pub use backoff::BackoffPolicy;
pub use engine::{AttributionOutbox, OutboxConfig, OutboxStatus};
pub use error::{OutboxError, OutboxResult};
pub use ledger::SentIdLedger;
pub use payload::{BatchPayload, Price, RetryEntry, TransactionKind, TransactionRecord};
pub use queue::RetryQueue;
pub use sender::{DeliveryClient, HttpDeliveryClient, SenderConfig, USER_AGENT};
