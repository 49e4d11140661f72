//! Forwards store transactions to the outbox.

use crate::{CachedProductCatalog, IdentityProvider, PurchaseTransaction, SourceResult};
use adcider_outbox::AttributionOutbox;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Push stream of store transactions. `Err` items failed verification.
pub type TransactionStream = BoxStream<'static, SourceResult<PurchaseTransaction>>;

/// Consumes a [`TransactionStream`] on a background task, queueing each
/// verified transaction on its own.
pub struct TransactionObserver {
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<CachedProductCatalog>,
    outbox: AttributionOutbox,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionObserver {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<CachedProductCatalog>,
        outbox: AttributionOutbox,
    ) -> Self {
        Self {
            identity,
            catalog,
            outbox,
            listener: Mutex::new(None),
        }
    }

    /// Start consuming `transactions`, replacing any previous listener.
    pub fn start(&self, mut transactions: TransactionStream) {
        info!("Starting transaction observer");
        let uid = self.identity.installation_id();
        let catalog = Arc::clone(&self.catalog);
        let outbox = self.outbox.clone();

        let handle = tokio::spawn(async move {
            while let Some(item) = transactions.next().await {
                match item {
                    Ok(transaction) => handle_transaction(&uid, &catalog, &outbox, transaction).await,
                    Err(e) => error!(error = %e, "Failed to process transaction update"),
                }
            }
            debug!("Transaction stream ended");
        });

        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the listener. Transactions not yet pulled from the stream are
    /// left unconsumed.
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            info!("Stopping transaction observer");
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TransactionObserver {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

async fn handle_transaction(
    uid: &str,
    catalog: &CachedProductCatalog,
    outbox: &AttributionOutbox,
    transaction: PurchaseTransaction,
) {
    debug!(transaction_id = transaction.id, "Processing transaction");
    let product = catalog.product(&transaction.product_id).await;
    let record = transaction.to_record(product.as_ref());

    debug!(transaction_id = transaction.id, uid = %uid, kind = record.kind.as_str(), "Queuing transaction");
    if let Err(e) = outbox.queue(uid, None, vec![record]).await {
        error!(transaction_id = transaction.id, error = %e, "Failed to queue transaction");
    }
}
