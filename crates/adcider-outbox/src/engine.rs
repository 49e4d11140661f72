//! Batching engine.
//!
//! Fragments from the token source and the transaction stream are merged
//! into one pending batch and flushed to the collector. Failed batches go to
//! the retry queue and are replayed by a timed sweep.

use crate::{
    BackoffPolicy, BatchPayload, DeliveryClient, OutboxError, OutboxResult, RetryEntry, RetryQueue,
    SentIdLedger, TransactionRecord,
};
use adcider_core::{Config, Paths};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Host application bundle id, sent as `bundleId`.
    pub bundle_id: Option<String>,
    /// Mirror file for the retry queue.
    pub retry_queue_path: PathBuf,
    /// Mirror file for the delivered-id ledger.
    pub sent_ids_path: PathBuf,
    /// Sweep attempts before a failed batch is abandoned.
    pub max_attempts: u32,
    /// Delay policy for retry sweeps.
    pub backoff: BackoffPolicy,
}

impl OutboxConfig {
    pub fn new(retry_queue_path: impl Into<PathBuf>, sent_ids_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_id: None,
            retry_queue_path: retry_queue_path.into(),
            sent_ids_path: sent_ids_path.into(),
            max_attempts: adcider_core::DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Build from the shared config and file layout.
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        Self {
            bundle_id: config.bundle_id.clone(),
            retry_queue_path: paths.retry_queue_file(),
            sent_ids_path: paths.sent_ids_file(),
            max_attempts: config.max_retry_attempts,
            backoff: BackoffPolicy::new(config.backoff_base(), config.backoff_max()),
        }
    }
}

/// Point-in-time view of the engine, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxStatus {
    pub has_identity: bool,
    pub has_pending_token: bool,
    pub pending_records: usize,
    pub retry_queue_len: usize,
    pub sweep_scheduled: bool,
    pub delivered_ids: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepState {
    Idle,
    Scheduled,
}

/// Batch being assembled before its first send.
#[derive(Debug, Default)]
struct PendingBatch {
    identity: Option<String>,
    attribution_token: Option<String>,
    records: Vec<TransactionRecord>,
}

impl PendingBatch {
    fn merge(&mut self, identity: String, token: Option<String>, records: Vec<TransactionRecord>) {
        self.identity = Some(identity);
        if token.is_some() {
            self.attribution_token = token;
        }
        self.records.extend(records);
    }

    /// Drop the first `count` records and, if it is still the one that was
    /// sent, the token. Identity goes once nothing is left.
    fn settle(&mut self, count: usize, sent_token: Option<&str>) {
        self.records.drain(..count.min(self.records.len()));
        if sent_token.is_some() && self.attribution_token.as_deref() == sent_token {
            self.attribution_token = None;
        }
        if self.records.is_empty() && self.attribution_token.is_none() {
            self.identity = None;
        }
    }
}

/// One flush attempt taken from the pending batch.
struct Snapshot {
    batch: BatchPayload,
    record_count: usize,
    generation: u64,
}

struct EngineState {
    pending: PendingBatch,
    ledger: SentIdLedger,
    queue: RetryQueue,
    sweep: SweepState,
    timer: Option<JoinHandle<()>>,
    flushing: bool,
    generation: u64,
}

impl EngineState {
    async fn snapshot(&mut self, bundle_id: &Option<String>) -> Option<Snapshot> {
        let uid = self.pending.identity.clone()?;
        if self.pending.attribution_token.is_none() && self.pending.records.is_empty() {
            return None;
        }

        self.ledger.ensure_loaded().await;
        let record_count = self.pending.records.len();
        let transactions: Vec<TransactionRecord> = self
            .pending
            .records
            .iter()
            .filter(|r| !self.ledger.contains(&r.transaction_id))
            .cloned()
            .collect();

        if transactions.len() < record_count {
            debug!(
                skipped = record_count - transactions.len(),
                "Skipping already delivered transactions"
            );
        }

        let token = self.pending.attribution_token.clone();
        if transactions.is_empty() && token.is_none() {
            self.pending.settle(record_count, None);
            return None;
        }

        Some(Snapshot {
            batch: BatchPayload {
                uid,
                bundle_id: bundle_id.clone(),
                apple_attribution_token: token,
                transactions,
            },
            record_count,
            generation: self.generation,
        })
    }
}

struct Inner {
    config: OutboxConfig,
    client: Arc<dyn DeliveryClient>,
    api_key: RwLock<Option<String>>,
    state: Mutex<EngineState>,
}

/// Merges attribution fragments and delivers them at least once.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct AttributionOutbox {
    inner: Arc<Inner>,
}

impl AttributionOutbox {
    pub fn new(config: OutboxConfig, client: Arc<dyn DeliveryClient>) -> Self {
        let state = EngineState {
            pending: PendingBatch::default(),
            ledger: SentIdLedger::new(config.sent_ids_path.clone()),
            queue: RetryQueue::new(config.retry_queue_path.clone()),
            sweep: SweepState::Idle,
            timer: None,
            flushing: false,
            generation: 0,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                client,
                api_key: RwLock::new(None),
                state: Mutex::new(state),
            }),
        }
    }

    /// Set the collector credential. Empty keys are rejected.
    pub async fn configure(&self, api_key: &str) -> OutboxResult<()> {
        if api_key.is_empty() {
            return Err(OutboxError::Config("API key cannot be empty".to_string()));
        }
        *self.inner.api_key.write().await = Some(api_key.to_string());
        info!("Outbox configured");
        Ok(())
    }

    /// Load the persisted retry queue and arm a sweep if it holds anything.
    pub async fn start(&self) {
        let mut state = self.inner.state.lock().await;
        let loaded = state.queue.load().await;
        if loaded > 0 {
            info!(count = loaded, "Restored pending retries");
        }
        self.inner.schedule_if_needed(&mut state);
    }

    /// Merge a fragment into the pending batch and flush in the background.
    ///
    /// Returns once the fragment is merged. Delivery outcomes are never
    /// reported back to the caller.
    pub async fn queue(
        &self,
        identity: impl Into<String>,
        attribution_token: Option<String>,
        records: Vec<TransactionRecord>,
    ) -> OutboxResult<()> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(OutboxError::Config("identity cannot be empty".to_string()));
        }

        {
            let mut state = self.inner.state.lock().await;
            debug!(
                records = records.len(),
                has_token = attribution_token.is_some(),
                "Queued attribution fragment"
            );
            state.pending.merge(identity, attribution_token, records);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.flush().await;
        });
        Ok(())
    }

    /// Flush the pending batch now.
    ///
    /// Returns immediately if another flush is already running; that flush
    /// picks up whatever is pending. The flush runs on its own task, so
    /// dropping the returned future does not cut it short.
    pub async fn flush(&self) {
        let inner = Arc::clone(&self.inner);
        if let Err(e) = tokio::spawn(async move { inner.flush().await }).await {
            warn!(error = %e, "Flush task failed");
        }
    }

    /// Replay the retry queue now instead of waiting for the timer.
    pub async fn sweep(&self) {
        let generation = {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation
        };
        self.inner.run_sweep(generation).await;
    }

    /// Drop every piece of in-memory state and cancel the sweep timer.
    ///
    /// Persisted files are kept. Sends already in flight finish, but their
    /// results are ignored.
    pub async fn cleanup(&self) {
        let mut state = self.inner.state.lock().await;
        state.generation = state.generation.wrapping_add(1);
        state.pending = PendingBatch::default();
        state.queue.reset();
        state.ledger.reset();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.sweep = SweepState::Idle;
        state.flushing = false;
        info!("Outbox cleaned up");
    }

    pub async fn status(&self) -> OutboxStatus {
        let state = self.inner.state.lock().await;
        OutboxStatus {
            has_identity: state.pending.identity.is_some(),
            has_pending_token: state.pending.attribution_token.is_some(),
            pending_records: state.pending.records.len(),
            retry_queue_len: state.queue.len(),
            sweep_scheduled: state.sweep == SweepState::Scheduled,
            delivered_ids: state.ledger.len(),
        }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn api_key(&self) -> Option<String> {
        self.api_key.read().await.clone()
    }

    /// Send `batch` on a separate task. A client that panics counts as a
    /// failed delivery.
    async fn deliver(&self, batch: &BatchPayload) -> OutboxResult<()> {
        let client = Arc::clone(&self.client);
        let batch = batch.clone();
        let api_key = self.api_key().await;
        tokio::spawn(async move { client.send(&batch, api_key.as_deref()).await })
            .await
            .unwrap_or_else(|e| Err(OutboxError::DeliveryAborted(e.to_string())))
    }

    async fn flush(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.lock().await;
            if state.flushing {
                debug!("Flush already running");
                return;
            }
            state.flushing = true;
            state.generation
        };

        loop {
            let snapshot = {
                let mut state = self.state.lock().await;
                if state.generation != generation {
                    return;
                }
                match state.snapshot(&self.config.bundle_id).await {
                    Some(snapshot) => snapshot,
                    None => {
                        state.flushing = false;
                        return;
                    }
                }
            };

            let result = self.deliver(&snapshot.batch).await;

            let mut state = self.state.lock().await;
            if state.generation != snapshot.generation {
                debug!("Discarding flush result after cleanup");
                return;
            }

            let Snapshot {
                batch,
                record_count,
                ..
            } = snapshot;
            state
                .pending
                .settle(record_count, batch.apple_attribution_token.as_deref());

            match result {
                Ok(()) => {
                    info!(
                        uid = %batch.uid,
                        transactions = batch.transactions.len(),
                        "Attribution batch delivered"
                    );
                    state.ledger.mark_delivered(batch.transaction_ids()).await;
                }
                Err(e) => {
                    warn!(
                        uid = %batch.uid,
                        transactions = batch.transactions.len(),
                        error = %e,
                        "Delivery failed, queued for retry"
                    );
                    state.queue.enqueue(RetryEntry::first_failure(batch)).await;
                    self.schedule_if_needed(&mut state);
                }
            }
        }
    }

    /// Arm the sweep timer unless it is already armed or there is nothing
    /// to retry. Callers load the queue first.
    fn schedule_if_needed(self: &Arc<Self>, state: &mut EngineState) {
        if state.sweep == SweepState::Scheduled {
            return;
        }
        if state.queue.is_empty() {
            return;
        }

        let delay = self.config.backoff.delay(0);
        let generation = state.generation;
        debug!(
            delay_ms = delay.as_millis() as u64,
            entries = state.queue.len(),
            "Scheduling retry sweep"
        );

        state.sweep = SweepState::Scheduled;
        let inner = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.run_sweep(generation).await;
        }));
    }

    async fn run_sweep(self: &Arc<Self>, generation: u64) {
        let entries = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            state.sweep = SweepState::Idle;
            state.timer = None;
            let drained = state.queue.drain_all().await;
            state.ledger.ensure_loaded().await;
            drained
                .into_iter()
                .filter_map(|entry| without_delivered(entry, &state.ledger))
                .collect::<Vec<_>>()
        };

        if !entries.is_empty() {
            info!(count = entries.len(), "Running retry sweep");
        }

        let max_attempts = self.config.max_attempts;
        for entry in entries {
            if entry.attempt_count >= max_attempts {
                self.abandon(&entry);
                continue;
            }

            let result = self.deliver(&entry.batch).await;

            let mut state = self.state.lock().await;
            if state.generation != generation {
                debug!("Discarding sweep results after cleanup");
                return;
            }

            match result {
                Ok(()) => {
                    info!(
                        uid = %entry.batch.uid,
                        attempt = entry.attempt_count + 1,
                        "Retried batch delivered"
                    );
                    state.ledger.mark_delivered(entry.batch.transaction_ids()).await;
                }
                Err(e) => {
                    let next = entry.failed_again();
                    if next.attempt_count >= max_attempts {
                        self.abandon(&next);
                    } else {
                        warn!(
                            uid = %next.batch.uid,
                            attempt = next.attempt_count,
                            error = %e,
                            "Retry failed"
                        );
                        state.queue.enqueue(next).await;
                    }
                }
            }
        }

        let mut state = self.state.lock().await;
        if state.generation == generation {
            self.schedule_if_needed(&mut state);
        }
    }

    fn abandon(&self, entry: &RetryEntry) {
        let err = OutboxError::ExhaustedRetries {
            uid: entry.batch.uid.clone(),
            attempts: entry.attempt_count,
        };
        warn!(
            transactions = entry.batch.transactions.len(),
            error = %err,
            "Dropping batch"
        );
    }
}

/// Strip ids the ledger already holds. `None` when nothing worth sending
/// remains.
fn without_delivered(mut entry: RetryEntry, ledger: &SentIdLedger) -> Option<RetryEntry> {
    entry
        .batch
        .transactions
        .retain(|t| !ledger.contains(&t.transaction_id));
    if entry.batch.transactions.is_empty() && entry.batch.apple_attribution_token.is_none() {
        debug!(uid = %entry.batch.uid, "Retry entry already delivered");
        return None;
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransactionKind;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Delivery client answering from a script, falling back to a default.
    struct ScriptedClient {
        script: std::sync::Mutex<VecDeque<bool>>,
        default_ok: bool,
        latency: Duration,
        sent: std::sync::Mutex<Vec<(BatchPayload, Option<String>)>>,
    }

    impl ScriptedClient {
        fn new(default_ok: bool) -> Arc<Self> {
            Self::scripted(Vec::new(), default_ok)
        }

        fn scripted(script: Vec<bool>, default_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(script.into()),
                default_ok,
                latency: Duration::ZERO,
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn slow(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: std::sync::Mutex::new(VecDeque::new()),
                default_ok: true,
                latency,
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(BatchPayload, Option<String>)> {
            self.sent.lock().unwrap().clone()
        }

        fn send_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn sent_ids(&self) -> Vec<String> {
            self.sent()
                .iter()
                .flat_map(|(batch, _)| batch.transaction_ids())
                .collect()
        }
    }

    #[async_trait]
    impl DeliveryClient for ScriptedClient {
        async fn send(&self, batch: &BatchPayload, api_key: Option<&str>) -> OutboxResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((batch.clone(), api_key.map(str::to_string)));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let ok = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.default_ok);
            if ok {
                Ok(())
            } else {
                Err(OutboxError::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            }
        }
    }

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord::new(id, "com.example.coins", Utc::now(), TransactionKind::Consumable)
    }

    fn test_config(dir: &TempDir) -> OutboxConfig {
        OutboxConfig {
            bundle_id: Some("com.example.app".to_string()),
            retry_queue_path: dir.path().join("adcider_retry_queue.json"),
            sent_ids_path: dir.path().join("adcider_sent_transaction_ids.json"),
            max_attempts: 3,
            backoff: BackoffPolicy::new(Duration::from_millis(20), Duration::from_millis(40)),
        }
    }

    fn outbox(dir: &TempDir, client: Arc<ScriptedClient>) -> AttributionOutbox {
        AttributionOutbox::new(test_config(dir), client)
    }

    async fn wait_until<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    async fn wait_for_status<F>(outbox: &AttributionOutbox, mut condition: F)
    where
        F: FnMut(&OutboxStatus) -> bool,
    {
        for _ in 0..200 {
            if condition(&outbox.status().await) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("status condition not met in time: {:?}", outbox.status().await);
    }

    #[test]
    fn merge_keeps_token_when_fragment_has_none() {
        let mut pending = PendingBatch::default();
        pending.merge("u1".to_string(), Some("T".to_string()), vec![]);
        pending.merge("u2".to_string(), None, vec![record("r1")]);

        assert_eq!(pending.attribution_token.as_deref(), Some("T"));
        assert_eq!(pending.identity.as_deref(), Some("u2"));
        assert_eq!(pending.records.len(), 1);
    }

    #[test]
    fn merge_replaces_token_when_fragment_has_one() {
        let mut pending = PendingBatch::default();
        pending.merge("u1".to_string(), Some("T1".to_string()), vec![record("r1")]);
        pending.merge("u1".to_string(), Some("T2".to_string()), vec![record("r2")]);

        assert_eq!(pending.attribution_token.as_deref(), Some("T2"));
        assert_eq!(pending.records.len(), 2);
    }

    #[test]
    fn config_from_core_config() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/adcider-test"));
        let core = Config {
            bundle_id: Some("com.example.app".to_string()),
            max_retry_attempts: 5,
            ..Config::default()
        };

        let config = OutboxConfig::from_config(&core, &paths);
        assert_eq!(config.bundle_id.as_deref(), Some("com.example.app"));
        assert_eq!(config.retry_queue_path, paths.retry_queue_file());
        assert_eq!(config.sent_ids_path, paths.sent_ids_file());
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff, BackoffPolicy::default());
    }

    #[tokio::test]
    async fn configure_rejects_empty_key() {
        let dir = tempdir().unwrap();
        let outbox = outbox(&dir, ScriptedClient::new(true));

        let err = outbox.configure("").await.unwrap_err();
        assert!(matches!(err, OutboxError::Config(_)));
        outbox.configure("key").await.unwrap();
        outbox.configure("key").await.unwrap();
    }

    #[tokio::test]
    async fn queue_rejects_empty_identity_without_io() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());

        let err = outbox
            .queue("", Some("T".to_string()), vec![record("t1")])
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::Config(_)));

        outbox.flush().await;
        assert_eq!(client.send_count(), 0);
        assert_eq!(outbox.status().await.pending_records, 0);
    }

    #[tokio::test]
    async fn identity_only_fragment_sends_nothing() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", None, vec![]).await.unwrap();
        outbox.flush().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(client.send_count(), 0);
        assert!(outbox.status().await.has_identity);
    }

    #[tokio::test]
    async fn token_only_success_clears_token_and_leaves_ledger() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());
        outbox.configure("key-1").await.unwrap();

        outbox.queue("u1", Some("T".to_string()), vec![]).await.unwrap();
        wait_until(|| client.send_count() == 1).await;
        wait_for_status(&outbox, |s| !s.has_pending_token).await;

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        let (batch, key) = &sent[0];
        assert_eq!(batch.uid, "u1");
        assert_eq!(batch.bundle_id.as_deref(), Some("com.example.app"));
        assert_eq!(batch.apple_attribution_token.as_deref(), Some("T"));
        assert!(batch.transactions.is_empty());
        assert_eq!(key.as_deref(), Some("key-1"));

        let status = outbox.status().await;
        assert_eq!(status.delivered_ids, 0);
        assert!(!status.has_identity);

        outbox.flush().await;
        assert_eq!(client.send_count(), 1);
    }

    #[tokio::test]
    async fn delivered_ids_are_never_resent() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 1).await;

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        outbox.flush().await;
        wait_for_status(&outbox, |s| s.pending_records == 0).await;

        assert_eq!(client.send_count(), 1);
        assert_eq!(client.sent_ids(), vec!["t1"]);
    }

    #[tokio::test]
    async fn ledger_filter_keeps_token_in_batch() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 1).await;

        outbox
            .queue("u1", Some("T".to_string()), vec![record("t1"), record("t2")])
            .await
            .unwrap();
        wait_until(|| client.send_count() == 2).await;

        let (second, _) = &client.sent()[1];
        assert_eq!(second.apple_attribution_token.as_deref(), Some("T"));
        assert_eq!(second.transaction_ids(), vec!["t2"]);
    }

    #[tokio::test]
    async fn failed_flush_moves_batch_to_retry_queue() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(false);
        let mut config = test_config(&dir);
        config.backoff = BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(3600));
        let outbox = AttributionOutbox::new(config, client.clone());

        outbox.queue("u1", Some("T".to_string()), vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.retry_queue_len == 1).await;

        let status = outbox.status().await;
        assert!(status.sweep_scheduled);
        assert_eq!(status.pending_records, 0);
        assert!(!status.has_pending_token);
        assert_eq!(status.delivered_ids, 0);

        let persisted: Vec<RetryEntry> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("adcider_retry_queue.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].attempt_count, 0);
        assert_eq!(persisted[0].batch.transaction_ids(), vec!["t1"]);
        assert_eq!(persisted[0].batch.apple_attribution_token.as_deref(), Some("T"));

        outbox.cleanup().await;
    }

    #[tokio::test]
    async fn failure_then_sweep_success_records_delivery() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::scripted(vec![false], true);
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", None, vec![record("r1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 1 && s.retry_queue_len == 0).await;

        assert_eq!(client.send_count(), 2);
        let status = outbox.status().await;
        assert!(!status.sweep_scheduled);

        let mut ledger = SentIdLedger::new(dir.path().join("adcider_sent_transaction_ids.json"));
        ledger.ensure_loaded().await;
        assert!(ledger.contains("r1"));
    }

    #[tokio::test]
    async fn always_failing_entry_is_dropped_after_max_attempts() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(false);
        let mut config = test_config(&dir);
        config.backoff = BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(3600));
        let outbox = AttributionOutbox::new(config, client.clone());

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.retry_queue_len == 1).await;

        let queue_path = dir.path().join("adcider_retry_queue.json");
        let attempts = || -> Vec<u32> {
            let entries: Vec<RetryEntry> =
                serde_json::from_str(&std::fs::read_to_string(&queue_path).unwrap()).unwrap();
            entries.iter().map(|e| e.attempt_count).collect()
        };
        assert_eq!(attempts(), vec![0]);

        outbox.sweep().await;
        assert_eq!(attempts(), vec![1]);
        outbox.sweep().await;
        assert_eq!(attempts(), vec![2]);
        outbox.sweep().await;
        assert!(attempts().is_empty());
        outbox.sweep().await;

        assert_eq!(client.send_count(), 4);
        assert_eq!(outbox.status().await.retry_queue_len, 0);
        outbox.cleanup().await;
    }

    #[tokio::test]
    async fn sweep_skips_entries_delivered_elsewhere() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::scripted(vec![false], true);
        let mut config = test_config(&dir);
        config.backoff = BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(3600));
        let outbox = AttributionOutbox::new(config, client.clone());

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.retry_queue_len == 1).await;

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 1).await;

        outbox.sweep().await;
        assert_eq!(client.send_count(), 2);
        assert_eq!(outbox.status().await.retry_queue_len, 0);
    }

    #[tokio::test]
    async fn concurrent_fragments_are_not_lost() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::slow(Duration::from_millis(50));
        let outbox = outbox(&dir, client.clone());

        let a = outbox.clone();
        let b = outbox.clone();
        let (ra, rb) = tokio::join!(
            a.queue("u1", None, vec![record("a1"), record("a2")]),
            b.queue("u1", None, vec![record("b1")]),
        );
        ra.unwrap();
        rb.unwrap();

        wait_for_status(&outbox, |s| s.delivered_ids == 3 && s.pending_records == 0).await;

        let mut ids = client.sent_ids();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn fragments_during_send_are_preserved() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::slow(Duration::from_millis(80));
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", Some("T1".to_string()), vec![record("t1")]).await.unwrap();
        wait_until(|| client.send_count() == 1).await;

        outbox.queue("u1", Some("T2".to_string()), vec![record("t2")]).await.unwrap();
        wait_until(|| client.send_count() == 2).await;
        wait_for_status(&outbox, |s| s.delivered_ids == 2 && !s.has_identity).await;

        let sent = client.sent();
        assert_eq!(sent[0].0.apple_attribution_token.as_deref(), Some("T1"));
        assert_eq!(sent[1].0.apple_attribution_token.as_deref(), Some("T2"));
        assert_eq!(sent[1].0.transaction_ids(), vec!["t2"]);
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_batch_are_kept() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::slow(Duration::from_millis(50));
        let outbox = outbox(&dir, client.clone());

        {
            let mut state = outbox.inner.state.lock().await;
            state
                .pending
                .merge("u1".to_string(), None, vec![record("t1"), record("t1")]);
        }
        outbox.flush().await;

        assert_eq!(client.sent_ids(), vec!["t1", "t1"]);
    }

    #[tokio::test]
    async fn start_restores_queue_and_schedules_sweep() {
        let dir = tempdir().unwrap();
        let mut queue = RetryQueue::new(dir.path().join("adcider_retry_queue.json"));
        queue.enqueue(RetryEntry::first_failure(BatchPayload {
            uid: "u1".to_string(),
            bundle_id: None,
            apple_attribution_token: None,
            transactions: vec![record("t9")],
        }))
        .await;

        let client = ScriptedClient::new(true);
        let mut config = test_config(&dir);
        config.backoff = BackoffPolicy::new(Duration::from_millis(200), Duration::from_millis(400));
        let outbox = AttributionOutbox::new(config, client.clone());
        outbox.start().await;
        assert!(outbox.status().await.sweep_scheduled);

        wait_for_status(&outbox, |s| s.delivered_ids == 1 && s.retry_queue_len == 0).await;
        assert_eq!(client.sent_ids(), vec!["t9"]);
    }

    #[tokio::test]
    async fn cleanup_cancels_sweep_and_keeps_files() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(false);
        let mut config = test_config(&dir);
        config.backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(100));
        let outbox = AttributionOutbox::new(config, client.clone());

        outbox.queue("u1", Some("T".to_string()), vec![record("t1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.sweep_scheduled).await;

        outbox.cleanup().await;
        let status = outbox.status().await;
        assert!(!status.sweep_scheduled);
        assert_eq!(status.retry_queue_len, 0);
        assert!(!status.has_identity);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(client.send_count(), 1);
        assert!(dir.path().join("adcider_retry_queue.json").exists());

        let mut queue = RetryQueue::new(dir.path().join("adcider_retry_queue.json"));
        assert_eq!(queue.load().await, 1);
    }

    #[tokio::test]
    async fn result_after_cleanup_is_discarded() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::slow(Duration::from_millis(80));
        let outbox = outbox(&dir, client.clone());

        outbox.queue("u1", None, vec![record("t1")]).await.unwrap();
        wait_until(|| client.send_count() == 1).await;
        outbox.cleanup().await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let status = outbox.status().await;
        assert_eq!(status.delivered_ids, 0);
        assert!(!dir.path().join("adcider_sent_transaction_ids.json").exists());
    }

    #[tokio::test]
    async fn fragments_merged_before_send_share_one_payload() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::new(true);
        let outbox = outbox(&dir, client.clone());

        // Current-thread runtime: the spawned flush only runs once this task
        // yields, so both fragments are merged before the first send.
        outbox.queue("u1", Some("T".to_string()), vec![]).await.unwrap();
        outbox.queue("u2", None, vec![record("r1")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 1 && !s.has_identity).await;

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        let (batch, _) = &sent[0];
        assert_eq!(batch.uid, "u2");
        assert_eq!(batch.apple_attribution_token.as_deref(), Some("T"));
        assert_eq!(batch.transaction_ids(), vec!["r1"]);
    }

    /// Panics on the first send and succeeds afterwards.
    #[derive(Default)]
    struct PanicOnceClient {
        calls: std::sync::Mutex<usize>,
        delivered: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeliveryClient for PanicOnceClient {
        async fn send(&self, batch: &BatchPayload, _api_key: Option<&str>) -> OutboxResult<()> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if call == 1 {
                panic!("client blew up");
            }
            self.delivered
                .lock()
                .unwrap()
                .extend(batch.transaction_ids());
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_client_does_not_stall_later_flushes() {
        let dir = tempdir().unwrap();
        let client = Arc::new(PanicOnceClient::default());
        let outbox = AttributionOutbox::new(test_config(&dir), client.clone());

        outbox.queue("u1", None, vec![record("r1")]).await.unwrap();
        wait_until(|| *client.calls.lock().unwrap() >= 1).await;
        outbox.queue("u1", None, vec![record("r2")]).await.unwrap();

        wait_for_status(&outbox, |s| {
            s.delivered_ids == 2 && s.pending_records == 0 && s.retry_queue_len == 0
        })
        .await;

        let mut delivered = client.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn dropped_flush_call_still_completes() {
        let dir = tempdir().unwrap();
        let client = ScriptedClient::slow(Duration::from_millis(50));
        let outbox = outbox(&dir, client.clone());

        {
            let mut state = outbox.inner.state.lock().await;
            state.pending.merge("u1".to_string(), None, vec![record("t1")]);
        }
        let _ = tokio::time::timeout(Duration::from_millis(5), outbox.flush()).await;

        wait_for_status(&outbox, |s| s.delivered_ids == 1).await;
        outbox.queue("u1", None, vec![record("t2")]).await.unwrap();
        wait_for_status(&outbox, |s| s.delivered_ids == 2).await;
        assert_eq!(client.sent_ids(), vec!["t1", "t2"]);
    }
}
