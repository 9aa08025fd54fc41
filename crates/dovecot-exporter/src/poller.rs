//! Quota poller
//!
//! Drives the scan → parse → update cycle on a fixed interval:
//!
//! ```text
//! Idle ──start/timer──▶ Polling ──scan done──▶ Idle ──cancel──▶ Stopped
//! ```
//!
//! The first poll runs as soon as the loop starts. Cancellation is only
//! observed between cycles, so a poll already in flight always finishes
//! and its updates land in the registry. One cycle runs at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dovecot_exporter_common::{
    ExporterError, MetricSample, Result, DEFAULT_POLL_INTERVAL_SECS, QUOTA_KEY_PATTERN,
};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::registry::QuotaRegistry;
use crate::scanner::KeyScanner;
use crate::store::QuotaStore;

/// Poller settings
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Glob pattern passed to `SCAN MATCH`
    pub pattern: String,
    /// `SCAN COUNT` hint
    pub scan_count: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            pattern: QUOTA_KEY_PATTERN.to_string(),
            scan_count: 100,
        }
    }
}

/// Lifecycle state of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Keys returned by the scan
    pub keys_scanned: u64,
    /// Samples written to the registry
    pub samples_applied: u64,
    /// Keys skipped because of a per-key error
    pub keys_rejected: u64,
    /// Scan ended early because a later page could not be fetched
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Periodic quota poller; sole writer of the registry
pub struct QuotaPoller {
    store: Arc<dyn QuotaStore>,
    registry: Arc<QuotaRegistry>,
    config: PollerConfig,
    state: Arc<RwLock<PollerState>>,
}

impl QuotaPoller {
    pub fn new(
        store: Arc<dyn QuotaStore>,
        registry: Arc<QuotaRegistry>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            state: Arc::new(RwLock::new(PollerState::Idle)),
        }
    }

    /// Registry written by this poller
    pub fn registry(&self) -> Arc<QuotaRegistry> {
        self.registry.clone()
    }

    pub fn state(&self) -> PollerState {
        *self.state.read()
    }

    fn set_state(&self, state: PollerState) {
        *self.state.write() = state;
    }

    /// Run a single cycle
    ///
    /// Only a failure to start the scan is returned as an error; every
    /// per-key problem is logged and counted in the report.
    #[instrument(skip(self), fields(store = %self.store.describe()))]
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let mut scanner =
            KeyScanner::start(self.store.as_ref(), &self.config.pattern, self.config.scan_count)
                .await?;

        let mut report = CycleReport::default();
        while let Some(entry) = scanner.next().await {
            let sample = entry.and_then(|entry| {
                MetricSample::from_scan(&entry.key, entry.value).map_err(ExporterError::from)
            });

            match sample {
                Ok(sample) => {
                    debug!(
                        email = %sample.identity.email,
                        kind = %sample.kind,
                        value = sample.value,
                        "Quota sample"
                    );
                    self.registry.apply(&sample);
                    report.keys_scanned += 1;
                    report.samples_applied += 1;
                }
                Err(e) if e.is_per_key() => {
                    warn!(error = %e, "Skipping quota key");
                    report.keys_scanned += 1;
                    report.keys_rejected += 1;
                }
                Err(e) => {
                    error!(error = %e, "Quota scan interrupted");
                    report.interrupted = true;
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Spawn the polling loop and return immediately
    pub fn start(self, shutdown: CancellationToken) -> PollerHandle {
        let state = self.state.clone();
        let task = tokio::spawn(async move { self.run(shutdown).await });
        PollerHandle { state, task }
    }

    /// Run the polling loop until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            pattern = %self.config.pattern,
            "Quota poller started"
        );

        loop {
            self.set_state(PollerState::Polling);
            match self.poll_once().await {
                Ok(report) => info!(
                    keys_scanned = report.keys_scanned,
                    samples_applied = report.samples_applied,
                    keys_rejected = report.keys_rejected,
                    interrupted = report.interrupted,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Quota poll complete"
                ),
                Err(e) => error!(error = %e, "Quota poll failed"),
            }
            self.set_state(PollerState::Idle);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.set_state(PollerState::Stopped);
        info!("Exporter shutdown");
    }
}

/// Handle to a running polling loop
pub struct PollerHandle {
    state: Arc<RwLock<PollerState>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.read()
    }

    /// Wait for the loop to exit after cancellation
    pub async fn stopped(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| ExporterError::Internal(format!("Poller task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use dovecot_exporter_common::{MailboxIdentity, MetricKind};

    fn identity(email: &str) -> MailboxIdentity {
        MailboxIdentity::parse(email).unwrap()
    }

    fn poller(store: &MemoryStore) -> QuotaPoller {
        QuotaPoller::new(
            Arc::new(store.clone()),
            Arc::new(QuotaRegistry::new()),
            PollerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_poll_once_mixed_keys() {
        let store = MemoryStore::with_entries([
            ("a@x.com/quota/storage", "100"),
            ("b@y.com/quota/messages", "42"),
            ("bad/quota/storage", "1"),
            ("a@x.com/quota/weird", "5"),
        ]);
        let poller = poller(&store);

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.keys_scanned, 4);
        assert_eq!(report.samples_applied, 2);
        assert_eq!(report.keys_rejected, 2);
        assert!(!report.interrupted);

        let registry = poller.registry();
        assert_eq!(registry.get(MetricKind::Storage, &identity("a@x.com")), Some(100.0));
        assert_eq!(registry.get(MetricKind::Messages, &identity("b@y.com")), Some(42.0));
        assert_eq!(registry.len(MetricKind::Storage), 1);
        assert_eq!(registry.len(MetricKind::Messages), 1);
    }

    #[tokio::test]
    async fn test_non_numeric_value_keeps_previous_entry() {
        let store = MemoryStore::with_entries([("a@x.com/quota/storage", "100")]);
        let poller = poller(&store);
        poller.poll_once().await.unwrap();

        store.set("a@x.com/quota/storage", "not-a-number");
        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.keys_rejected, 1);
        assert_eq!(
            poller.registry().get(MetricKind::Storage, &identity("a@x.com")),
            Some(100.0)
        );
    }

    #[tokio::test]
    async fn test_connection_error_fails_cycle_and_keeps_registry() {
        let store = MemoryStore::with_entries([("a@x.com/quota/messages", "7")]);
        let poller = poller(&store);
        poller.poll_once().await.unwrap();

        store.set_unreachable(true);
        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, ExporterError::Connection(_)));
        assert_eq!(
            poller.registry().get(MetricKind::Messages, &identity("a@x.com")),
            Some(7.0)
        );
    }

    #[tokio::test]
    async fn test_non_utf8_key_is_rejected_not_fatal() {
        let store = MemoryStore::with_entries([
            ("a@x.com/quota/storage", "100"),
            ("b@y.com/quota/messages", "42"),
        ]);
        store.set_raw(b"\xff\xfe@x.com/quota/storage".to_vec(), "3");
        let poller = poller(&store);

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.keys_scanned, 3);
        assert_eq!(report.samples_applied, 2);
        assert_eq!(report.keys_rejected, 1);
        assert!(!report.interrupted);

        let registry = poller.registry();
        assert_eq!(registry.get(MetricKind::Storage, &identity("a@x.com")), Some(100.0));
        assert_eq!(registry.get(MetricKind::Messages, &identity("b@y.com")), Some(42.0));
        assert_eq!(registry.len(MetricKind::Storage), 1);
    }

    #[tokio::test]
    async fn test_stale_identity_is_kept() {
        let store = MemoryStore::with_entries([("gone@x.com/quota/storage", "9")]);
        let poller = poller(&store);
        poller.poll_once().await.unwrap();

        store.remove("gone@x.com/quota/storage");
        poller.poll_once().await.unwrap();

        assert_eq!(
            poller.registry().get(MetricKind::Storage, &identity("gone@x.com")),
            Some(9.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_on_interval_until_cancelled() {
        let store = MemoryStore::with_entries([("a@x.com/quota/storage", "1")]);
        let shutdown = CancellationToken::new();
        let handle = poller(&store).start(shutdown.clone());

        // First cycle runs immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.connections(), 1);
        assert_eq!(handle.state(), PollerState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.connections(), 2);

        // Cancelled while idle: no further scan
        shutdown.cancel();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.connections(), 2);
        assert_eq!(handle.state(), PollerState::Stopped);
        handle.stopped().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retries_after_interval() {
        let store = MemoryStore::with_entries([("a@x.com/quota/storage", "1")]);
        store.set_unreachable(true);
        let shutdown = CancellationToken::new();
        let poller = poller(&store);
        let registry = poller.registry();
        let handle = poller.start(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.is_empty());

        store.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.len(MetricKind::Storage), 1);

        shutdown.cancel();
        handle.stopped().await.unwrap();
    }
}
