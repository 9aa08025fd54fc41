//! Quota registry
//!
//! Last observed value per mailbox for each quota series. The poller is the
//! only writer; the exposition adapter reads snapshots at scrape time. Each
//! series sits behind its own lock, so a scrape never sees a torn value.
//!
//! Entries are never evicted: a mailbox that disappears from the store keeps
//! its last value until the process restarts.

use std::collections::HashMap;

use dovecot_exporter_common::{MailboxIdentity, MetricKind, MetricSample};
use parking_lot::RwLock;

type Series = RwLock<HashMap<MailboxIdentity, f64>>;

/// In-memory store of the latest quota values
#[derive(Debug, Default)]
pub struct QuotaRegistry {
    storage: Series,
    messages: Series,
}

impl QuotaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn series(&self, kind: MetricKind) -> &Series {
        match kind {
            MetricKind::Storage => &self.storage,
            MetricKind::Messages => &self.messages,
        }
    }

    /// Write a parsed sample, overwriting any previous value
    pub fn apply(&self, sample: &MetricSample) {
        self.set(sample.kind, sample.identity.clone(), sample.value);
    }

    /// Set the value of one series entry
    pub fn set(&self, kind: MetricKind, identity: MailboxIdentity, value: f64) {
        self.series(kind).write().insert(identity, value);
    }

    /// Current value of one series entry
    pub fn get(&self, kind: MetricKind, identity: &MailboxIdentity) -> Option<f64> {
        self.series(kind).read().get(identity).copied()
    }

    /// Copy of one series, sorted by email
    pub fn snapshot(&self, kind: MetricKind) -> Vec<(MailboxIdentity, f64)> {
        let mut entries: Vec<_> = self
            .series(kind)
            .read()
            .iter()
            .map(|(identity, value)| (identity.clone(), *value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of entries in one series
    pub fn len(&self, kind: MetricKind) -> usize {
        self.series(kind).read().len()
    }

    /// True when both series are empty
    pub fn is_empty(&self) -> bool {
        MetricKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }
}
