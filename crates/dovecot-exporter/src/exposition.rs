//! Prometheus exposition of the quota registry
//!
//! Adapts [`QuotaRegistry`] to the `prometheus` describe/collect contract.
//! Gauges are rebuilt from a registry snapshot on every scrape:
//!
//! ```text
//! dovecot_mbox_storage{email="a@x.com",domain="x.com"} 100
//! dovecot_mbox_messages{email="b@y.com",domain="y.com"} 42
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use dovecot_exporter_common::{ExporterError, MetricKind, Result, QUOTA_LABELS};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};
use tracing::warn;

use crate::registry::QuotaRegistry;

/// Read-only collector over a shared quota registry
pub struct QuotaExposition {
    registry: Arc<QuotaRegistry>,
    descs: Vec<Desc>,
}

impl QuotaExposition {
    /// Create the collector; `registry` is shared with the poller
    pub fn new(registry: Arc<QuotaRegistry>) -> Result<Self> {
        let descs = MetricKind::ALL
            .iter()
            .map(|kind| {
                Desc::new(
                    kind.metric_name().to_string(),
                    kind.help().to_string(),
                    QUOTA_LABELS.iter().map(|label| label.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()
            .map_err(|e| ExporterError::Metrics(format!("Invalid metric description: {}", e)))?;

        Ok(Self { registry, descs })
    }

    /// Register this collector with a Prometheus registry
    pub fn register(self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self))
            .map_err(|e| ExporterError::Metrics(format!("Failed to register collector: {}", e)))
    }

    fn gauge_families(&self, kind: MetricKind) -> prometheus::Result<Vec<MetricFamily>> {
        let gauges = GaugeVec::new(Opts::new(kind.metric_name(), kind.help()), &QUOTA_LABELS)?;
        for (identity, value) in self.registry.snapshot(kind) {
            gauges
                .get_metric_with_label_values(&identity.label_values())?
                .set(value);
        }
        Ok(gauges.collect())
    }
}

impl Collector for QuotaExposition {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        MetricKind::ALL
            .iter()
            .flat_map(|kind| match self.gauge_families(*kind) {
                Ok(families) => families,
                Err(e) => {
                    warn!(series = kind.metric_name(), error = %e, "Failed to collect series");
                    Vec::new()
                }
            })
            .collect()
    }
}

/// Build a Prometheus registry exposing the quota series
pub fn metrics_registry(quota: Arc<QuotaRegistry>) -> Result<Registry> {
    let registry = Registry::new();
    QuotaExposition::new(quota)?.register(&registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dovecot_exporter_common::MailboxIdentity;
    use prometheus::{Encoder, TextEncoder};

    fn encode(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn has_sample(text: &str, name: &str, email: &str, domain: &str, value: &str) -> bool {
        text.lines().any(|line| {
            line.starts_with(&format!("{}{{", name))
                && line.contains(&format!("email=\"{}\"", email))
                && line.contains(&format!("domain=\"{}\"", domain))
                && line.ends_with(&format!(" {}", value))
        })
    }

    #[test]
    fn test_describes_both_series() {
        let exposition = QuotaExposition::new(Arc::new(QuotaRegistry::new())).unwrap();
        let names: Vec<_> = exposition.desc().iter().map(|d| d.fq_name.clone()).collect();
        assert_eq!(names, vec!["dovecot_mbox_storage", "dovecot_mbox_messages"]);
    }

    #[test]
    fn test_collect_reflects_registry() {
        let quota = Arc::new(QuotaRegistry::new());
        let registry = metrics_registry(quota.clone()).unwrap();

        // No samples yet, nothing to expose
        assert!(!encode(&registry).contains("dovecot_mbox"));

        quota.set(MetricKind::Storage, MailboxIdentity::parse("a@x.com").unwrap(), 100.0);
        quota.set(MetricKind::Messages, MailboxIdentity::parse("b@y.com").unwrap(), 42.0);

        let text = encode(&registry);
        assert!(text.contains("# HELP dovecot_mbox_storage Mailbox storage usage"));
        assert!(text.contains("# TYPE dovecot_mbox_messages gauge"));
        assert!(has_sample(&text, "dovecot_mbox_storage", "a@x.com", "x.com", "100"));
        assert!(has_sample(&text, "dovecot_mbox_messages", "b@y.com", "y.com", "42"));
    }

    #[test]
    fn test_scrape_sees_later_writes() {
        let quota = Arc::new(QuotaRegistry::new());
        let exposition = QuotaExposition::new(quota.clone()).unwrap();
        let id = MailboxIdentity::parse("a@x.com").unwrap();

        quota.set(MetricKind::Storage, id.clone(), 1.0);
        let first = exposition.collect();
        quota.set(MetricKind::Storage, id, 2.0);
        let second = exposition.collect();

        let value = |families: &[MetricFamily]| families[0].get_metric()[0].get_gauge().get_value();
        assert_eq!(value(&first), 1.0);
        assert_eq!(value(&second), 2.0);
    }
}
