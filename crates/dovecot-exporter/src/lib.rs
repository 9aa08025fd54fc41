//! # Dovecot Exporter
//!
//! Polls the Redis quota dictionary written by Dovecot and publishes
//! per-mailbox usage as Prometheus gauges.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   scan/get   ┌─────────────┐  apply   ┌───────────────┐
//! │  QuotaStore  │◀─────────────│ QuotaPoller │─────────▶│ QuotaRegistry │
//! │ (Redis/mem)  │  KeyScanner  │ (timer loop)│          └───────┬───────┘
//! └──────────────┘              └─────────────┘                  │ snapshot
//!                                                        ┌───────┴────────┐
//!                                      GET /metrics ────▶│QuotaExposition │
//!                                                        └────────────────┘
//! ```

pub mod config;
pub mod exposition;
pub mod http;
pub mod poller;
pub mod registry;
pub mod scanner;
pub mod store;

pub use config::ExporterConfig;
pub use exposition::{metrics_registry, QuotaExposition};
pub use poller::{CycleReport, PollerConfig, PollerHandle, PollerState, QuotaPoller};
pub use registry::QuotaRegistry;
pub use scanner::{KeyScanner, ScanEntry};
pub use store::{MemoryStore, QuotaStore, RedisStore, ScanPage, StoreConnection};
