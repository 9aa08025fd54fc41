//! # Dovecot Exporter Common
//!
//! Shared types and errors for the Dovecot quota exporter.
//!
//! ## Core Types
//!
//! - [`QuotaKey`]: decoded `<identity>/quota/<kind>` store key
//! - [`MailboxIdentity`]: `(email, domain)` label pair
//! - [`MetricKind`]: storage usage or message count
//! - [`MetricSample`]: one parsed key-value pair
//! - [`ExporterError`]/[`KeyError`]: unified error and per-key rejections

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ExporterError, KeyError, Result};
pub use types::{
    identity::MailboxIdentity,
    sample::{MetricKind, MetricSample, QuotaKey, KEY_SEPARATOR},
};

/// Exporter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Glob pattern matching every quota key in the store
pub const QUOTA_KEY_PATTERN: &str = "*/quota/*";

/// Default polling interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Label names of both quota series, in order
pub const QUOTA_LABELS: [&str; 2] = ["email", "domain"];
