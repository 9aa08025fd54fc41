//! Exporter configuration

use std::time::Duration;

use dovecot_exporter_common::{
    ExporterError, Result, DEFAULT_POLL_INTERVAL_SECS, QUOTA_KEY_PATTERN,
};
use serde::Serialize;

use crate::http::HEALTH_PATH;
use crate::poller::PollerConfig;

/// Prefix of every environment variable read by [`ExporterConfig::load`]
pub const ENV_PREFIX: &str = "DOVECOT_EXPORTER_";

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExporterConfig {
    /// Metrics listen address
    pub listen_addr: String,
    /// Path of the scrape endpoint
    pub metrics_path: String,
    /// Redis address (`host:port`)
    pub redis_addr: String,
    /// Redis database index
    pub redis_db: i64,
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Glob pattern of quota keys
    pub scan_pattern: String,
    /// `SCAN COUNT` hint
    pub scan_count: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9901".to_string(),
            metrics_path: "/metrics".to_string(),
            redis_addr: "127.0.0.1:6379".to_string(),
            redis_db: 0,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            scan_pattern: QUOTA_KEY_PATTERN.to_string(),
            scan_count: 100,
        }
    }
}

impl ExporterConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Unset variables keep their defaults; unparsable numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut cfg = Self::default();

        if let Some(val) = var("LISTEN") {
            cfg.listen_addr = val;
        }
        if let Some(val) = var("METRICS_PATH") {
            cfg.metrics_path = val;
        }
        if let Some(val) = var("REDIS") {
            cfg.redis_addr = val;
        }
        if let Some(val) = var("DB") {
            cfg.redis_db = parse_number("DB", &val)?;
        }
        if let Some(val) = var("INTERVAL") {
            cfg.poll_interval_secs = parse_number("INTERVAL", &val)?;
        }
        if let Some(val) = var("SCAN_PATTERN") {
            cfg.scan_pattern = val;
        }
        if let Some(val) = var("SCAN_COUNT") {
            cfg.scan_count = parse_number("SCAN_COUNT", &val)?;
        }

        Ok(cfg)
    }

    /// Reject settings the exporter cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.metrics_path.starts_with('/') || self.metrics_path == "/" {
            return Err(ExporterError::Config(format!(
                "metrics path must be an absolute path other than /: {:?}",
                self.metrics_path
            )));
        }
        if self.metrics_path == HEALTH_PATH {
            return Err(ExporterError::Config(format!(
                "metrics path {} is reserved for the health endpoint",
                HEALTH_PATH
            )));
        }
        // ':' and '*' start route captures
        if self.metrics_path.contains([':', '*']) {
            return Err(ExporterError::Config(format!(
                "metrics path must not contain ':' or '*': {:?}",
                self.metrics_path
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ExporterError::Config("poll interval must be positive".into()));
        }
        if self.scan_count == 0 {
            return Err(ExporterError::Config("scan count must be positive".into()));
        }
        if self.redis_db < 0 {
            return Err(ExporterError::Config(format!(
                "Redis database index must not be negative: {}",
                self.redis_db
            )));
        }
        Ok(())
    }

    /// Poller settings derived from this configuration
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            pattern: self.scan_pattern.clone(),
            scan_count: self.scan_count,
        }
    }
}

fn parse_number<T>(name: &str, val: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e| {
        ExporterError::Config(format!("invalid {}{}={:?}: {}", ENV_PREFIX, name, val, e))
    })
}
