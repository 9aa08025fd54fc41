//! Backing store access
//!
//! The poller only needs two store operations: cursor-paged key listing
//! (`SCAN cursor MATCH pattern COUNT n`) and single-key reads (`GET`).
//! A [`QuotaStore`] hands out one [`StoreConnection`] per poll cycle; the
//! connection is dropped when the cycle ends.
//!
//! - [`RedisStore`]: the production backend
//! - [`MemoryStore`]: in-process backend with Redis glob semantics

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use dovecot_exporter_common::Result;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// One page of a cursor scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next page; `0` once the iteration is complete
    pub cursor: u64,
    /// Keys returned by this page, as raw bytes
    ///
    /// Redis keys are binary safe; UTF-8 is checked by the scanner, one key
    /// at a time.
    pub keys: Vec<Vec<u8>>,
}

/// Source of per-cycle store connections
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Open a connection for one poll cycle
    ///
    /// Fails with `ExporterError::Connection` when the store is unreachable.
    async fn connect(&self) -> Result<Box<dyn StoreConnection>>;

    /// Human readable location of the store, for logs
    fn describe(&self) -> String;
}

/// A live connection to the store
#[async_trait]
pub trait StoreConnection: Send {
    /// Fetch one page of keys matching `pattern`, starting at `cursor`
    async fn scan_page(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage>;

    /// Read the raw value of `key`; `None` if the key no longer exists
    async fn get(&mut self, key: &str) -> Result<Option<String>>;
}
