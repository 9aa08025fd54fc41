//! Redis quota store
//!
//! Reads the quota dictionary Dovecot keeps in Redis. A fresh multiplexed
//! connection is opened for every poll cycle, so an idle exporter holds no
//! connection between polls.

use async_trait::async_trait;
use dovecot_exporter_common::{ExporterError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Value};
use tracing::{debug, instrument};

use super::{QuotaStore, ScanPage, StoreConnection};

/// Redis-backed quota store
pub struct RedisStore {
    /// Redis client (no connection is held by the client itself)
    client: Client,
    /// `host:port` of the server
    address: String,
    /// Logical database index
    db: i64,
}

impl RedisStore {
    /// Create a store for `address` (`host:port`) and database index `db`
    pub fn new(address: &str, db: i64) -> Result<Self> {
        if address.is_empty() {
            return Err(ExporterError::Config("Redis address is empty".into()));
        }

        let url = format!("redis://{}/{}", address, db);
        let client = Client::open(url)
            .map_err(|e| ExporterError::Config(format!("Failed to create Redis client: {}", e)))?;

        Ok(Self {
            client,
            address: address.to_string(),
            db,
        })
    }

    /// Server address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Database index
    pub fn db(&self) -> i64 {
        self.db
    }
}

#[async_trait]
impl QuotaStore for RedisStore {
    #[instrument(skip(self), fields(address = %self.address, db = self.db))]
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ExporterError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        debug!("Connected to Redis");
        Ok(Box::new(RedisConnection { conn }))
    }

    fn describe(&self) -> String {
        format!("redis://{}/{}", self.address, self.db)
    }
}

/// Per-cycle Redis connection
struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn scan_page(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let reply: Value = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| ExporterError::Connection(format!("Redis SCAN failed: {}", e)))?;

        decode_scan_reply(reply)
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn
            .get(key)
            .await
            .map_err(|e| ExporterError::ValueParse {
                key: key.to_string(),
                reason: format!("Redis GET failed: {}", e),
            })?;

        Ok(value)
    }
}

/// Decode a `SCAN` reply (`[cursor, [key, ...]]`) without assuming UTF-8 keys
fn decode_scan_reply(reply: Value) -> Result<ScanPage> {
    let (cursor, keys): (u64, Vec<Vec<u8>>) = redis::from_redis_value(&reply)
        .map_err(|e| ExporterError::Connection(format!("Unexpected SCAN reply: {}", e)))?;

    Ok(ScanPage { cursor, keys })
}
