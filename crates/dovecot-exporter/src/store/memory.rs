//! In-memory quota store
//!
//! Holds string values under binary keys in a sorted map and pages through
//! them the way Redis `SCAN` does: opaque cursor, `0` when finished, byte-wise
//! glob filtering with `*` and `?`. Used by tests and local runs without a Redis server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dovecot_exporter_common::{ExporterError, Result};
use parking_lot::RwLock;

use super::{QuotaStore, ScanPage, StoreConnection};

/// In-memory key-value store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, String>>>,
    unreachable: Arc<AtomicBool>,
    connections: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(key, value)` pairs
    pub fn with_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::new();
        for (key, value) in entries {
            store.set(key, value);
        }
        store
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key: String = key.into();
        self.set_raw(key.into_bytes(), value);
    }

    /// Insert or overwrite a key that need not be valid UTF-8
    pub fn set_raw(&self, key: impl Into<Vec<u8>>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Remove a key, returning whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key.as_bytes()).is_some()
    }

    /// Make subsequent `connect` calls fail (or succeed again)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of successful `connect` calls so far
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ExporterError::Connection(
                "memory store marked unreachable".into(),
            ));
        }

        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            entries: self.entries.clone(),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryConnection {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, String>>>,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn scan_page(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let count = count.max(1);
        let entries = self.entries.read();

        // Cursor is an offset into the sorted key space
        let mut keys = entries.keys().skip(cursor as usize);
        let mut page = Vec::new();
        let mut consumed = 0u64;
        for key in keys.by_ref().take(count) {
            consumed += 1;
            if glob_match(pattern.as_bytes(), key) {
                page.push(key.clone());
            }
        }

        let next = if keys.next().is_some() {
            cursor + consumed
        } else {
            0
        };

        Ok(ScanPage {
            cursor: next,
            keys: page,
        })
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key.as_bytes()).cloned())
    }
}

/// Redis-style glob match supporting `*` and `?`, byte by byte
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_text = 0usize;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}
