//! Quota key scanner
//!
//! Walks every key matching the quota pattern and fetches its numeric value.
//! Iteration is lazy: one `SCAN` page is buffered at a time and each value
//! is read just before it is yielded. Nothing is atomic across the scan; a
//! key may change or vanish between the listing and the read.

use std::collections::VecDeque;

use dovecot_exporter_common::{ExporterError, KeyError, Result};
use futures::Stream;
use tracing::{debug, instrument};

use crate::store::{QuotaStore, StoreConnection};

/// One key with its parsed value
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub key: String,
    pub value: f64,
}

/// Lazy cursor over the quota keys of one poll cycle
///
/// Owns the cycle's store connection; dropping the scanner releases it.
pub struct KeyScanner {
    conn: Box<dyn StoreConnection>,
    pattern: String,
    count: usize,
    cursor: u64,
    pending: VecDeque<Vec<u8>>,
    exhausted: bool,
}

impl KeyScanner {
    /// Connect and fetch the first page
    ///
    /// Any failure here means the scan could not start and is reported as
    /// `ExporterError::Connection`.
    #[instrument(skip(store), fields(backend = %store.describe()))]
    pub async fn start(store: &dyn QuotaStore, pattern: &str, count: usize) -> Result<Self> {
        let mut conn = store.connect().await.map_err(into_connection)?;
        let page = conn
            .scan_page(0, pattern, count)
            .await
            .map_err(into_connection)?;

        debug!(keys = page.keys.len(), cursor = page.cursor, "First scan page");

        Ok(Self {
            conn,
            pattern: pattern.to_string(),
            count,
            cursor: page.cursor,
            pending: page.keys.into(),
            exhausted: page.cursor == 0,
        })
    }

    /// Next key, or `None` once the cursor is exhausted
    ///
    /// Per-key failures come back as `ExporterError::Key` (key is not UTF-8)
    /// or `ExporterError::ValueParse` and the scan carries on. A failed page fetch yields one
    /// `ExporterError::Connection` and ends the scan.
    pub async fn next(&mut self) -> Option<Result<ScanEntry>> {
        loop {
            if let Some(raw) = self.pending.pop_front() {
                return Some(match String::from_utf8(raw) {
                    Ok(key) => self.fetch(key).await,
                    Err(e) => Err(KeyError::MalformedKey(
                        String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    )
                    .into()),
                });
            }
            if self.exhausted {
                return None;
            }

            match self.conn.scan_page(self.cursor, &self.pattern, self.count).await {
                Ok(page) => {
                    debug!(keys = page.keys.len(), cursor = page.cursor, "Scan page");
                    self.cursor = page.cursor;
                    self.exhausted = page.cursor == 0;
                    self.pending.extend(page.keys);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(into_connection(e)));
                }
            }
        }
    }

    /// Consume the scanner as a stream of entries
    pub fn into_stream(self) -> impl Stream<Item = Result<ScanEntry>> + Send {
        futures::stream::unfold(self, |mut scanner| async move {
            scanner.next().await.map(|item| (item, scanner))
        })
    }

    async fn fetch(&mut self, key: String) -> Result<ScanEntry> {
        let raw = match self.conn.get(&key).await? {
            Some(raw) => raw,
            None => {
                return Err(ExporterError::ValueParse {
                    key,
                    reason: "key removed during scan".into(),
                })
            }
        };

        match raw.parse::<f64>() {
            Ok(value) => Ok(ScanEntry { key, value }),
            Err(e) => Err(ExporterError::ValueParse {
                key,
                reason: format!("{:?} is not a number: {}", raw, e),
            }),
        }
    }
}

fn into_connection(err: ExporterError) -> ExporterError {
    match err {
        ExporterError::Connection(msg) => ExporterError::Connection(msg),
        other => ExporterError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use dovecot_exporter_common::QUOTA_KEY_PATTERN;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scan_yields_values() {
        let store = MemoryStore::with_entries([
            ("a@x.com/quota/storage", "100"),
            ("b@y.com/quota/messages", "42"),
            ("session:abc", "7"),
        ]);

        let mut scanner = KeyScanner::start(&store, QUOTA_KEY_PATTERN, 100).await.unwrap();
        let mut entries = Vec::new();
        while let Some(entry) = scanner.next().await {
            entries.push(entry.unwrap());
        }

        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&ScanEntry {
            key: "a@x.com/quota/storage".into(),
            value: 100.0
        }));
    }

    #[tokio::test]
    async fn test_non_numeric_value_does_not_stop_scan() {
        let store = MemoryStore::with_entries([
            ("a@x.com/quota/storage", "lots"),
            ("b@y.com/quota/storage", "5"),
        ]);

        let scanner = KeyScanner::start(&store, QUOTA_KEY_PATTERN, 1).await.unwrap();
        let results: Vec<_> = scanner.into_stream().collect().await;

        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[0],
            Err(ExporterError::ValueParse { key, .. }) if key == "a@x.com/quota/storage"
        ));
        assert_eq!(results[1].as_ref().unwrap().value, 5.0);
    }

    #[tokio::test]
    async fn test_non_utf8_key_does_not_stop_scan() {
        let store = MemoryStore::with_entries([
            ("a@x.com/quota/storage", "100"),
            ("b@y.com/quota/storage", "5"),
        ]);
        store.set_raw(b"\xff/quota/storage".to_vec(), "7");

        let scanner = KeyScanner::start(&store, QUOTA_KEY_PATTERN, 1).await.unwrap();
        let results: Vec<_> = scanner.into_stream().collect().await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().value, 100.0);
        assert_eq!(results[1].as_ref().unwrap().value, 5.0);
        let err = results[2].as_ref().unwrap_err();
        assert!(err.is_per_key());
        assert!(matches!(
            err,
            ExporterError::Key(KeyError::MalformedKey(key)) if key == "\u{fffd}/quota/storage"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_at_start() {
        let store = MemoryStore::new();
        store.set_unreachable(true);

        let err = KeyScanner::start(&store, QUOTA_KEY_PATTERN, 100).await.err().unwrap();
        assert!(matches!(err, ExporterError::Connection(_)));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::new();
        let mut scanner = KeyScanner::start(&store, QUOTA_KEY_PATTERN, 100).await.unwrap();
        assert!(scanner.next().await.is_none());
        assert!(scanner.next().await.is_none());
    }
}
