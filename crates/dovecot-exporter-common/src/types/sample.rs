//! Quota key decoding
//!
//! A quota key has the form `<local-part>@<domain>/quota/<kind>`:
//! - `jedrzej@example.org/quota/storage` - storage usage
//! - `jedrzej@example.org/quota/messages` - message count
//!
//! Anything else that happens to match the scan pattern is rejected here
//! with a [`KeyError`], one key at a time.

use std::str::FromStr;

use super::identity::MailboxIdentity;
use crate::error::KeyError;

/// Separator between the identity, namespace and kind segments
pub const KEY_SEPARATOR: char = '/';

/// Which quota series a key feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Mailbox storage usage
    Storage,
    /// Mailbox message count
    Messages,
}

impl MetricKind {
    /// All kinds, in exposition order
    pub const ALL: [MetricKind; 2] = [MetricKind::Storage, MetricKind::Messages];

    /// Key segment naming this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Storage => "storage",
            MetricKind::Messages => "messages",
        }
    }

    /// Name of the gauge series fed by this kind
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricKind::Storage => "dovecot_mbox_storage",
            MetricKind::Messages => "dovecot_mbox_messages",
        }
    }

    /// Help text of the gauge series
    pub fn help(&self) -> &'static str {
        match self {
            MetricKind::Storage => "Mailbox storage usage",
            MetricKind::Messages => "Mailbox messages count",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storage" => Ok(MetricKind::Storage),
            "messages" => Ok(MetricKind::Messages),
            other => Err(KeyError::UnknownKind(other.to_string())),
        }
    }
}

/// A decoded quota key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub identity: MailboxIdentity,
    pub kind: MetricKind,
}

impl QuotaKey {
    /// Decode a raw store key
    ///
    /// Checks run in order: segment count, identity, kind. The middle
    /// segment is not inspected.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let parts: Vec<&str> = key.splitn(3, KEY_SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(KeyError::MalformedKey(key.to_string()));
        }

        let identity = MailboxIdentity::parse(parts[0])?;
        let kind = parts[2]
            .parse::<MetricKind>()
            .map_err(|_| KeyError::UnknownKind(key.to_string()))?;

        Ok(Self { identity, kind })
    }
}

/// One parsed key-value pair, ready to be written to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub identity: MailboxIdentity,
    pub value: f64,
}

impl MetricSample {
    /// Build a sample from a scanned key and its numeric value
    pub fn from_scan(key: &str, value: f64) -> Result<Self, KeyError> {
        let QuotaKey { identity, kind } = QuotaKey::parse(key)?;
        Ok(Self {
            kind,
            identity,
            value,
        })
    }
}
