use std::time::Duration;

use bincode::{Decode, Encode};
use chrono::{DateTime, Utc};

use super::MetaError;

/// Metadata entry for one stored path.
///
/// A committed record implies the corresponding file existed on disk
/// with matching content hash at the instant of commit. The expiry
/// timestamp is always strictly greater than the creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FileRecord {
    created_at_ms: i64,
    content_hash: [u8; 16],
    expires_at_ms: i64,
}

impl FileRecord {
    /// Creates a record timestamped now, expiring after `ttl`.
    ///
    /// Sub-millisecond ttls round up so expiry stays strictly after
    /// creation.
    pub fn new(content_hash: [u8; 16], ttl: Duration) -> Self {
        let now = Utc::now().timestamp_millis();
        let ttl_ms = ttl.as_millis().min(i64::MAX as u128) as i64;
        Self {
            created_at_ms: now,
            content_hash,
            expires_at_ms: now.saturating_add(ttl_ms.max(1)),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.created_at_ms).unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.expires_at_ms).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Eligible for reclamation once expiry is at or before `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }

    pub fn content_hash(&self) -> &[u8; 16] {
        &self.content_hash
    }

    /// Lowercase hex digest of the plaintext content.
    pub fn hash_hex(&self) -> String {
        faster_hex::hex_string(&self.content_hash)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, MetaError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| MetaError::Encoding(e.to_string()))
    }

    pub fn try_from_slice(raw: &[u8]) -> Result<Self, MetaError> {
        bincode::decode_from_slice(raw, bincode::config::standard())
            .map(|(record, _)| record)
            .map_err(|e| MetaError::Encoding(e.to_string()))
    }
}
