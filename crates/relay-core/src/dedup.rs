//! Minute-bucketed dedup keys for inbound messages.
//!
//! Two sends of the same trimmed text inside the same wall-clock minute hash
//! to the same key, which the session layer uses to collapse client retries
//! and double-submits into one logical message. The bucket is the formatted
//! minute (`YYYYMMDDHHMM`), so an identical message sent just after a minute
//! boundary is treated as new — a known limitation of the bucket scheme.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Opaque equality token for "same message in the same minute".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// Compute the key for a message at a given instant.
    ///
    /// The content is trimmed before hashing so padding differences do not
    /// defeat deduplication.
    #[must_use]
    pub fn compute(content: &str, at: DateTime<Utc>) -> Self {
        let bucket = at.format("%Y%m%d%H%M");
        let mut hasher = Sha256::new();
        hasher.update(content.trim().as_bytes());
        hasher.update(b"_");
        hasher.update(bucket.to_string().as_bytes());
        Self(hex_encode(&hasher.finalize()))
    }

    /// Compute the key for a message at the current instant.
    #[must_use]
    pub fn now(content: &str) -> Self {
        Self::compute(content, Utc::now())
    }

    /// The hex digest, as returned to clients in `message_hash`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
