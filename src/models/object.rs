//! Represents an object (file) reported by a bucket listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry of a bucket listing.
///
/// Descriptors are produced by the listing client and never mutated; the
/// catalog builder only reads them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
        }
    }
}
