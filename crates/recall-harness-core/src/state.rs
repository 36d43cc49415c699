//! Incremental index state.
//!
//! [`IndexState`] maps each indexed file (by absolute path) to the
//! fingerprint of the bytes it was last chunked from, plus the time of the
//! last completed full pass. It is an explicit value: callers load it
//! through a [`StateStore`](crate::store::StateStore), mutate it during an
//! indexing pass, and save it at the checkpoints [`index`](crate::index)
//! defines.
//!
//! # Persisted format
//!
//! ```json
//! {
//!   "files": {
//!     "/home/me/notes/MEMORY.md": { "fingerprint": "9f86d0…" }
//!   },
//!   "lastFullIndexTimestamp": "2026-10-14T09:30:00Z"
//! }
//! ```

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecallError;

/// Last-indexed fingerprint of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndexRecord {
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    #[serde(default)]
    pub files: BTreeMap<String, FileIndexRecord>,
    #[serde(default)]
    pub last_full_index_timestamp: Option<DateTime<Utc>>,
}

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `file` was last indexed from content with this fingerprint.
    pub fn is_current(&self, file: &str, fingerprint: &str) -> bool {
        self.files
            .get(file)
            .is_some_and(|r| r.fingerprint == fingerprint)
    }

    pub fn record(&mut self, file: &str, fingerprint: &str) {
        self.files.insert(
            file.to_string(),
            FileIndexRecord {
                fingerprint: fingerprint.to_string(),
            },
        );
    }

    /// Drop the record for `file`, returning it if present.
    pub fn forget(&mut self, file: &str) -> Option<FileIndexRecord> {
        self.files.remove(file)
    }

    pub fn mark_full_index(&mut self, at: DateTime<Utc>) {
        self.last_full_index_timestamp = Some(at);
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RecallError::State(format!("serialize: {}", e)).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RecallError::State(format!("parse: {}", e)).into())
    }
}
