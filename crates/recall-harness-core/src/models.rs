//! Core data models used throughout Recall Harness.
//!
//! These types represent the chunks written during indexing, the raw hits
//! each backend returns, and the normalized records the recall pipeline
//! merges and ranks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used when a header stack is rendered as a single label.
pub const HEADER_SEPARATOR: &str = " > ";

/// One retrievable slice of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Markdown headers (outermost first) in scope at the chunk's start.
    pub header_path: Vec<String>,
    /// Sum of line byte lengths, newlines excluded.
    pub approximate_size: usize,
}

impl Chunk {
    /// The header path joined with [`HEADER_SEPARATOR`], e.g. `"Guide > Setup"`.
    pub fn header_label(&self) -> String {
        self.header_path.join(HEADER_SEPARATOR)
    }
}

/// A chunk tagged with its source file, ready for [`VectorStore::upsert`](crate::store::VectorStore::upsert).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedChunk {
    pub id: String,
    pub source_file: String,
    pub chunk_index: i64,
    pub header_path: String,
    pub text: String,
    pub indexed_at: DateTime<Utc>,
}

/// A vector-store hit. `distance` is non-negative, `0.0` = most similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub text: String,
    pub source_file: String,
    pub header_path: String,
    pub distance: f64,
}

/// A fact-memory search hit. Not every fact backend reports a confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactHit {
    pub text: String,
    pub confidence: Option<f64>,
}

/// A stored fact as returned by [`FactMemory::get_all`](crate::store::FactMemory::get_all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub text: String,
}

/// A single conversation turn handed to the fact memory for extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Input accepted by [`FactMemory::add`](crate::store::FactMemory::add).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactInput {
    Text(String),
    Conversation(Vec<Message>),
}

impl FactInput {
    /// Conversation form of the input; plain text becomes one user turn.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            FactInput::Text(text) => vec![Message {
                role: "user".to_string(),
                content: text,
            }],
            FactInput::Conversation(messages) => messages,
        }
    }
}

/// Backend acknowledgement for an added fact.
#[derive(Debug, Clone, Serialize)]
pub struct FactAck {
    pub backend: String,
    pub detail: serde_json::Value,
}

/// A passage returned by the archival memory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivalPassage {
    pub text: String,
}

/// The unified record every backend hit is projected into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub text: String,
    /// `"vector:<file name>"`, `"facts"`, or `"archival"`.
    pub source: String,
    /// Higher is better, always within `[0.0, 1.0]`.
    pub score: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub auxiliary: BTreeMap<String, String>,
}

/// A merged, deduplicated result with the fingerprint it was deduplicated on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub result: NormalizedResult,
    pub fingerprint: String,
}
