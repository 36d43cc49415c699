//! # Recall Harness
//!
//! **One recall query over several memory backends.**
//!
//! Recall Harness indexes a markdown corpus into a searchable chunk store
//! and answers queries by fanning out to three memory roles at once: the
//! chunk (vector) store, an auto-extraction fact memory, and an optional
//! archival memory. Hits are normalized to a common `[0, 1]` score,
//! deduplicated on their text prefix, and returned as one ranked list.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   corpus    │──▶│   Indexer   │──▶│ VectorStore  │
//! │ MEMORY.md + │   │ chunk+state │   │ SQLite FTS5  │
//! │  memory/*   │   └─────────────┘   └──────┬───────┘
//! └─────────────┘                            │
//!                      ┌─────────────────────┤
//!                      │  FactMemory ────────┤  SQLite / Mem0
//!                      │  ArchivalMemory ────┤  Letta (optional)
//!                      ▼                     ▼
//!                 ┌──────────┐        ┌──────────────┐
//!                 │   CLI    │◀───────│ RecallEngine │
//!                 │ (recall) │        └──────────────┘
//!                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall index                         # chunk and store changed files
//! recall query "greenhouse tomatoes"   # ranked results from every backend
//! recall add "Jack prefers green tea"  # store a fact
//! recall stats --json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Corpus discovery (root file + globbed directory) and file reading |
//! | [`harness`] | The [`Harness`] facade: recall, raw recall, index, add fact, stats |
//! | [`sqlite_store`] | SQLite FTS5 vector store and fact memory |
//! | [`mem0`] | Hosted Mem0 fact memory |
//! | [`letta`] | Letta archival memory |
//! | [`state_file`] | Atomic JSON persistence of the index state |
//! | [`http`] | Shared HTTP client, retry, and response-shape helpers |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Idempotent schema setup |
//!
//! Pure logic (chunking, fingerprints, index state, ranking) lives in
//! [`recall_harness_core`].

pub mod config;
pub mod corpus;
pub mod db;
pub mod harness;
pub mod http;
pub mod letta;
pub mod mem0;
pub mod migrate;
pub mod sqlite_store;
pub mod state_file;

pub use harness::{Harness, Stats};
pub use recall_harness_core::{recall, store};
