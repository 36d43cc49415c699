//! # Recall Harness Core
//!
//! Shared, I/O-free logic for Recall Harness: data models, the
//! header-aware markdown chunker, content fingerprints, the incremental
//! index state, backend port traits, and the multi-source recall
//! pipeline.
//!
//! This crate contains no tokio, sqlx, filesystem, or network
//! dependencies. Concrete backends and persistence live in the
//! `recall-harness` app crate; in-memory ports live in [`store::memory`].
//!
//! ```text
//!   markdown ──▶ chunk ──▶ index ──▶ VectorStore
//!                                        │
//!   query ──▶ recall ──┬─ VectorStore ───┤
//!                      ├─ FactMemory     │  normalize ─▶ merge ─▶ dedup ─▶ top K
//!                      └─ ArchivalMemory ┘
//! ```

pub mod chunk;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod models;
pub mod recall;
pub mod state;
pub mod store;
