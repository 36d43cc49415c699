//! Content fingerprints for change detection and result deduplication.
//!
//! Fingerprints are lowercase hex SHA-256 digests. They are not used for
//! anything security sensitive; SHA-256 is simply the digest the rest of
//! the stack already depends on.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of the first `prefix_chars` characters of `text`.
///
/// Counts `char`s rather than bytes so multi-byte text is never split
/// mid-codepoint.
pub fn prefix_fingerprint(text: &str, prefix_chars: usize) -> String {
    let end = text
        .char_indices()
        .nth(prefix_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    fingerprint(text[..end].as_bytes())
}
