//! BLAKE3 fingerprints for template sources.
//!
//! Fingerprints give trace events and diagnostics a stable identity for a
//! template without storing its text.

/// Hash a template source. Returns `"blake3:{hex}"`.
pub fn hash_source(source: &str) -> String {
    format!("blake3:{}", blake3::hash(source.as_bytes()).to_hex())
}

/// Abbreviate a fingerprint for human-facing output.
pub fn short(fingerprint: &str) -> &str {
    let end = "blake3:".len() + 12;
    fingerprint.get(..end).unwrap_or(fingerprint)
}
