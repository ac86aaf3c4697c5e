//! # Content Hashing
//!
//! Deterministic digests of desired-state subtrees for change detection.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of the JSON encoding of `value`
///
/// Struct fields serialize in declaration order and maps are `BTreeMap`s,
/// so equal values always produce equal digests.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
