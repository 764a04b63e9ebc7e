//! Cache key derivation
//!
//! An upload is identified by its file name, byte size and modification
//! time. Two different files sharing all three are treated as the same
//! upload.

use sha2::{Digest, Sha256};

/// Derive the cache key for an upload.
///
/// Each field is length-prefixed before hashing so that, for example,
/// `("a1", 23)` and `("a", 123)` never collide.
pub fn derive_cache_key(name: &str, byte_size: u64, last_modified_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update((name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(byte_size.to_le_bytes());
    hasher.update(last_modified_ms.to_le_bytes());
    format!("{:x}", hasher.finalize())
}
