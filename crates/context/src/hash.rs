//! Content fingerprints.

use crate::token::estimate_tokens;
use ripplecache_core::ActiveItem;
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Short SHA-256 fingerprint of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}

/// Build the per-turn record for a piece of content.
pub fn observe(content: &str) -> ActiveItem {
    ActiveItem::new(content_hash(content), estimate_tokens(content))
}
