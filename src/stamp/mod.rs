//! Artifact classification and assembly

pub mod classify;

pub use classify::{classify, normalize_suffix, sniff_suffix, Classification, Ident};

use serde::{Deserialize, Serialize};

use crate::crypto::sha256_hex;
use crate::decode::EncodingScheme;

/// One fully classified stamp row, as persisted by the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Deterministic identifier: SHA-256 over block index and tx hash
    pub stamp_hash: String,
    /// Sequence number; valid stamps count up from 0, cursed stamps count
    /// down from -1
    pub stamp_number: i64,
    pub tx_hash: String,
    pub block_index: u64,
    pub tx_index: u32,
    pub block_time: u64,
    pub ident: Ident,
    pub scheme: EncodingScheme,
    pub keyburn: bool,
    pub creator: Option<String>,
    pub destination: Option<String>,
    pub destination_value: u64,
    /// Decoded content bytes
    pub content: Vec<u8>,
    /// SHA-256 of the content, the identity used by the curse check
    pub content_hash: String,
    pub mimetype: Option<String>,
    pub file_suffix: Option<String>,
    /// Whether the payload parsed as JSON or decoded as base64
    pub is_valid_payload: bool,
    pub is_cursed: bool,
}

/// Derive the deterministic stamp identifier for a transaction position
pub fn stamp_hash(block_index: u64, tx_hash: &str) -> String {
    sha256_hex(format!("{}:{}", block_index, tx_hash).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_hash_deterministic() {
        let a = stamp_hash(800_000, "abcd");
        let b = stamp_hash(800_000, "abcd");
        assert_eq!(a, b);
        assert_ne!(a, stamp_hash(800_001, "abcd"));
        assert_eq!(a.len(), 64);
    }
}
