//! Cryptographic hashing utilities for the indexer
//!
//! SHA-256 based hashing for transaction and block hashes, content
//! identifiers, and HASH160 for public-key derived codec keys and
//! base58check addresses.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
/// Used for transaction and block hashes in Bitcoin
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes RIPEMD160(SHA256(data)), Bitcoin's HASH160
pub fn hash160(data: &[u8]) -> Vec<u8> {
    let sha256_hash = sha256(data);
    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha256_hash);
    ripemd.finalize().to_vec()
}

/// Encode a 20-byte hash as a base58check address with the given version byte
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut address_bytes = vec![version];
    address_bytes.extend_from_slice(payload);

    // Checksum is the first 4 bytes of double SHA256
    let checksum = double_sha256(&address_bytes);
    address_bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(address_bytes).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256() {
        let data = b"hello world";
        let hash = double_sha256(data);
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_hash160_length() {
        assert_eq!(hash160(b"pubkey bytes").len(), 20);
    }

    #[test]
    fn test_base58check_zero_hash() {
        // All-zero hash160 with version 0x00 is the well-known burn address
        let address = base58check(0x00, &[0u8; 20]);
        assert_eq!(address, "1111111111111111111114oLvT2");
    }
}
