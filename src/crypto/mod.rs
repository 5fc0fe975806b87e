//! Cryptographic primitives used across decoding and classification

pub mod hash;

pub use hash::{base58check, double_sha256, hash160, sha256, sha256_hex};
