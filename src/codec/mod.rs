//! Obfuscation codec for embedded payloads
//!
//! Multisig-embedded stamp data is obfuscated with the ARC4 stream cipher,
//! keyed per transaction so the same plaintext never produces the same
//! ciphertext twice. The transform is self-inverse: applying it again with
//! the same key recovers the original bytes.
//!
//! Key derivation:
//! - multisig scheme: the spending transaction's first input prevout hash,
//!   byte order reversed
//! - single-key scheme: HASH160 of the embedding public key

use thiserror::Error;

use crate::crypto::hash160;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("obfuscation key must not be empty")]
    EmptyKey,
    #[error("obfuscation key too long: {0} bytes (max 32)")]
    KeyTooLong(usize),
}

/// ARC4 keystream state
///
/// Initialized once per decode attempt; `apply` consumes keystream bytes,
/// so decode the whole payload with a single instance.
#[derive(Debug)]
pub struct Arc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arc4 {
    /// Initialize the cipher with a 1–32 byte key
    pub fn new(key: &[u8]) -> Result<Self, CodecError> {
        if key.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        if key.len() > 32 {
            return Err(CodecError::KeyTooLong(key.len()));
        }

        let mut state = [0u8; 256];
        for (idx, byte) in state.iter_mut().enumerate() {
            *byte = idx as u8;
        }

        let mut j: u8 = 0;
        for idx in 0..256 {
            j = j
                .wrapping_add(state[idx])
                .wrapping_add(key[idx % key.len()]);
            state.swap(idx, j as usize);
        }

        Ok(Self { state, i: 0, j: 0 })
    }

    /// Key with a transaction hash in reversed byte order (multisig scheme)
    pub fn with_tx_hash(tx_hash: &[u8]) -> Result<Self, CodecError> {
        let reversed: Vec<u8> = tx_hash.iter().rev().copied().collect();
        Self::new(&reversed)
    }

    /// Key derived from a public key (single-key scheme)
    pub fn with_pubkey(pubkey: &[u8]) -> Result<Self, CodecError> {
        Self::new(&hash160(pubkey))
    }

    /// Apply the keystream to `data`, returning a same-length buffer
    pub fn apply(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for &byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let k = self.state
                [self.state[self.i as usize].wrapping_add(self.state[self.j as usize]) as usize];
            out.push(byte ^ k);
        }
        out
    }
}

/// One-shot transform: initialize with `key` and apply to `data`
pub fn obfuscate(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(Arc4::new(key)?.apply(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6229 test vector, 40-bit key
    #[test]
    fn test_rfc6229_keystream() {
        let mut cipher = Arc4::new(&[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
        let keystream = cipher.apply(&[0u8; 16]);
        assert_eq!(
            hex::encode(keystream),
            "b2396305f03dc027ccc3524a0a1118a8"
        );
    }

    #[test]
    fn test_self_inverse() {
        let key = b"0123456789abcdef";
        let plaintext = b"stamp:eyJwIjoic3JjLTIwIn0=";
        let ciphertext = obfuscate(key, plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);
        assert_eq!(obfuscate(key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_round_trip_all_key_lengths() {
        let payload: Vec<u8> = (0u8..=255).collect();
        for len in 1..=32 {
            let key: Vec<u8> = (0..len as u8).collect();
            let enc = obfuscate(&key, &payload).unwrap();
            assert_eq!(enc.len(), payload.len());
            assert_eq!(obfuscate(&key, &enc).unwrap(), payload);
        }
    }

    #[test]
    fn test_empty_key_rejected() {
        assert_eq!(Arc4::new(&[]).unwrap_err(), CodecError::EmptyKey);
    }

    #[test]
    fn test_oversized_key_rejected() {
        assert!(matches!(
            Arc4::new(&[0u8; 33]).unwrap_err(),
            CodecError::KeyTooLong(33)
        ));
    }

    #[test]
    fn test_tx_hash_key_is_reversed() {
        let tx_hash = [0xABu8; 31]
            .iter()
            .chain(&[0xCD])
            .copied()
            .collect::<Vec<u8>>();
        let mut forward = Arc4::with_tx_hash(&tx_hash).unwrap();
        let mut reversed_key: Vec<u8> = tx_hash.iter().rev().copied().collect();
        let mut manual = Arc4::new(&reversed_key).unwrap();
        reversed_key.clear();
        assert_eq!(forward.apply(b"data"), manual.apply(b"data"));
    }

    #[test]
    fn test_pubkey_key_round_trip() {
        let pubkey = hex::decode(
            "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc",
        )
        .unwrap();
        let data = b"witness payload";
        let enc = Arc4::with_pubkey(&pubkey).unwrap().apply(data);
        assert_eq!(Arc4::with_pubkey(&pubkey).unwrap().apply(&enc), data);
    }
}
