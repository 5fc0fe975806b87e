//! Bitcoin backend interface
//!
//! The indexer is not a node: raw blocks and transactions come from an
//! external backend behind the [`BitcoinBackend`] trait. The in-memory
//! implementation backs the test suite and offline replays.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("RPC failure: {0}")]
    Rpc(String),
    #[error("block not found: {0}")]
    BlockNotFound(String),
    #[error("transaction not found: {0}")]
    TxNotFound(String),
    #[error("malformed transaction data: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Transient failures may be retried with backoff; malformed data is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Rpc(_))
    }
}

/// A transaction output: value in satoshis plus the raw locking script
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

/// A transaction input referencing the output it spends
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Spent transaction id, display (byte-reversed) hex
    pub prev_tx_hash: String,
    pub prev_vout: u32,
}

impl TxIn {
    /// Coinbase inputs spend the all-zero outpoint
    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_hash.chars().all(|c| c == '0')
    }
}

/// A deserialized transaction as consumed by the decoder
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id, display hex
    pub tx_hash: String,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }
}

/// A block with its ordered transaction list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub previous_hash: String,
    /// Unix timestamp of the block
    pub time: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            block_index: self.height,
            block_hash: self.hash.clone(),
            previous_block_hash: self.previous_hash.clone(),
            block_time: self.time,
        }
    }

    pub fn time_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.time as i64, 0).single().unwrap_or_default()
    }
}

/// Persisted header row; forms a singly-linked chain by previous hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub block_index: u64,
    pub block_hash: String,
    pub previous_block_hash: String,
    pub block_time: u64,
}

/// RPC-style view of the canonical chain
pub trait BitcoinBackend {
    fn get_block_count(&self) -> Result<u64, BackendError>;

    fn get_block_hash(&self, height: u64) -> Result<String, BackendError>;

    fn get_block(&self, hash: &str) -> Result<Block, BackendError>;

    fn get_raw_transaction(&self, tx_hash: &str) -> Result<Vec<u8>, BackendError>;

    fn deserialize(&self, raw: &[u8]) -> Result<Transaction, BackendError>;
}

/// In-memory backend over a prebuilt chain
///
/// Serves `get_raw_transaction` from a transaction index built on insert;
/// the "raw" wire form is the JSON encoding, reversed by `deserialize`.
#[derive(Default)]
pub struct MemoryBackend {
    blocks: Vec<Block>,
    tx_index: HashMap<String, Transaction>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block at the next height; also indexes its transactions
    pub fn push_block(&mut self, block: Block) {
        for tx in &block.transactions {
            self.tx_index.insert(tx.tx_hash.clone(), tx.clone());
        }
        self.blocks.push(block);
    }

    /// Register a transaction that is spendable but not in any served block
    /// (a funding transaction referenced by an input)
    pub fn insert_transaction(&mut self, tx: Transaction) {
        self.tx_index.insert(tx.tx_hash.clone(), tx);
    }

    /// Replace the chain from `height` upward, simulating a reorganization
    pub fn truncate_from(&mut self, height: u64) {
        self.blocks.retain(|b| b.height < height);
    }
}

impl BitcoinBackend for MemoryBackend {
    fn get_block_count(&self) -> Result<u64, BackendError> {
        self.blocks
            .last()
            .map(|b| b.height)
            .ok_or_else(|| BackendError::Rpc("empty chain".to_string()))
    }

    fn get_block_hash(&self, height: u64) -> Result<String, BackendError> {
        self.blocks
            .iter()
            .find(|b| b.height == height)
            .map(|b| b.hash.clone())
            .ok_or_else(|| BackendError::BlockNotFound(format!("height {}", height)))
    }

    fn get_block(&self, hash: &str) -> Result<Block, BackendError> {
        self.blocks
            .iter()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| BackendError::BlockNotFound(hash.to_string()))
    }

    fn get_raw_transaction(&self, tx_hash: &str) -> Result<Vec<u8>, BackendError> {
        let tx = self
            .tx_index
            .get(tx_hash)
            .ok_or_else(|| BackendError::TxNotFound(tx_hash.to_string()))?;
        serde_json::to_vec(tx).map_err(|e| BackendError::Malformed(e.to_string()))
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Transaction, BackendError> {
        serde_json::from_slice(raw).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_at(height: u64, hash: &str, prev: &str) -> Block {
        Block {
            height,
            hash: hash.to_string(),
            previous_hash: prev.to_string(),
            time: 1_700_000_000 + height,
            transactions: vec![],
        }
    }

    #[test]
    fn test_memory_backend_chain_queries() {
        let mut backend = MemoryBackend::new();
        backend.push_block(block_at(100, "aa", "99"));
        backend.push_block(block_at(101, "bb", "aa"));

        assert_eq!(backend.get_block_count().unwrap(), 101);
        assert_eq!(backend.get_block_hash(100).unwrap(), "aa");
        assert_eq!(backend.get_block("bb").unwrap().previous_hash, "aa");
        assert!(backend.get_block_hash(102).is_err());
    }

    #[test]
    fn test_raw_transaction_round_trip() {
        let mut backend = MemoryBackend::new();
        let tx = Transaction {
            tx_hash: "deadbeef".to_string(),
            inputs: vec![TxIn {
                prev_tx_hash: "00".repeat(32),
                prev_vout: 0,
            }],
            outputs: vec![TxOut {
                value: 546,
                script_pubkey: vec![0x6a],
            }],
        };
        backend.insert_transaction(tx.clone());

        let raw = backend.get_raw_transaction("deadbeef").unwrap();
        assert_eq!(backend.deserialize(&raw).unwrap(), tx);
    }

    #[test]
    fn test_coinbase_detection() {
        let tx = Transaction {
            tx_hash: "cb".to_string(),
            inputs: vec![TxIn {
                prev_tx_hash: "0".repeat(64),
                prev_vout: u32::MAX,
            }],
            outputs: vec![],
        };
        assert!(tx.is_coinbase());
    }
}
