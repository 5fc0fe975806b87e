//! Ledger persistence
//!
//! `StampStore` is the one seam between the indexer and its state: the
//! block processor reads through it during validation and hands back a
//! whole block of changes at once. `MemoryStore` is the canonical
//! implementation; `FileStore` adds JSON-on-disk durability around it.

pub mod persistence;

pub use persistence::FileStore;

use std::collections::{HashMap, HashSet};
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BlockHeader;
use crate::src20::{
    replay_balances, Amount, ProcessedSrc20, ReplayError, Src20BlockResult, Src20State, Src20Token,
};
use crate::src101::{
    replay_registry, ProcessedSrc101, RegistryEntry, Src101BlockResult, Src101Deploy, Src101State,
};
use crate::stamp::Artifact;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("header gap: expected block {expected}, got {got}")]
    HeaderGap { expected: u64, got: u64 },
    #[error("broken header link at block {block_index}: previous hash {got}, tip is {expected}")]
    BrokenLink {
        block_index: u64,
        expected: String,
        got: String,
    },
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Everything one block changes, applied as a single unit
#[derive(Clone, Debug)]
pub struct BlockChanges {
    pub header: BlockHeader,
    pub artifacts: Vec<Artifact>,
    pub src20: Src20BlockResult,
    pub src101: Src101BlockResult,
}

/// Repository seam between the block processor and the ledger
pub trait StampStore: Src20State + Src101State {
    fn tip(&self) -> Option<BlockHeader>;
    fn header(&self, block_index: u64) -> Option<BlockHeader>;
    /// Guard against processing the same transaction twice
    fn tx_seen(&self, tx_hash: &str) -> bool;
    /// Curse-check identity lookup over everything already persisted
    fn content_hash_seen(&self, content_hash: &str) -> bool;
    /// Next number in the ascending valid sequence (starts at 0)
    fn next_stamp_number(&self) -> i64;
    /// Next number in the descending cursed sequence (starts at -1)
    fn next_cursed_number(&self) -> i64;
    fn commit_block(&mut self, changes: BlockChanges) -> Result<(), StoreError>;
    /// Drop every row at or above `block_index`; derived state is rebuilt
    fn purge_from(&mut self, block_index: u64) -> Result<(), StoreError>;
    /// Recompute all balances from the validated op log
    fn rebuild_balances(&mut self) -> Result<(), StoreError>;
    fn valid_src20_ops(&self) -> Vec<ProcessedSrc20>;
    fn artifacts(&self) -> &[Artifact];
}

/// In-memory ledger; everything serializable except the lookup indexes
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MemoryStore {
    headers: Vec<BlockHeader>,
    artifacts: Vec<Artifact>,
    valid_stamp_count: u64,
    cursed_stamp_count: u64,
    src20_ops: Vec<ProcessedSrc20>,
    src20_tokens: HashMap<String, Src20Token>,
    src20_minted: HashMap<String, Amount>,
    /// tick -> address -> balance
    balances: HashMap<String, HashMap<String, Amount>>,
    src101_ops: Vec<ProcessedSrc101>,
    src101_deploys: HashMap<String, Src101Deploy>,
    /// deploy hash -> tokenid -> entry
    registry: HashMap<String, HashMap<String, RegistryEntry>>,
    #[serde(skip)]
    tx_index: HashSet<String>,
    #[serde(skip)]
    content_index: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Repopulate the lookup indexes (not serialized) after a load
    pub fn rebuild_indexes(&mut self) {
        self.tx_index = self.artifacts.iter().map(|a| a.tx_hash.clone()).collect();
        self.content_index = self
            .artifacts
            .iter()
            .map(|a| a.content_hash.clone())
            .collect();
    }

    /// Recompute minted supplies, balances and the registry from the logs
    fn rebuild_derived(&mut self) -> Result<(), StoreError> {
        let valid20: Vec<ProcessedSrc20> = self
            .src20_ops
            .iter()
            .filter(|o| o.valid)
            .cloned()
            .collect();

        self.src20_minted.clear();
        for row in &valid20 {
            if row.op == "MINT" {
                if let Some(amt) = row.amt {
                    let entry = self
                        .src20_minted
                        .entry(row.tick.clone())
                        .or_insert(Amount::ZERO);
                    *entry = entry.checked_add(amt).ok_or(ReplayError::Conservation {
                        tx_hash: row.tx_hash.clone(),
                        block_index: row.block_index,
                    })?;
                }
            }
        }

        self.balances.clear();
        for ((tick, address), amount) in replay_balances(&valid20)? {
            self.balances.entry(tick).or_default().insert(address, amount);
        }

        let valid101: Vec<ProcessedSrc101> = self
            .src101_ops
            .iter()
            .filter(|o| o.valid)
            .cloned()
            .collect();
        self.registry.clear();
        for ((deploy_hash, tokenid), entry) in replay_registry(&valid101) {
            self.registry
                .entry(deploy_hash)
                .or_default()
                .insert(tokenid, entry);
        }
        Ok(())
    }

    fn check_chain(&self, header: &BlockHeader) -> Result<(), StoreError> {
        if let Some(tip) = self.tip() {
            let expected = tip.block_index + 1;
            if header.block_index != expected {
                return Err(StoreError::HeaderGap {
                    expected,
                    got: header.block_index,
                });
            }
            if header.previous_block_hash != tip.block_hash {
                return Err(StoreError::BrokenLink {
                    block_index: header.block_index,
                    expected: tip.block_hash,
                    got: header.previous_block_hash.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Src20State for MemoryStore {
    fn src20_token(&self, tick: &str) -> Option<Src20Token> {
        self.src20_tokens.get(tick).cloned()
    }

    fn src20_minted_supply(&self, tick: &str) -> Amount {
        self.src20_minted.get(tick).copied().unwrap_or(Amount::ZERO)
    }

    fn src20_balance(&self, tick: &str, address: &str) -> Amount {
        self.balances
            .get(tick)
            .and_then(|per_addr| per_addr.get(address))
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}

impl Src101State for MemoryStore {
    fn src101_deploy(&self, deploy_hash: &str) -> Option<Src101Deploy> {
        self.src101_deploys.get(deploy_hash).cloned()
    }

    fn src101_entry(&self, deploy_hash: &str, tokenid: &str) -> Option<RegistryEntry> {
        self.registry
            .get(deploy_hash)
            .and_then(|per_token| per_token.get(tokenid))
            .cloned()
    }
}

impl StampStore for MemoryStore {
    fn tip(&self) -> Option<BlockHeader> {
        self.headers.last().cloned()
    }

    fn header(&self, block_index: u64) -> Option<BlockHeader> {
        self.headers
            .iter()
            .find(|h| h.block_index == block_index)
            .cloned()
    }

    fn tx_seen(&self, tx_hash: &str) -> bool {
        self.tx_index.contains(tx_hash)
    }

    fn content_hash_seen(&self, content_hash: &str) -> bool {
        self.content_index.contains(content_hash)
    }

    fn next_stamp_number(&self) -> i64 {
        self.valid_stamp_count as i64
    }

    fn next_cursed_number(&self) -> i64 {
        -1 - self.cursed_stamp_count as i64
    }

    fn commit_block(&mut self, changes: BlockChanges) -> Result<(), StoreError> {
        self.check_chain(&changes.header)?;

        // Validate the whole minted-supply delta before mutating anything
        let mut minted: HashMap<String, Amount> = HashMap::new();
        for row in &changes.src20.ops {
            if row.valid && row.op == "MINT" {
                if let Some(amt) = row.amt {
                    let base = minted
                        .get(&row.tick)
                        .copied()
                        .unwrap_or_else(|| self.src20_minted_supply(&row.tick));
                    let total = base.checked_add(amt).ok_or(ReplayError::Conservation {
                        tx_hash: row.tx_hash.clone(),
                        block_index: row.block_index,
                    })?;
                    minted.insert(row.tick.clone(), total);
                }
            }
        }
        self.src20_minted.extend(minted);

        self.headers.push(changes.header);
        for artifact in changes.artifacts {
            if artifact.stamp_number >= 0 {
                self.valid_stamp_count += 1;
            } else {
                self.cursed_stamp_count += 1;
            }
            self.tx_index.insert(artifact.tx_hash.clone());
            self.content_index.insert(artifact.content_hash.clone());
            self.artifacts.push(artifact);
        }
        self.src20_ops.extend(changes.src20.ops);
        for token in changes.src20.new_tokens {
            self.src20_tokens.insert(token.tick.clone(), token);
        }
        for ((tick, address), amount) in changes.src20.balances {
            self.balances.entry(tick).or_default().insert(address, amount);
        }
        self.src101_ops.extend(changes.src101.ops);
        for deploy in changes.src101.new_deploys {
            self.src101_deploys
                .insert(deploy.deploy_hash.clone(), deploy);
        }
        for ((deploy_hash, tokenid), entry) in changes.src101.entries {
            self.registry
                .entry(deploy_hash)
                .or_default()
                .insert(tokenid, entry);
        }
        Ok(())
    }

    fn purge_from(&mut self, block_index: u64) -> Result<(), StoreError> {
        self.headers.retain(|h| h.block_index < block_index);
        self.artifacts.retain(|a| a.block_index < block_index);
        self.valid_stamp_count = self
            .artifacts
            .iter()
            .filter(|a| a.stamp_number >= 0)
            .count() as u64;
        self.cursed_stamp_count = self.artifacts.len() as u64 - self.valid_stamp_count;
        self.src20_ops.retain(|o| o.block_index < block_index);
        self.src20_tokens
            .retain(|_, t| t.deploy_block_index < block_index);
        self.src101_ops.retain(|o| o.block_index < block_index);
        self.src101_deploys
            .retain(|_, d| d.block_index < block_index);
        self.rebuild_indexes();
        self.rebuild_derived()
    }

    fn rebuild_balances(&mut self) -> Result<(), StoreError> {
        self.rebuild_derived()
    }

    fn valid_src20_ops(&self) -> Vec<ProcessedSrc20> {
        self.src20_ops.iter().filter(|o| o.valid).cloned().collect()
    }

    fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::EncodingScheme;
    use crate::stamp::Ident;

    fn header(index: u64, hash: &str, prev: &str) -> BlockHeader {
        BlockHeader {
            block_index: index,
            block_hash: hash.to_string(),
            previous_block_hash: prev.to_string(),
            block_time: 1_700_000_000 + index,
        }
    }

    fn artifact(tx: &str, block: u64, number: i64) -> Artifact {
        Artifact {
            stamp_hash: format!("sh-{tx}"),
            stamp_number: number,
            tx_hash: tx.to_string(),
            block_index: block,
            tx_index: 0,
            block_time: 1_700_000_000,
            ident: Ident::Stamp,
            scheme: EncodingScheme::Multisig,
            keyburn: true,
            creator: Some("1Creator".to_string()),
            destination: Some("1Dest".to_string()),
            destination_value: 546,
            content: b"content".to_vec(),
            content_hash: format!("ch-{tx}"),
            mimetype: Some("image/png".to_string()),
            file_suffix: Some("png".to_string()),
            is_valid_payload: true,
            is_cursed: number < 0,
        }
    }

    fn changes(header: BlockHeader) -> BlockChanges {
        BlockChanges {
            header,
            artifacts: Vec::new(),
            src20: Src20BlockResult::default(),
            src101: Src101BlockResult::default(),
        }
    }

    #[test]
    fn test_commit_enforces_chain_invariants() {
        let mut store = MemoryStore::new();
        store.commit_block(changes(header(100, "h100", "h99"))).unwrap();

        let err = store
            .commit_block(changes(header(102, "h102", "h101")))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::HeaderGap { expected: 101, got: 102 }
        ));

        let err = store
            .commit_block(changes(header(101, "h101", "wrong")))
            .unwrap_err();
        assert!(matches!(err, StoreError::BrokenLink { .. }));

        store.commit_block(changes(header(101, "h101", "h100"))).unwrap();
        assert_eq!(store.tip().unwrap().block_index, 101);
    }

    #[test]
    fn test_stamp_numbering_counters() {
        let mut store = MemoryStore::new();
        let mut c = changes(header(100, "h100", "h99"));
        c.artifacts.push(artifact("t0", 100, 0));
        c.artifacts.push(artifact("t1", 100, -1));
        c.artifacts.push(artifact("t2", 100, 1));
        store.commit_block(c).unwrap();

        assert_eq!(store.next_stamp_number(), 2);
        assert_eq!(store.next_cursed_number(), -2);
        assert!(store.tx_seen("t0"));
        assert!(store.content_hash_seen("ch-t1"));
    }

    #[test]
    fn test_purge_rolls_back_everything() {
        let mut store = MemoryStore::new();
        let mut c1 = changes(header(100, "h100", "h99"));
        c1.artifacts.push(artifact("t0", 100, 0));
        store.commit_block(c1).unwrap();
        let mut c2 = changes(header(101, "h101", "h100"));
        c2.artifacts.push(artifact("t1", 101, 1));
        store.commit_block(c2).unwrap();

        store.purge_from(101).unwrap();
        assert_eq!(store.tip().unwrap().block_index, 100);
        assert_eq!(store.next_stamp_number(), 1);
        assert!(!store.tx_seen("t1"));
        assert!(store.tx_seen("t0"));
        // A replacement block at the purged height now links cleanly
        store.commit_block(changes(header(101, "h101b", "h100"))).unwrap();
    }
}
