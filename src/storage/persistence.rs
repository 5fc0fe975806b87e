//! File-backed ledger
//!
//! Wraps `MemoryStore` with JSON durability. Every committed block is
//! flushed through a temporary file and an atomic rename, so a crash
//! mid-write leaves the previous snapshot intact.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::backend::BlockHeader;
use crate::src20::{Amount, ProcessedSrc20, Src20State, Src20Token};
use crate::src101::{RegistryEntry, Src101Deploy, Src101State};
use crate::stamp::Artifact;
use crate::storage::{BlockChanges, MemoryStore, StampStore, StoreError};

/// JSON-on-disk `StampStore`
pub struct FileStore {
    path: PathBuf,
    ledger: MemoryStore,
}

impl FileStore {
    /// Open an existing ledger file, or start empty if there is none
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let ledger = if path.exists() {
            let file = fs::File::open(&path)?;
            let mut ledger: MemoryStore = serde_json::from_reader(BufReader::new(file))?;
            ledger.rebuild_indexes();
            ledger
        } else {
            MemoryStore::new()
        };
        Ok(FileStore { path, ledger })
    }

    fn save(&self) -> Result<(), StoreError> {
        let temp_path = self.path.with_extension("tmp");
        let file = fs::File::create(&temp_path)?;
        serde_json::to_writer(BufWriter::new(file), &self.ledger)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl Src20State for FileStore {
    fn src20_token(&self, tick: &str) -> Option<Src20Token> {
        self.ledger.src20_token(tick)
    }
    fn src20_minted_supply(&self, tick: &str) -> Amount {
        self.ledger.src20_minted_supply(tick)
    }
    fn src20_balance(&self, tick: &str, address: &str) -> Amount {
        self.ledger.src20_balance(tick, address)
    }
}

impl Src101State for FileStore {
    fn src101_deploy(&self, deploy_hash: &str) -> Option<Src101Deploy> {
        self.ledger.src101_deploy(deploy_hash)
    }
    fn src101_entry(&self, deploy_hash: &str, tokenid: &str) -> Option<RegistryEntry> {
        self.ledger.src101_entry(deploy_hash, tokenid)
    }
}

impl StampStore for FileStore {
    fn tip(&self) -> Option<BlockHeader> {
        self.ledger.tip()
    }

    fn header(&self, block_index: u64) -> Option<BlockHeader> {
        self.ledger.header(block_index)
    }

    fn tx_seen(&self, tx_hash: &str) -> bool {
        self.ledger.tx_seen(tx_hash)
    }

    fn content_hash_seen(&self, content_hash: &str) -> bool {
        self.ledger.content_hash_seen(content_hash)
    }

    fn next_stamp_number(&self) -> i64 {
        self.ledger.next_stamp_number()
    }

    fn next_cursed_number(&self) -> i64 {
        self.ledger.next_cursed_number()
    }

    fn commit_block(&mut self, changes: BlockChanges) -> Result<(), StoreError> {
        self.ledger.commit_block(changes)?;
        self.save()
    }

    fn purge_from(&mut self, block_index: u64) -> Result<(), StoreError> {
        self.ledger.purge_from(block_index)?;
        self.save()
    }

    fn rebuild_balances(&mut self) -> Result<(), StoreError> {
        self.ledger.rebuild_balances()?;
        self.save()
    }

    fn valid_src20_ops(&self) -> Vec<ProcessedSrc20> {
        self.ledger.valid_src20_ops()
    }

    fn artifacts(&self) -> &[Artifact] {
        self.ledger.artifacts()
    }
}
