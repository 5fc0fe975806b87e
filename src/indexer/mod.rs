//! Indexer driver
//!
//! The follower owns the backend and the store, keeps the ledger synced
//! to the chain tip, and performs reorg rollback-and-replay. Transient
//! backend failures are retried with doubling backoff; a block that
//! fails twice halts the follower rather than risking divergent state.

pub mod processor;
pub mod reorg;

pub use processor::{BlockProcessor, BlockSummary, ProcessError};
pub use reorg::{detect_reorg, ChainStatus};

use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;

use crate::backend::{BackendError, BitcoinBackend, Block};
use crate::config;
use crate::storage::{StampStore, StoreError};

#[derive(Error, Debug)]
pub enum FollowError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("block {0} failed twice, halting")]
    BlockFailed(u64),
}

/// Follows the chain tip, processing blocks in order
pub struct Indexer<B: BitcoinBackend, S: StampStore> {
    backend: B,
    store: S,
    retry_delay: Duration,
    max_attempts: u32,
}

impl<B: BitcoinBackend, S: StampStore> Indexer<B, S> {
    pub fn new(backend: B, store: S) -> Self {
        Indexer {
            backend,
            store,
            retry_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }

    /// Override the backoff policy (tests use a zero delay)
    pub fn with_retry_policy(mut self, retry_delay: Duration, max_attempts: u32) -> Self {
        self.retry_delay = retry_delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// One sync pass: reorg check, then process up to the chain tip
    ///
    /// Returns the number of blocks processed.
    pub fn sync_to_tip(&mut self) -> Result<u64, FollowError> {
        // The scan's hash lookups go through the same retry policy as
        // every other backend call
        let status = self.with_backoff("reorg_scan", |b| detect_reorg(b, &self.store))?;
        if let ChainStatus::Diverged { block_index } = status {
            warn!("rolling back to block {}", block_index);
            self.store.purge_from(block_index)?;
        }

        let chain_height = self.with_backoff("get_block_count", |b| b.get_block_count())?;
        let mut next = match self.store.tip() {
            Some(tip) => tip.block_index + 1,
            None => config::GENESIS_BLOCK,
        };
        next = next.max(config::GENESIS_BLOCK);

        let mut processed = 0;
        while next <= chain_height {
            let hash = self.with_backoff("get_block_hash", |b| b.get_block_hash(next))?;
            let block = self.with_backoff("get_block", |b| b.get_block(&hash))?;
            self.process_with_retry(&block)?;
            processed += 1;
            next += 1;
        }
        if processed > 0 {
            info!("synced {} blocks, tip now {}", processed, chain_height);
        }
        Ok(processed)
    }

    /// Run forever, polling for new blocks
    pub fn follow(&mut self, poll_interval: Duration) -> Result<(), FollowError> {
        loop {
            self.sync_to_tip()?;
            thread::sleep(poll_interval);
        }
    }

    /// Process one block, retrying once before giving up
    fn process_with_retry(&mut self, block: &Block) -> Result<BlockSummary, FollowError> {
        let processor = BlockProcessor::new(&self.backend);
        match processor.process_block(&mut self.store, block) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                warn!("block {} failed ({}), retrying once", block.height, err);
                thread::sleep(self.retry_delay);
                processor.process_block(&mut self.store, block).map_err(|err| {
                    error!("block {} failed twice: {}", block.height, err);
                    FollowError::BlockFailed(block.height)
                })
            }
        }
    }

    /// Retry transient backend failures with doubling backoff
    fn with_backoff<T>(
        &self,
        what: &str,
        mut call: impl FnMut(&B) -> Result<T, BackendError>,
    ) -> Result<T, FollowError> {
        let mut delay = self.retry_delay;
        let mut attempt = 1;
        loop {
            match call(&self.backend) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "{} failed ({}), attempt {}/{}",
                        what, err, attempt, self.max_attempts
                    );
                    thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Recompute all balances from the persisted op log
pub fn rebuild_balances<S: StampStore>(store: &mut S) -> Result<(), StoreError> {
    info!("rebuilding balances from the op log");
    store.rebuild_balances()
}
