//! Chain reorganization detection
//!
//! Compares persisted headers against what the backend currently reports
//! for the most recent heights. The detector only diagnoses; rollback and
//! replay are driven by the follower loop.

use log::warn;

use crate::backend::{BackendError, BitcoinBackend};
use crate::config;
use crate::storage::StampStore;

/// Outcome of a consistency scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainStatus {
    Consistent,
    /// Lowest height whose persisted hash no longer matches the chain
    Diverged { block_index: u64 },
}

/// Scan the last [`config::REORG_SCAN_DEPTH`] persisted heights
pub fn detect_reorg<B: BitcoinBackend, S: StampStore>(
    backend: &B,
    store: &S,
) -> Result<ChainStatus, BackendError> {
    let tip = match store.tip() {
        Some(tip) => tip,
        None => return Ok(ChainStatus::Consistent),
    };
    let start = tip.block_index.saturating_sub(config::REORG_SCAN_DEPTH - 1);

    for height in start..=tip.block_index {
        let header = match store.header(height) {
            Some(h) => h,
            None => continue,
        };
        let chain_hash = match backend.get_block_hash(height) {
            Ok(hash) => hash,
            // The chain may have shrunk below our tip; that height diverged
            Err(BackendError::BlockNotFound(_)) => {
                warn!("block {} gone from the chain", height);
                return Ok(ChainStatus::Diverged { block_index: height });
            }
            Err(err) => return Err(err),
        };
        if header.block_hash != chain_hash {
            warn!(
                "reorg at block {}: persisted {}, chain has {}",
                height, header.block_hash, chain_hash
            );
            return Ok(ChainStatus::Diverged {
                block_index: height,
            });
        }
    }
    Ok(ChainStatus::Consistent)
}
