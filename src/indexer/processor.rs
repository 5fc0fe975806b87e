//! Block processing
//!
//! One pass over a block's transactions in index order: decode, classify,
//! number, run the protocol engines, then hand the whole block to the
//! store as a single commit. Nothing is persisted until every transaction
//! has been validated, so a half-processed block can never be observed.

use log::{debug, info, warn};
use thiserror::Error;

use crate::backend::{BackendError, BitcoinBackend, Block, Transaction};
use crate::config;
use crate::decode::{decode_address, decode_transaction, EncodingScheme};
use crate::src101::{parse_src101, Src101Context, Src101Engine};
use crate::src20::{parse_src20, Src20Context, Src20Engine};
use crate::stamp::{classify, stamp_hash, Artifact, Ident};
use crate::storage::{BlockChanges, StampStore, StoreError};
use crate::crypto::sha256_hex;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one processed block contained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub block_index: u64,
    pub artifacts: usize,
    pub valid_stamps: usize,
    pub cursed_stamps: usize,
    pub src20_ops: usize,
    pub src101_ops: usize,
}

/// Validates blocks against a store through a Bitcoin backend
pub struct BlockProcessor<'a, B: BitcoinBackend> {
    backend: &'a B,
}

impl<'a, B: BitcoinBackend> BlockProcessor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        BlockProcessor { backend }
    }

    /// Process one block and commit its changes atomically
    pub fn process_block<S: StampStore>(
        &self,
        store: &mut S,
        block: &Block,
    ) -> Result<BlockSummary, ProcessError> {
        let changes = self.build_changes(store, block)?;
        let summary = BlockSummary {
            block_index: block.height,
            artifacts: changes.artifacts.len(),
            valid_stamps: changes
                .artifacts
                .iter()
                .filter(|a| a.stamp_number >= 0)
                .count(),
            cursed_stamps: changes.artifacts.iter().filter(|a| a.is_cursed).count(),
            src20_ops: changes.src20.ops.len(),
            src101_ops: changes.src101.ops.len(),
        };
        store.commit_block(changes)?;
        info!(
            "block {}: {} artifacts ({} valid, {} cursed), {} src20 ops, {} src101 ops",
            summary.block_index,
            summary.artifacts,
            summary.valid_stamps,
            summary.cursed_stamps,
            summary.src20_ops,
            summary.src101_ops
        );
        Ok(summary)
    }

    /// Validate every transaction of a block into a `BlockChanges`
    pub fn build_changes<S: StampStore>(
        &self,
        store: &S,
        block: &Block,
    ) -> Result<BlockChanges, ProcessError> {
        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut block_content_hashes: std::collections::HashSet<String> =
            std::collections::HashSet::new();
        let mut seen_txs: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut next_valid = store.next_stamp_number();
        let mut next_cursed = store.next_cursed_number();

        let mut src20_engine = Src20Engine::new(store);
        let mut src101_engine = Src101Engine::new(store);

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            if tx.is_coinbase() {
                continue;
            }
            if store.tx_seen(&tx.tx_hash) || !seen_txs.insert(tx.tx_hash.as_str()) {
                debug!("skipping already-seen transaction {}", tx.tx_hash);
                continue;
            }

            let decoded = match decode_transaction(tx, block.height) {
                Ok(d) => d,
                Err(err) => {
                    debug!("no payload in {}: {}", tx.tx_hash, err);
                    continue;
                }
            };

            let eligible = decoded.keyburn
                || (decoded.scheme == EncodingScheme::WitnessScript
                    && block.height >= config::P2WSH_ACTIVATION_BLOCK);
            let classification = classify(&decoded.data, eligible);
            let content_hash = sha256_hex(&classification.content);

            // Duplicate content only curses file stamps; identical protocol
            // payloads (repeated mints) are expected
            let duplicate = matches!(classification.ident, Ident::Stamp | Ident::Unknown)
                && (block_content_hashes.contains(&content_hash)
                    || store.content_hash_seen(&content_hash));
            let is_cursed = classification.cursed || duplicate;

            let stamp_number = if is_cursed {
                let n = next_cursed;
                next_cursed -= 1;
                n
            } else {
                let n = next_valid;
                next_valid += 1;
                n
            };
            block_content_hashes.insert(content_hash.clone());

            let creator = self.resolve_source(tx)?;

            if !is_cursed {
                match classification.ident {
                    Ident::Src20 => {
                        let ctx = Src20Context {
                            tx_hash: tx.tx_hash.clone(),
                            block_index: block.height,
                            tx_index: tx_index as u32,
                            block_time: block.time,
                            creator: creator.clone(),
                            destination: decoded.destination.clone(),
                        };
                        src20_engine.process(&ctx, parse_src20(&decoded.data));
                    }
                    Ident::Src101 => {
                        let ctx = Src101Context {
                            tx_hash: tx.tx_hash.clone(),
                            block_index: block.height,
                            tx_index: tx_index as u32,
                            block_time: block.time,
                            creator: creator.clone(),
                            destination: decoded.destination.clone(),
                            destination_value: decoded.destination_value,
                        };
                        src101_engine.process(&ctx, parse_src101(&decoded.data));
                    }
                    Ident::Stamp | Ident::Unknown => {}
                }
            }

            artifacts.push(Artifact {
                stamp_hash: stamp_hash(block.height, &tx.tx_hash),
                stamp_number,
                tx_hash: tx.tx_hash.clone(),
                block_index: block.height,
                tx_index: tx_index as u32,
                block_time: block.time,
                ident: classification.ident,
                scheme: decoded.scheme,
                keyburn: decoded.keyburn,
                creator,
                destination: decoded.destination,
                destination_value: decoded.destination_value,
                content: classification.content,
                content_hash,
                mimetype: classification.mimetype,
                file_suffix: classification.file_suffix,
                is_valid_payload: classification.valid_payload,
                is_cursed,
            });
        }

        Ok(BlockChanges {
            header: block.header(),
            artifacts,
            src20: src20_engine.finish(),
            src101: src101_engine.finish(),
        })
    }

    /// Resolve the spending address of the first input
    ///
    /// Only transient backend failures abort the block; a prevout that
    /// cannot be found or decoded leaves the creator unknown.
    fn resolve_source(&self, tx: &Transaction) -> Result<Option<String>, ProcessError> {
        let input = match tx.inputs.first() {
            Some(i) if !i.is_coinbase() => i,
            _ => return Ok(None),
        };
        let raw = match self.backend.get_raw_transaction(&input.prev_tx_hash) {
            Ok(raw) => raw,
            Err(err) if err.is_transient() => return Err(err.into()),
            Err(err) => {
                warn!("prevout {} unavailable: {}", input.prev_tx_hash, err);
                return Ok(None);
            }
        };
        let prev_tx = match self.backend.deserialize(&raw) {
            Ok(tx) => tx,
            Err(err) => {
                warn!("prevout {} undecodable: {}", input.prev_tx_hash, err);
                return Ok(None);
            }
        };
        Ok(prev_tx
            .outputs
            .get(input.prev_vout as usize)
            .and_then(|out| decode_address(&out.script_pubkey)))
    }
}
