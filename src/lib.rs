//! Stamp Indexer: recovery and validation of data embedded in Bitcoin transactions
//!
//! This crate turns raw Bitcoin blocks into a validated ledger of stamps
//! and token operations:
//! - ARC4 de-obfuscation of multisig-embedded payloads
//! - plain data-carrying and witness-script payload recovery
//! - artifact classification (file stamps, SRC-20, SRC-101)
//! - SRC-20 fungible-token ledger with conservation guarantees
//! - SRC-101 name registry with ownership and expiry
//! - ordered block processing with atomic commits and reorg rollback
//!
//! # Example
//!
//! ```rust
//! use stamp_indexer::backend::MemoryBackend;
//! use stamp_indexer::indexer::Indexer;
//! use stamp_indexer::storage::{MemoryStore, StampStore};
//!
//! let backend = MemoryBackend::new();
//! let mut indexer = Indexer::new(backend, MemoryStore::new());
//! // An empty chain syncs no blocks
//! assert!(indexer.store().tip().is_none());
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod decode;
pub mod indexer;
pub mod src101;
pub mod src20;
pub mod stamp;
pub mod storage;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use backend::{BitcoinBackend, Block, BlockHeader, MemoryBackend, Transaction};
pub use codec::Arc4;
pub use decode::{decode_transaction, DecodedPayload, EncodingScheme};
pub use indexer::{detect_reorg, BlockProcessor, ChainStatus, Indexer};
pub use src101::{Src101Engine, Src101Status};
pub use src20::{Amount, Src20Engine, Src20Status};
pub use stamp::{classify, Artifact, Ident};
pub use storage::{BlockChanges, FileStore, MemoryStore, StampStore};
