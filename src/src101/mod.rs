//! SRC-101 name-registry protocol

pub mod engine;
pub mod op;

pub use engine::{
    replay_registry, ProcessedSrc101, RegistryEntry, Src101BlockResult, Src101Context, Src101Deploy, Src101Engine,
    Src101State, Src101Status,
};
pub use op::{parse_src101, Src101FormatError, Src101Op};
