//! SRC-20 fungible-token protocol

pub mod amount;
pub mod engine;
pub mod op;

pub use amount::{Amount, AmountError};
pub use engine::{
    replay_balances, ProcessedSrc20, ReplayError, Src20BlockResult, Src20Context, Src20Engine,
    Src20State, Src20Status, Src20Token,
};
pub use op::{parse_src20, Src20FormatError, Src20Op};
