//! SRC-20 ledger state machine
//!
//! One engine instance lives for one block. It layers in-block state
//! (deploys, minted supply, touched balances) over the persisted view so
//! that a MINT in transaction 5 sees a DEPLOY from transaction 2 of the
//! same block. Every processed operation yields a row with a validity
//! flag and status code; protocol rejection is data, not an error.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::src20::amount::Amount;
use crate::src20::op::{Src20FormatError, Src20Op};

/// Read-only ledger view the engine validates against
pub trait Src20State {
    fn src20_token(&self, tick: &str) -> Option<Src20Token>;
    fn src20_minted_supply(&self, tick: &str) -> Amount;
    fn src20_balance(&self, tick: &str, address: &str) -> Amount;
}

/// A deployed fungible token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Src20Token {
    pub tick: String,
    pub max: Amount,
    pub lim: Amount,
    pub dec: u32,
    pub deploy_tx_hash: String,
    pub deploy_block_index: u64,
    pub creator: Option<String>,
}

/// Status codes recorded on every SRC-20 op row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Src20Status {
    Valid,
    /// "ID": payload failed the format gate or lacks required addresses
    InvalidData,
    /// "DE": tick already deployed
    AlreadyDeployed,
    /// "ND": tick not deployed
    NotDeployed,
    /// "NA": zero amount or more fractional digits than the token allows
    InvalidAmount,
    /// "OL": mint amount above the per-operation limit
    OverMintLimit,
    /// "OM": mint would push minted supply over max
    OverMaxSupply,
    /// "BB": transfer amount above the sender's balance
    InsufficientBalance,
    /// "UO": recognized protocol, unsupported operation
    UnsupportedOp,
}

impl Src20Status {
    pub fn code(&self) -> &'static str {
        match self {
            Src20Status::Valid => "OK",
            Src20Status::InvalidData => "ID",
            Src20Status::AlreadyDeployed => "DE",
            Src20Status::NotDeployed => "ND",
            Src20Status::InvalidAmount => "NA",
            Src20Status::OverMintLimit => "OL",
            Src20Status::OverMaxSupply => "OM",
            Src20Status::InsufficientBalance => "BB",
            Src20Status::UnsupportedOp => "UO",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Src20Status::Valid)
    }
}

/// One processed operation as persisted in the op log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSrc20 {
    pub tx_hash: String,
    pub block_index: u64,
    pub tx_index: u32,
    pub block_time: u64,
    pub op: String,
    pub tick: String,
    pub amt: Option<Amount>,
    pub max: Option<Amount>,
    pub lim: Option<Amount>,
    pub dec: Option<u32>,
    pub creator: Option<String>,
    pub destination: Option<String>,
    pub valid: bool,
    pub status: Src20Status,
}

/// Transaction facts the engine needs alongside the parsed op
#[derive(Clone, Debug)]
pub struct Src20Context {
    pub tx_hash: String,
    pub block_index: u64,
    pub tx_index: u32,
    pub block_time: u64,
    pub creator: Option<String>,
    pub destination: Option<String>,
}

/// Everything one block changed in the SRC-20 ledger
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Src20BlockResult {
    pub ops: Vec<ProcessedSrc20>,
    pub new_tokens: Vec<Src20Token>,
    /// Absolute balances for every (tick, address) touched this block
    pub balances: HashMap<(String, String), Amount>,
}

/// Block-scoped SRC-20 validator
pub struct Src20Engine<'a> {
    state: &'a dyn Src20State,
    tokens: HashMap<String, Src20Token>,
    minted: HashMap<String, Amount>,
    balances: HashMap<(String, String), Amount>,
    ops: Vec<ProcessedSrc20>,
}

impl<'a> Src20Engine<'a> {
    pub fn new(state: &'a dyn Src20State) -> Self {
        Src20Engine {
            state,
            tokens: HashMap::new(),
            minted: HashMap::new(),
            balances: HashMap::new(),
            ops: Vec::new(),
        }
    }

    fn token(&self, tick: &str) -> Option<Src20Token> {
        self.tokens
            .get(tick)
            .cloned()
            .or_else(|| self.state.src20_token(tick))
    }

    fn minted_supply(&self, tick: &str) -> Amount {
        self.minted
            .get(tick)
            .copied()
            .unwrap_or_else(|| self.state.src20_minted_supply(tick))
    }

    fn balance(&self, tick: &str, address: &str) -> Amount {
        self.balances
            .get(&(tick.to_string(), address.to_string()))
            .copied()
            .unwrap_or_else(|| self.state.src20_balance(tick, address))
    }

    fn set_balance(&mut self, tick: &str, address: &str, value: Amount) {
        self.balances
            .insert((tick.to_string(), address.to_string()), value);
    }

    /// Validate one operation and record its row; returns the status
    pub fn process(
        &mut self,
        ctx: &Src20Context,
        parsed: Result<Src20Op, Src20FormatError>,
    ) -> Src20Status {
        let op = match parsed {
            Ok(op) => op,
            Err(err) => {
                let status = match err {
                    Src20FormatError::UnsupportedOp(_) => Src20Status::UnsupportedOp,
                    _ => Src20Status::InvalidData,
                };
                warn!(
                    "src20 format rejection in {} at block {}: {}",
                    ctx.tx_hash, ctx.block_index, err
                );
                self.record(ctx, "INVALID", "", None, None, None, None, status);
                return status;
            }
        };

        let status = match &op {
            Src20Op::Deploy { tick, max, lim, dec } => {
                self.apply_deploy(ctx, tick, *max, *lim, *dec)
            }
            Src20Op::Mint { tick, amt } => self.apply_mint(ctx, tick, *amt),
            Src20Op::Transfer { tick, amt } => self.apply_transfer(ctx, tick, *amt),
        };

        if !status.is_valid() {
            warn!(
                "src20 {} {:?} rejected ({}) in {} at block {}",
                op.op_name(),
                op.tick(),
                status.code(),
                ctx.tx_hash,
                ctx.block_index
            );
        }

        let (amt, max, lim, dec) = match &op {
            Src20Op::Deploy { max, lim, dec, .. } => (None, Some(*max), Some(*lim), Some(*dec)),
            Src20Op::Mint { amt, .. } | Src20Op::Transfer { amt, .. } => {
                (Some(*amt), None, None, None)
            }
        };
        self.record(ctx, op.op_name(), op.tick(), amt, max, lim, dec, status);
        status
    }

    fn apply_deploy(
        &mut self,
        ctx: &Src20Context,
        tick: &str,
        max: Amount,
        lim: Amount,
        dec: u32,
    ) -> Src20Status {
        if self.token(tick).is_some() {
            return Src20Status::AlreadyDeployed;
        }
        if max.is_zero() || lim.is_zero() {
            return Src20Status::InvalidAmount;
        }
        // A per-op limit above max is meaningless; cap it at deploy time
        let lim = lim.min(max);
        self.tokens.insert(
            tick.to_string(),
            Src20Token {
                tick: tick.to_string(),
                max,
                lim,
                dec,
                deploy_tx_hash: ctx.tx_hash.clone(),
                deploy_block_index: ctx.block_index,
                creator: ctx.creator.clone(),
            },
        );
        Src20Status::Valid
    }

    fn apply_mint(&mut self, ctx: &Src20Context, tick: &str, amt: Amount) -> Src20Status {
        let token = match self.token(tick) {
            Some(t) => t,
            None => return Src20Status::NotDeployed,
        };
        if amt.is_zero() || amt.decimal_places() > token.dec {
            return Src20Status::InvalidAmount;
        }
        let recipient = match ctx.destination.as_deref().or(ctx.creator.as_deref()) {
            Some(addr) => addr.to_string(),
            None => return Src20Status::InvalidData,
        };
        if amt > token.lim {
            return Src20Status::OverMintLimit;
        }
        let minted = self.minted_supply(tick);
        let new_supply = match minted.checked_add(amt) {
            Some(total) if total <= token.max => total,
            _ => return Src20Status::OverMaxSupply,
        };

        let credited = match self.balance(tick, &recipient).checked_add(amt) {
            Some(b) => b,
            None => return Src20Status::OverMaxSupply,
        };
        self.minted.insert(tick.to_string(), new_supply);
        self.set_balance(tick, &recipient, credited);
        Src20Status::Valid
    }

    fn apply_transfer(&mut self, ctx: &Src20Context, tick: &str, amt: Amount) -> Src20Status {
        let token = match self.token(tick) {
            Some(t) => t,
            None => return Src20Status::NotDeployed,
        };
        if amt.is_zero() || amt.decimal_places() > token.dec {
            return Src20Status::InvalidAmount;
        }
        let (sender, recipient) = match (ctx.creator.as_deref(), ctx.destination.as_deref()) {
            (Some(s), Some(r)) => (s.to_string(), r.to_string()),
            _ => return Src20Status::InvalidData,
        };

        let sender_balance = self.balance(tick, &sender);
        let debited = match sender_balance.checked_sub(amt) {
            Some(b) => b,
            None => return Src20Status::InsufficientBalance,
        };
        // Self-transfers are valid no-ops on the balance table
        if sender == recipient {
            return Src20Status::Valid;
        }
        let credited = match self.balance(tick, &recipient).checked_add(amt) {
            Some(b) => b,
            None => return Src20Status::InvalidAmount,
        };
        self.set_balance(tick, &sender, debited);
        self.set_balance(tick, &recipient, credited);
        Src20Status::Valid
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        ctx: &Src20Context,
        op: &str,
        tick: &str,
        amt: Option<Amount>,
        max: Option<Amount>,
        lim: Option<Amount>,
        dec: Option<u32>,
        status: Src20Status,
    ) {
        self.ops.push(ProcessedSrc20 {
            tx_hash: ctx.tx_hash.clone(),
            block_index: ctx.block_index,
            tx_index: ctx.tx_index,
            block_time: ctx.block_time,
            op: op.to_string(),
            tick: tick.to_string(),
            amt,
            max,
            lim,
            dec,
            creator: ctx.creator.clone(),
            destination: ctx.destination.clone(),
            valid: status.is_valid(),
            status,
        });
    }

    /// Close out the block
    pub fn finish(self) -> Src20BlockResult {
        Src20BlockResult {
            ops: self.ops,
            new_tokens: self.tokens.into_values().collect(),
            balances: self.balances,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("op log violates conservation at {tx_hash} (block {block_index})")]
    Conservation { tx_hash: String, block_index: u64 },
}

/// Recompute all balances from the validated op log
///
/// The input must be the valid rows only, in (block_index, tx_index)
/// order. Used by the balance rebuild entrypoint and after a reorg purge.
pub fn replay_balances(
    ops: &[ProcessedSrc20],
) -> Result<HashMap<(String, String), Amount>, ReplayError> {
    let mut balances: HashMap<(String, String), Amount> = HashMap::new();
    for row in ops {
        let conservation = || ReplayError::Conservation {
            tx_hash: row.tx_hash.clone(),
            block_index: row.block_index,
        };
        match (row.op.as_str(), row.amt) {
            ("MINT", Some(amt)) => {
                let recipient = row
                    .destination
                    .clone()
                    .or_else(|| row.creator.clone())
                    .ok_or_else(conservation)?;
                let entry = balances
                    .entry((row.tick.clone(), recipient))
                    .or_insert(Amount::ZERO);
                *entry = entry.checked_add(amt).ok_or_else(conservation)?;
            }
            ("TRANSFER", Some(amt)) => {
                let sender = row.creator.clone().ok_or_else(conservation)?;
                let recipient = row.destination.clone().ok_or_else(conservation)?;
                if sender == recipient {
                    continue;
                }
                let from = balances
                    .entry((row.tick.clone(), sender))
                    .or_insert(Amount::ZERO);
                *from = from.checked_sub(amt).ok_or_else(conservation)?;
                let to = balances
                    .entry((row.tick.clone(), recipient))
                    .or_insert(Amount::ZERO);
                *to = to.checked_add(amt).ok_or_else(conservation)?;
            }
            _ => {}
        }
    }
    Ok(balances)
}
