//! SRC-101 registry state machine
//!
//! Registrations are rows keyed by (deploy hash, tokenid). An expired
//! row keeps its history but frees the tokenid for a fresh mint; expiry
//! is wall-clock against the block timestamp, not block height.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::src101::op::{Src101FormatError, Src101Op};

/// Read-only registry view the engine validates against
pub trait Src101State {
    fn src101_deploy(&self, deploy_hash: &str) -> Option<Src101Deploy>;
    fn src101_entry(&self, deploy_hash: &str, tokenid: &str) -> Option<RegistryEntry>;
}

/// A deployed registry collection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Src101Deploy {
    pub deploy_hash: String,
    pub root: String,
    pub lim: u64,
    pub pri: u64,
    pub mintstart: u64,
    pub mintend: u64,
    pub rec: Vec<String>,
    pub dua: u64,
    pub block_index: u64,
    pub creator: Option<String>,
}

/// One registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub deploy_hash: String,
    pub tokenid: String,
    pub owner: String,
    pub preowner: Option<String>,
    pub expire_timestamp: u64,
    /// Opaque blob supplied at mint time
    pub data: Option<String>,
}

impl RegistryEntry {
    pub fn is_expired(&self, block_time: u64) -> bool {
        self.expire_timestamp <= block_time
    }
}

/// Status codes recorded on every SRC-101 op row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Src101Status {
    Valid,
    /// "ID": format failure or missing addresses
    InvalidData,
    /// "ND": deploy hash unknown
    NotDeployed,
    /// "NM": tokenid never minted under this deploy
    NotMinted,
    /// "DM": tokenid already registered and not expired
    DoubleMint,
    /// "UT": block time before mintstart
    UnderTime,
    /// "OT": block time at or past mintend
    OverTime,
    /// "OE": registration expired
    Expired,
    /// "NO": sender does not own the registration
    NotOwner,
    /// "IR": payment address not in the deploy's rec list
    InvalidRecipient,
    /// "IRV": destination value below pri x dua
    InsufficientValue,
    /// "UO": recognized protocol, unsupported operation
    UnsupportedOp,
}

impl Src101Status {
    pub fn code(&self) -> &'static str {
        match self {
            Src101Status::Valid => "OK",
            Src101Status::InvalidData => "ID",
            Src101Status::NotDeployed => "ND",
            Src101Status::NotMinted => "NM",
            Src101Status::DoubleMint => "DM",
            Src101Status::UnderTime => "UT",
            Src101Status::OverTime => "OT",
            Src101Status::Expired => "OE",
            Src101Status::NotOwner => "NO",
            Src101Status::InvalidRecipient => "IR",
            Src101Status::InsufficientValue => "IRV",
            Src101Status::UnsupportedOp => "UO",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Src101Status::Valid)
    }
}

/// One processed operation as persisted in the op log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSrc101 {
    pub tx_hash: String,
    pub block_index: u64,
    pub tx_index: u32,
    pub block_time: u64,
    pub op: String,
    pub deploy_hash: Option<String>,
    pub tokenid: Option<String>,
    pub toaddress: Option<String>,
    pub creator: Option<String>,
    /// Resulting expiry on valid MINT / RENEW rows, for log replay
    pub expire_timestamp: Option<u64>,
    /// Blob attached by a valid MINT, for log replay
    pub data: Option<String>,
    pub valid: bool,
    pub status: Src101Status,
}

/// Transaction facts the engine needs alongside the parsed op
#[derive(Clone, Debug)]
pub struct Src101Context {
    pub tx_hash: String,
    pub block_index: u64,
    pub tx_index: u32,
    pub block_time: u64,
    pub creator: Option<String>,
    /// Payment address (first output) for the rec check
    pub destination: Option<String>,
    /// First-output value in satoshis, checked against pri x dua
    pub destination_value: u64,
}

/// Everything one block changed in the registry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Src101BlockResult {
    pub ops: Vec<ProcessedSrc101>,
    pub new_deploys: Vec<Src101Deploy>,
    /// Full rows for every (deploy_hash, tokenid) touched this block
    pub entries: HashMap<(String, String), RegistryEntry>,
}

/// Block-scoped SRC-101 validator
pub struct Src101Engine<'a> {
    state: &'a dyn Src101State,
    deploys: HashMap<String, Src101Deploy>,
    entries: HashMap<(String, String), RegistryEntry>,
    ops: Vec<ProcessedSrc101>,
}

impl<'a> Src101Engine<'a> {
    pub fn new(state: &'a dyn Src101State) -> Self {
        Src101Engine {
            state,
            deploys: HashMap::new(),
            entries: HashMap::new(),
            ops: Vec::new(),
        }
    }

    fn deploy(&self, deploy_hash: &str) -> Option<Src101Deploy> {
        self.deploys
            .get(deploy_hash)
            .cloned()
            .or_else(|| self.state.src101_deploy(deploy_hash))
    }

    fn entry(&self, deploy_hash: &str, tokenid: &str) -> Option<RegistryEntry> {
        self.entries
            .get(&(deploy_hash.to_string(), tokenid.to_string()))
            .cloned()
            .or_else(|| self.state.src101_entry(deploy_hash, tokenid))
    }

    fn put_entry(&mut self, entry: RegistryEntry) {
        self.entries
            .insert((entry.deploy_hash.clone(), entry.tokenid.clone()), entry);
    }

    /// Validate one operation and record its row; returns the status
    pub fn process(
        &mut self,
        ctx: &Src101Context,
        parsed: Result<Src101Op, Src101FormatError>,
    ) -> Src101Status {
        let op = match parsed {
            Ok(op) => op,
            Err(err) => {
                let status = match err {
                    Src101FormatError::UnsupportedOp(_) => Src101Status::UnsupportedOp,
                    _ => Src101Status::InvalidData,
                };
                warn!(
                    "src101 format rejection in {} at block {}: {}",
                    ctx.tx_hash, ctx.block_index, err
                );
                self.record(ctx, "INVALID", None, None, None, None, None, status);
                return status;
            }
        };

        let status = match &op {
            Src101Op::Deploy { .. } => self.apply_deploy(ctx, &op),
            Src101Op::Mint {
                deploy_hash,
                tokenid,
                toaddress,
                dua,
                data,
            } => self.apply_mint(ctx, deploy_hash, tokenid, toaddress, *dua, data.clone()),
            Src101Op::Transfer {
                deploy_hash,
                tokenid,
                toaddress,
            } => self.apply_transfer(ctx, deploy_hash, tokenid, toaddress),
            Src101Op::Renew {
                deploy_hash,
                tokenid,
                dua,
            } => self.apply_renew(ctx, deploy_hash, tokenid, *dua),
        };

        if !status.is_valid() {
            warn!(
                "src101 {} rejected ({}) in {} at block {}",
                op.op_name(),
                status.code(),
                ctx.tx_hash,
                ctx.block_index
            );
        }

        let (deploy_hash, tokenid, toaddress, data) = match &op {
            Src101Op::Deploy { .. } => (Some(ctx.tx_hash.clone()), None, None, None),
            Src101Op::Mint {
                deploy_hash,
                tokenid,
                toaddress,
                data,
                ..
            } => (
                Some(deploy_hash.clone()),
                Some(tokenid.clone()),
                Some(toaddress.clone()),
                data.clone(),
            ),
            Src101Op::Transfer {
                deploy_hash,
                tokenid,
                toaddress,
            } => (
                Some(deploy_hash.clone()),
                Some(tokenid.clone()),
                Some(toaddress.clone()),
                None,
            ),
            Src101Op::Renew {
                deploy_hash,
                tokenid,
                ..
            } => (Some(deploy_hash.clone()), Some(tokenid.clone()), None, None),
        };
        let expire = match (&status, deploy_hash.as_deref(), tokenid.as_deref()) {
            (Src101Status::Valid, Some(dh), Some(tid))
                if matches!(op, Src101Op::Mint { .. } | Src101Op::Renew { .. }) =>
            {
                self.entries
                    .get(&(dh.to_string(), tid.to_string()))
                    .map(|e| e.expire_timestamp)
            }
            _ => None,
        };
        self.record(ctx, op.op_name(), deploy_hash, tokenid, toaddress, expire, data, status);
        status
    }

    fn apply_deploy(&mut self, ctx: &Src101Context, op: &Src101Op) -> Src101Status {
        let Src101Op::Deploy {
            root,
            lim,
            pri,
            mintstart,
            mintend,
            rec,
            dua,
        } = op
        else {
            return Src101Status::InvalidData;
        };
        if mintstart >= mintend || *dua == 0 {
            return Src101Status::InvalidData;
        }
        self.deploys.insert(
            ctx.tx_hash.clone(),
            Src101Deploy {
                deploy_hash: ctx.tx_hash.clone(),
                root: root.clone(),
                lim: *lim,
                pri: *pri,
                mintstart: *mintstart,
                mintend: *mintend,
                rec: rec.clone(),
                dua: *dua,
                block_index: ctx.block_index,
                creator: ctx.creator.clone(),
            },
        );
        Src101Status::Valid
    }

    fn apply_mint(
        &mut self,
        ctx: &Src101Context,
        deploy_hash: &str,
        tokenid: &str,
        toaddress: &str,
        dua: u64,
        data: Option<String>,
    ) -> Src101Status {
        let deploy = match self.deploy(deploy_hash) {
            Some(d) => d,
            None => return Src101Status::NotDeployed,
        };
        if dua == 0 || toaddress.is_empty() {
            return Src101Status::InvalidData;
        }
        if ctx.block_time < deploy.mintstart {
            return Src101Status::UnderTime;
        }
        if ctx.block_time >= deploy.mintend {
            return Src101Status::OverTime;
        }
        if let Some(existing) = self.entry(deploy_hash, tokenid) {
            if !existing.is_expired(ctx.block_time) {
                return Src101Status::DoubleMint;
            }
        }
        if !deploy.rec.is_empty() {
            let paid_to = match ctx.destination.as_deref() {
                Some(addr) => addr,
                None => return Src101Status::InvalidRecipient,
            };
            if !deploy.rec.iter().any(|r| r == paid_to) {
                return Src101Status::InvalidRecipient;
            }
        }
        let price = match deploy.pri.checked_mul(dua) {
            Some(p) => p,
            None => return Src101Status::InsufficientValue,
        };
        if ctx.destination_value < price {
            return Src101Status::InsufficientValue;
        }
        let expire = ctx
            .block_time
            .saturating_add(dua.saturating_mul(config::SRC101_PERIOD_SECONDS));
        self.put_entry(RegistryEntry {
            deploy_hash: deploy_hash.to_string(),
            tokenid: tokenid.to_string(),
            owner: toaddress.to_string(),
            preowner: None,
            expire_timestamp: expire,
            data,
        });
        Src101Status::Valid
    }

    fn apply_transfer(
        &mut self,
        ctx: &Src101Context,
        deploy_hash: &str,
        tokenid: &str,
        toaddress: &str,
    ) -> Src101Status {
        let mut entry = match self.entry(deploy_hash, tokenid) {
            Some(e) => e,
            None => return Src101Status::NotMinted,
        };
        if entry.is_expired(ctx.block_time) {
            return Src101Status::Expired;
        }
        match ctx.creator.as_deref() {
            Some(sender) if sender == entry.owner => {}
            _ => return Src101Status::NotOwner,
        }
        if toaddress.is_empty() {
            return Src101Status::InvalidData;
        }
        entry.preowner = Some(entry.owner.clone());
        entry.owner = toaddress.to_string();
        self.put_entry(entry);
        Src101Status::Valid
    }

    fn apply_renew(
        &mut self,
        ctx: &Src101Context,
        deploy_hash: &str,
        tokenid: &str,
        dua: u64,
    ) -> Src101Status {
        let deploy = match self.deploy(deploy_hash) {
            Some(d) => d,
            None => return Src101Status::NotDeployed,
        };
        let mut entry = match self.entry(deploy_hash, tokenid) {
            Some(e) => e,
            None => return Src101Status::NotMinted,
        };
        if dua == 0 {
            return Src101Status::InvalidData;
        }
        match ctx.creator.as_deref() {
            Some(sender) if sender == entry.owner => {}
            _ => return Src101Status::NotOwner,
        }
        let price = match deploy.pri.checked_mul(dua) {
            Some(p) => p,
            None => return Src101Status::InsufficientValue,
        };
        if ctx.destination_value < price {
            return Src101Status::InsufficientValue;
        }
        // Extension runs from whichever is later, current expiry or now
        let base = entry.expire_timestamp.max(ctx.block_time);
        entry.expire_timestamp =
            base.saturating_add(dua.saturating_mul(config::SRC101_PERIOD_SECONDS));
        self.put_entry(entry);
        Src101Status::Valid
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        ctx: &Src101Context,
        op: &str,
        deploy_hash: Option<String>,
        tokenid: Option<String>,
        toaddress: Option<String>,
        expire_timestamp: Option<u64>,
        data: Option<String>,
        status: Src101Status,
    ) {
        self.ops.push(ProcessedSrc101 {
            tx_hash: ctx.tx_hash.clone(),
            block_index: ctx.block_index,
            tx_index: ctx.tx_index,
            block_time: ctx.block_time,
            op: op.to_string(),
            deploy_hash,
            tokenid,
            toaddress,
            creator: ctx.creator.clone(),
            expire_timestamp,
            data,
            valid: status.is_valid(),
            status,
        });
    }

    /// Close out the block
    pub fn finish(self) -> Src101BlockResult {
        Src101BlockResult {
            ops: self.ops,
            new_deploys: self.deploys.into_values().collect(),
            entries: self.entries,
        }
    }
}

/// Recompute the registry from the validated op log
///
/// The input must be the valid rows only, in (block_index, tx_index)
/// order. MINT and RENEW rows carry their resulting expiry, so no deploy
/// lookups are needed.
pub fn replay_registry(ops: &[ProcessedSrc101]) -> HashMap<(String, String), RegistryEntry> {
    let mut entries: HashMap<(String, String), RegistryEntry> = HashMap::new();
    for row in ops {
        let (deploy_hash, tokenid) = match (&row.deploy_hash, &row.tokenid) {
            (Some(dh), Some(tid)) => (dh.clone(), tid.clone()),
            _ => continue,
        };
        let key = (deploy_hash.clone(), tokenid.clone());
        match row.op.as_str() {
            "MINT" => {
                if let (Some(owner), Some(expire)) = (&row.toaddress, row.expire_timestamp) {
                    entries.insert(
                        key,
                        RegistryEntry {
                            deploy_hash,
                            tokenid,
                            owner: owner.clone(),
                            preowner: None,
                            expire_timestamp: expire,
                            data: row.data.clone(),
                        },
                    );
                }
            }
            "TRANSFER" => {
                if let (Some(entry), Some(owner)) = (entries.get_mut(&key), &row.toaddress) {
                    entry.preowner = Some(entry.owner.clone());
                    entry.owner = owner.clone();
                }
            }
            "RENEW" => {
                if let (Some(entry), Some(expire)) = (entries.get_mut(&key), row.expire_timestamp)
                {
                    entry.expire_timestamp = expire;
                }
            }
            _ => {}
        }
    }
    entries
}
