//! SRC-20 operation parsing and format validation
//!
//! The format gate runs before any state is consulted: a payload that
//! fails here never produces a ledger row for an unknown shape, it is
//! recorded as an invalid op. Field keys and the protocol tag are
//! matched case-insensitively; ticks are normalized to lowercase.

use thiserror::Error;

use crate::config;
use crate::src20::amount::{Amount, AmountError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Src20FormatError {
    #[error("payload is not a JSON object")]
    NotJson,
    #[error("protocol tag is not src-20")]
    WrongProtocol,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("unsupported operation {0:?}")]
    UnsupportedOp(String),
    #[error("tick fails charset or length rules")]
    BadTick,
    #[error("field {field}: {source}")]
    BadAmount {
        field: &'static str,
        source: AmountError,
    },
    #[error("dec outside 0..=18")]
    BadDecimals,
}

/// A format-valid SRC-20 operation with a normalized tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Src20Op {
    Deploy {
        tick: String,
        max: Amount,
        lim: Amount,
        dec: u32,
    },
    Mint {
        tick: String,
        amt: Amount,
    },
    Transfer {
        tick: String,
        amt: Amount,
    },
}

impl Src20Op {
    pub fn tick(&self) -> &str {
        match self {
            Src20Op::Deploy { tick, .. }
            | Src20Op::Mint { tick, .. }
            | Src20Op::Transfer { tick, .. } => tick,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Src20Op::Deploy { .. } => "DEPLOY",
            Src20Op::Mint { .. } => "MINT",
            Src20Op::Transfer { .. } => "TRANSFER",
        }
    }
}

fn field<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Option<&'a serde_json::Value> {
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn amount_field(
    object: &serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<Amount, Src20FormatError> {
    let value = field(object, name).ok_or(Src20FormatError::MissingField(name))?;
    Amount::from_json(value).map_err(|source| Src20FormatError::BadAmount {
        field: name,
        source,
    })
}

/// Normalize and validate a tick: lowercase, 1..=5 chars, restricted set
fn parse_tick(value: &serde_json::Value) -> Result<String, Src20FormatError> {
    let raw = value.as_str().ok_or(Src20FormatError::BadTick)?;
    let tick = raw.to_lowercase();
    let len = tick.chars().count();
    if len == 0 || len > config::TICK_MAX_LEN {
        return Err(Src20FormatError::BadTick);
    }
    if !tick.chars().all(config::is_valid_tick_char) {
        return Err(Src20FormatError::BadTick);
    }
    Ok(tick)
}

fn parse_dec(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<u32, Src20FormatError> {
    let value = match field(object, "dec") {
        None => return Ok(crate::src20::amount::SCALE),
        Some(v) => v,
    };
    let dec = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match dec {
        Some(d) if d <= crate::src20::amount::SCALE as u64 => Ok(d as u32),
        _ => Err(Src20FormatError::BadDecimals),
    }
}

/// Parse an SRC-20 payload into a typed operation
pub fn parse_src20(payload: &[u8]) -> Result<Src20Op, Src20FormatError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|_| Src20FormatError::NotJson)?;
    let object = value.as_object().ok_or(Src20FormatError::NotJson)?;

    let protocol = field(object, "p")
        .and_then(|v| v.as_str())
        .ok_or(Src20FormatError::WrongProtocol)?;
    if !protocol.eq_ignore_ascii_case("src-20") {
        return Err(Src20FormatError::WrongProtocol);
    }

    let op = field(object, "op")
        .and_then(|v| v.as_str())
        .ok_or(Src20FormatError::MissingField("op"))?;
    let tick = parse_tick(field(object, "tick").ok_or(Src20FormatError::MissingField("tick"))?)?;

    match op.to_lowercase().as_str() {
        "deploy" => Ok(Src20Op::Deploy {
            tick,
            max: amount_field(object, "max")?,
            lim: amount_field(object, "lim")?,
            dec: parse_dec(object)?,
        }),
        "mint" => Ok(Src20Op::Mint {
            tick,
            amt: amount_field(object, "amt")?,
        }),
        "transfer" => Ok(Src20Op::Transfer {
            tick,
            amt: amount_field(object, "amt")?,
        }),
        other => Err(Src20FormatError::UnsupportedOp(other.to_string())),
    }
}
