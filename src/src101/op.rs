//! SRC-101 operation parsing
//!
//! Registry operations are scoped to a deploy: MINT / TRANSFER / RENEW
//! name the deploy transaction hash in their `hash` field. Token ids are
//! base64 text and stay opaque; the registry never interprets them
//! beyond checking they decode.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Src101FormatError {
    #[error("payload is not a JSON object")]
    NotJson,
    #[error("protocol tag is not src-101")]
    WrongProtocol,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("unsupported operation {0:?}")]
    UnsupportedOp(String),
    #[error("field {0} is not an unsigned integer")]
    BadNumber(&'static str),
    #[error("tokenid is not valid base64")]
    BadTokenId,
}

/// A format-valid SRC-101 operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Src101Op {
    Deploy {
        root: String,
        /// Collection size cap; recorded, not enforced per entry
        lim: u64,
        /// Price per registration period, in satoshis
        pri: u64,
        mintstart: u64,
        /// Open-ended when the payload says 0
        mintend: u64,
        /// Payment addresses accepted for mints; empty means unrestricted
        rec: Vec<String>,
        /// Default registration duration in periods
        dua: u64,
    },
    Mint {
        deploy_hash: String,
        tokenid: String,
        toaddress: String,
        dua: u64,
        /// Opaque blob attached to the registration
        data: Option<String>,
    },
    Transfer {
        deploy_hash: String,
        tokenid: String,
        toaddress: String,
    },
    Renew {
        deploy_hash: String,
        tokenid: String,
        dua: u64,
    },
}

impl Src101Op {
    pub fn op_name(&self) -> &'static str {
        match self {
            Src101Op::Deploy { .. } => "DEPLOY",
            Src101Op::Mint { .. } => "MINT",
            Src101Op::Transfer { .. } => "TRANSFER",
            Src101Op::Renew { .. } => "RENEW",
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

fn string_field(
    object: &serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<String, Src101FormatError> {
    field(object, name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(Src101FormatError::MissingField(name))
}

/// Accept numeric fields as either JSON numbers or digit strings
fn u64_field(
    object: &serde_json::Map<String, serde_json::Value>,
    name: &'static str,
) -> Result<u64, Src101FormatError> {
    let value = field(object, name).ok_or(Src101FormatError::MissingField(name))?;
    match value {
        serde_json::Value::Number(n) => n.as_u64().ok_or(Src101FormatError::BadNumber(name)),
        serde_json::Value::String(s) => {
            s.trim().parse().map_err(|_| Src101FormatError::BadNumber(name))
        }
        _ => Err(Src101FormatError::BadNumber(name)),
    }
}

fn tokenid_field(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, Src101FormatError> {
    let raw = string_field(object, "tokenid")?;
    match BASE64.decode(&raw) {
        Ok(decoded) if !decoded.is_empty() => Ok(raw),
        _ => Err(Src101FormatError::BadTokenId),
    }
}

/// Parse an SRC-101 payload into a typed operation
pub fn parse_src101(payload: &[u8]) -> Result<Src101Op, Src101FormatError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|_| Src101FormatError::NotJson)?;
    let object = value.as_object().ok_or(Src101FormatError::NotJson)?;

    let protocol = field(object, "p")
        .and_then(|v| v.as_str())
        .ok_or(Src101FormatError::WrongProtocol)?;
    if !protocol.eq_ignore_ascii_case("src-101") {
        return Err(Src101FormatError::WrongProtocol);
    }

    let op = field(object, "op")
        .and_then(|v| v.as_str())
        .ok_or(Src101FormatError::MissingField("op"))?;

    match op.to_lowercase().as_str() {
        "deploy" => {
            let rec = match field(object, "rec") {
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect(),
                Some(serde_json::Value::String(s)) => vec![s.clone()],
                _ => Vec::new(),
            };
            let mintend = match u64_field(object, "mintend")? {
                0 => u64::MAX,
                t => t,
            };
            Ok(Src101Op::Deploy {
                root: string_field(object, "root")?,
                lim: u64_field(object, "lim")?,
                pri: u64_field(object, "pri")?,
                mintstart: u64_field(object, "mintstart")?,
                mintend,
                rec,
                dua: u64_field(object, "dua")?,
            })
        }
        "mint" => Ok(Src101Op::Mint {
            deploy_hash: string_field(object, "hash")?,
            tokenid: tokenid_field(object)?,
            toaddress: string_field(object, "toaddress")?,
            dua: u64_field(object, "dua")?,
            data: field(object, "data")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }),
        "transfer" => Ok(Src101Op::Transfer {
            deploy_hash: string_field(object, "hash")?,
            tokenid: tokenid_field(object)?,
            toaddress: string_field(object, "toaddress")?,
        }),
        "renew" => Ok(Src101Op::Renew {
            deploy_hash: string_field(object, "hash")?,
            tokenid: tokenid_field(object)?,
            dua: u64_field(object, "dua")?,
        }),
        other => Err(Src101FormatError::UnsupportedOp(other.to_string())),
    }
}
