//! Output-script parsing
//!
//! A minimal push-data parser for the locking-script patterns the indexer
//! cares about: bare 1-of-3 multisig (payload carrier), OP_RETURN (plain
//! data carrier), version-0 witness programs (P2WSH payload carrier), and
//! the standard address forms needed to attribute sources and destinations.

use thiserror::Error;

use crate::config;
use crate::crypto::base58check;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Script parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("empty script")]
    Empty,
    #[error("truncated push data at offset {0}")]
    TruncatedPush(usize),
}

/// One parsed script element
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptItem {
    /// OP_0..OP_16 as their numeric value
    Num(u8),
    /// Any other opcode
    Op(u8),
    /// Pushed data bytes
    Data(Vec<u8>),
}

/// Parse a raw script into its element sequence
pub fn parse_script(script: &[u8]) -> Result<Vec<ScriptItem>, ScriptError> {
    if script.is_empty() {
        return Err(ScriptError::Empty);
    }

    let mut items = Vec::new();
    let mut pos = 0usize;
    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;
        match opcode {
            OP_0 => items.push(ScriptItem::Num(0)),
            1..=0x4b => {
                let len = opcode as usize;
                let end = pos + len;
                if end > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 1));
                }
                items.push(ScriptItem::Data(script[pos..end].to_vec()));
                pos = end;
            }
            OP_PUSHDATA1 => {
                if pos >= script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 1));
                }
                let len = script[pos] as usize;
                pos += 1;
                let end = pos + len;
                if end > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 2));
                }
                items.push(ScriptItem::Data(script[pos..end].to_vec()));
                pos = end;
            }
            OP_PUSHDATA2 => {
                if pos + 2 > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 1));
                }
                let len = u16::from_le_bytes([script[pos], script[pos + 1]]) as usize;
                pos += 2;
                let end = pos + len;
                if end > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 3));
                }
                items.push(ScriptItem::Data(script[pos..end].to_vec()));
                pos = end;
            }
            OP_PUSHDATA4 => {
                if pos + 4 > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 1));
                }
                let len = u32::from_le_bytes([
                    script[pos],
                    script[pos + 1],
                    script[pos + 2],
                    script[pos + 3],
                ]) as usize;
                pos += 4;
                let end = pos + len;
                if end > script.len() {
                    return Err(ScriptError::TruncatedPush(pos - 5));
                }
                items.push(ScriptItem::Data(script[pos..end].to_vec()));
                pos = end;
            }
            OP_1..=OP_16 => items.push(ScriptItem::Num(opcode - OP_1 + 1)),
            other => items.push(ScriptItem::Op(other)),
        }
    }
    Ok(items)
}

/// A bare 1-of-3 multisig output carrying two data pubkeys
///
/// The third key slot holds either a real key or a burn key; burn keys mark
/// the transaction as protocol-eligible (keyburn).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigCarrier {
    pub data_pubkeys: [Vec<u8>; 2],
    pub keyburn: bool,
}

/// Match `OP_1 <pk> <pk> <pk> OP_3 OP_CHECKMULTISIG`
pub fn as_multisig_carrier(items: &[ScriptItem]) -> Option<MultisigCarrier> {
    match items {
        [ScriptItem::Num(1), ScriptItem::Data(pk1), ScriptItem::Data(pk2), ScriptItem::Data(pk3), ScriptItem::Num(3), ScriptItem::Op(OP_CHECKMULTISIG)] =>
        {
            let third = hex::encode(pk3);
            Some(MultisigCarrier {
                data_pubkeys: [pk1.clone(), pk2.clone()],
                keyburn: config::BURNKEYS.contains(&third.as_str()),
            })
        }
        _ => None,
    }
}

/// Match an OP_RETURN output and return its first pushed datum
pub fn as_op_return(items: &[ScriptItem]) -> Option<Vec<u8>> {
    match items {
        [ScriptItem::Op(OP_RETURN), rest @ ..] => rest.iter().find_map(|item| match item {
            ScriptItem::Data(d) => Some(d.clone()),
            _ => None,
        }),
        _ => None,
    }
}

/// Match a version-0 32-byte witness program (P2WSH)
pub fn as_p2wsh_program(items: &[ScriptItem]) -> Option<Vec<u8>> {
    match items {
        [ScriptItem::Num(0), ScriptItem::Data(program)] if program.len() == 32 => {
            Some(program.clone())
        }
        _ => None,
    }
}

/// Decode the address a script pays to, if it has a standard form
///
/// P2PKH and P2SH decode to base58check; witness programs have no base58
/// form and are rendered as `wv<version>:<hex>` so they stay unique and
/// stable as ledger keys.
pub fn decode_address(script: &[u8]) -> Option<String> {
    let items = parse_script(script).ok()?;
    match items.as_slice() {
        [ScriptItem::Op(OP_DUP), ScriptItem::Op(OP_HASH160), ScriptItem::Data(h), ScriptItem::Op(OP_EQUALVERIFY), ScriptItem::Op(OP_CHECKSIG)]
            if h.len() == 20 =>
        {
            Some(base58check(0x00, h))
        }
        [ScriptItem::Op(OP_HASH160), ScriptItem::Data(h), ScriptItem::Op(OP_EQUAL)]
            if h.len() == 20 =>
        {
            Some(base58check(0x05, h))
        }
        [ScriptItem::Num(version), ScriptItem::Data(program)]
            if *version <= 16 && (2..=40).contains(&program.len()) =>
        {
            Some(format!("wv{}:{}", version, hex::encode(program)))
        }
        _ => None,
    }
}

/// Build a P2PKH locking script for a 20-byte pubkey hash (test fixtures)
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, 20];
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pushes() {
        let script = [2, 0xAA, 0xBB, OP_RETURN];
        let items = parse_script(&script).unwrap();
        assert_eq!(
            items,
            vec![ScriptItem::Data(vec![0xAA, 0xBB]), ScriptItem::Op(OP_RETURN)]
        );
    }

    #[test]
    fn test_parse_truncated_push() {
        let script = [5, 0xAA];
        assert!(matches!(
            parse_script(&script),
            Err(ScriptError::TruncatedPush(0))
        ));
    }

    #[test]
    fn test_parse_pushdata1() {
        let mut script = vec![OP_PUSHDATA1, 3];
        script.extend_from_slice(&[1, 2, 3]);
        assert_eq!(
            parse_script(&script).unwrap(),
            vec![ScriptItem::Data(vec![1, 2, 3])]
        );
    }

    #[test]
    fn test_multisig_carrier_with_burnkey() {
        let burn = hex::decode(config::BURNKEYS[0]).unwrap();
        let items = vec![
            ScriptItem::Num(1),
            ScriptItem::Data(vec![0x02; 33]),
            ScriptItem::Data(vec![0x03; 33]),
            ScriptItem::Data(burn),
            ScriptItem::Num(3),
            ScriptItem::Op(OP_CHECKMULTISIG),
        ];
        let carrier = as_multisig_carrier(&items).unwrap();
        assert!(carrier.keyburn);
        assert_eq!(carrier.data_pubkeys[0], vec![0x02; 33]);
    }

    #[test]
    fn test_multisig_carrier_without_burnkey() {
        // The third key must not collide with the burn-key table; repeated
        // single bytes do ("0202..02" is a burn key)
        let third = hex::decode(crate::testutil::NON_BURN_THIRD_KEY).unwrap();
        let items = vec![
            ScriptItem::Num(1),
            ScriptItem::Data(vec![0x02; 33]),
            ScriptItem::Data(vec![0x03; 33]),
            ScriptItem::Data(third),
            ScriptItem::Num(3),
            ScriptItem::Op(OP_CHECKMULTISIG),
        ];
        assert!(!as_multisig_carrier(&items).unwrap().keyburn);
    }

    #[test]
    fn test_op_return_data() {
        let mut script = vec![OP_RETURN, 4];
        script.extend_from_slice(b"data");
        let items = parse_script(&script).unwrap();
        assert_eq!(as_op_return(&items).unwrap(), b"data");
    }

    #[test]
    fn test_p2wsh_program() {
        let mut script = vec![OP_0, 32];
        script.extend_from_slice(&[7u8; 32]);
        let items = parse_script(&script).unwrap();
        assert_eq!(as_p2wsh_program(&items).unwrap(), vec![7u8; 32]);

        // 20-byte program is P2WPKH, not a payload carrier
        let mut short = vec![OP_0, 20];
        short.extend_from_slice(&[7u8; 20]);
        assert!(as_p2wsh_program(&parse_script(&short).unwrap()).is_none());
    }

    #[test]
    fn test_decode_p2pkh_address() {
        let script = p2pkh_script(&[0u8; 20]);
        assert_eq!(
            decode_address(&script).unwrap(),
            "1111111111111111111114oLvT2"
        );
    }

    #[test]
    fn test_decode_witness_address_is_stable() {
        let mut script = vec![OP_0, 32];
        script.extend_from_slice(&[9u8; 32]);
        let addr = decode_address(&script).unwrap();
        assert!(addr.starts_with("wv0:"));
        assert_eq!(decode_address(&script).unwrap(), addr);
    }
}
