//! Shared test fixtures: transactions built the way wallets actually
//! encode stamp payloads, so decoder tests exercise the real framing.

use crate::backend::{Transaction, TxIn, TxOut};
use crate::codec::obfuscate;
use crate::config;
use crate::decode::script::{p2pkh_script, OP_1, OP_CHECKMULTISIG};

/// Prevout hash (display order) used as the ARC4 key by fixture builders
pub const PREV_TX_HASH: &str =
    "75e91a60c0e0d3eb9fe2b0e0c0a4f8d0b2396305f03dc026e29ea9a7fe69e20d";

/// A plausible compressed pubkey that is not in [`config::BURNKEYS`]
pub const NON_BURN_THIRD_KEY: &str =
    "031111111111111111111111111111111111111111111111111111111111111111";

fn push33(script: &mut Vec<u8>, key: &[u8]) {
    script.push(33);
    script.extend_from_slice(key);
}

/// Wrap 31 data bytes into a plausible 33-byte pubkey
fn wrap_pubkey(data31: &[u8]) -> Vec<u8> {
    let mut pk = Vec::with_capacity(33);
    pk.push(0x02);
    pk.extend_from_slice(data31);
    pk.push(0x01);
    pk
}

/// Build a transaction carrying `payload` in bare multisig outputs,
/// ARC4-obfuscated against [`PREV_TX_HASH`]
pub fn multisig_stamp_tx(seed: &str, payload: &[u8], keyburn: bool) -> Transaction {
    let mut framed = Vec::new();
    let body_len = config::STAMP_PREFIX.len() + payload.len();
    framed.extend_from_slice(&(body_len as u16).to_be_bytes());
    framed.extend_from_slice(config::STAMP_PREFIX);
    framed.extend_from_slice(payload);
    // Two data pubkeys per output, 31 usable bytes each
    while framed.len() % 62 != 0 {
        framed.push(0);
    }

    let key = hex::decode(PREV_TX_HASH).unwrap();
    let obfuscated = obfuscate(&key, &framed).unwrap();

    let third_key = if keyburn {
        hex::decode(config::BURNKEYS[0]).unwrap()
    } else {
        hex::decode(NON_BURN_THIRD_KEY).unwrap()
    };

    let mut outputs = vec![TxOut {
        value: 546,
        script_pubkey: p2pkh_script(&[9u8; 20]),
    }];
    for pair in obfuscated.chunks(62) {
        let mut script = vec![OP_1];
        push33(&mut script, &wrap_pubkey(&pair[..31]));
        push33(&mut script, &wrap_pubkey(&pair[31..]));
        push33(&mut script, &third_key);
        script.push(OP_1 + 2); // OP_3
        script.push(OP_CHECKMULTISIG);
        outputs.push(TxOut {
            value: 7800,
            script_pubkey: script,
        });
    }

    Transaction {
        tx_hash: seed.repeat(32),
        inputs: vec![TxIn {
            prev_tx_hash: PREV_TX_HASH.to_string(),
            prev_vout: 0,
        }],
        outputs,
    }
}
