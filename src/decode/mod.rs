//! Output-script parsing and payload recovery

pub mod extract;
pub mod script;

pub use extract::{decode_transaction, DecodeError, DecodedPayload, EncodingScheme};
pub use script::{decode_address, parse_script, ScriptError, ScriptItem};
