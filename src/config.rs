//! Protocol constants for the stamp indexer
//!
//! Activation heights and byte-level markers mirror the mainnet protocol;
//! changing any of these is a consensus change for downstream consumers.

/// Marker bytes at the start of every embedded payload.
pub const STAMP_PREFIX: &[u8] = b"stamp:";

/// First block at which stamp transactions are recognized.
pub const GENESIS_BLOCK: u64 = 779_652;

/// Activation height for witness-script (P2WSH) payload embedding.
/// Payloads recovered through this scheme on or after this height are
/// protocol-eligible without a keyburn output.
pub const P2WSH_ACTIVATION_BLOCK: u64 = 833_000;

/// Number of recent heights scanned when checking for a reorganization.
pub const REORG_SCAN_DEPTH: u64 = 100;

/// Seconds per registration period (one year) for SRC-101 expiry math.
pub const SRC101_PERIOD_SECONDS: u64 = 31_536_000;

/// Third-position multisig pubkeys that mark a transaction as a keyburn.
/// These are provably unspendable points; their presence is the structural
/// eligibility signal for SRC-20 / SRC-101 operations.
pub const BURNKEYS: [&str; 5] = [
    "022222222222222222222222222222222222222222222222222222222222222222",
    "033333333333333333333333333333333333333333333333333333333333333333",
    "020202020202020202020202020202020202020202020202020202020202020202",
    "030303030303030303030303030303030303030303030303030303030303030302",
    "030303030303030303030303030303030303030303030303030303030303030303",
];

/// Characters permitted in a normalized SRC-20 tick.
pub const TICK_CHARS: &str =
    "!#$%&()*0123456789<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ^_abcdefghijklmnopqrstuvwxyz~";

/// Maximum tick length in characters.
pub const TICK_MAX_LEN: usize = 5;

/// File suffixes that never qualify an artifact as protocol-eligible.
pub const INVALID_STAMP_SUFFIXES: [&str; 6] = ["plain", "octet-stream", "js", "css", "x-empty", "json"];

/// Map a recovered file suffix to its canonical mimetype.
pub fn mimetype_for_suffix(suffix: &str) -> Option<&'static str> {
    let mime = match suffix {
        "jpg" | "jpeg" | "jfif" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "apng" => "image/apng",
        "gif" => "image/gif",
        "svg" | "svgz" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "heif" => "image/heif",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "html" => "text/html",
        "txt" => "text/plain",
        "json" => "application/json",
        "js" => "application/javascript",
        "css" => "text/css",
        "gz" | "zlib" => "application/gzip",
        _ => return None,
    };
    Some(mime)
}

/// Check every character of a candidate tick against the permitted set.
pub fn is_valid_tick_char(c: char) -> bool {
    TICK_CHARS.contains(c)
}
