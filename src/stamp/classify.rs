//! Payload classification
//!
//! Turns recovered payload bytes into a typed classification: a protocol
//! operation (SRC-20 / SRC-101), base64-encoded file content, or an
//! unknown blob. Classification never fails; undecodable payloads come
//! back as cursed unknowns so they still get recorded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::config;

/// What kind of artifact a payload is
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ident {
    /// Base64-encoded file content
    Stamp,
    /// SRC-20 fungible-token operation
    Src20,
    /// SRC-101 registry operation
    Src101,
    /// Recorded but carries no recognized content
    Unknown,
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Ident::Stamp => "STAMP",
            Ident::Src20 => "SRC-20",
            Ident::Src101 => "SRC-101",
            Ident::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Result of classifying one payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub ident: Ident,
    /// Decoded content bytes (base64-decoded for STAMP, raw otherwise)
    pub content: Vec<u8>,
    pub mimetype: Option<String>,
    pub file_suffix: Option<String>,
    /// Whether the payload parsed as JSON or decoded as base64
    pub valid_payload: bool,
    /// Content-level curse: unrecognized format, disallowed suffix, or a
    /// protocol op without structural eligibility
    pub cursed: bool,
}

/// Classify a recovered payload
///
/// `eligible` is the structural eligibility signal from the decoder
/// (keyburn output or witness-script recovery).
pub fn classify(payload: &[u8], eligible: bool) -> Classification {
    let text = String::from_utf8_lossy(payload);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    if let Some(ident) = json_protocol(trimmed) {
        let protocol = matches!(ident, Ident::Src20 | Ident::Src101);
        return Classification {
            ident,
            content: payload.to_vec(),
            mimetype: Some("application/json".to_string()),
            file_suffix: Some("json".to_string()),
            valid_payload: true,
            // A protocol op without eligibility is recorded but never
            // reaches the engine; plain JSON is never a stamp
            cursed: !protocol || !eligible,
        };
    }

    if let Some(content) = decode_base64_content(trimmed) {
        let suffix = sniff_suffix(&content);
        let mimetype = suffix.and_then(config::mimetype_for_suffix);
        // The disallowed table holds mime subtypes ("plain", not "txt")
        let cursed = match mimetype {
            Some(m) => {
                let subtype = m.rsplit('/').next().unwrap_or(m);
                config::INVALID_STAMP_SUFFIXES.contains(&subtype)
            }
            None => true,
        };
        return Classification {
            ident: Ident::Stamp,
            content,
            mimetype: mimetype.map(str::to_string),
            file_suffix: suffix.map(str::to_string),
            valid_payload: true,
            cursed,
        };
    }

    Classification {
        ident: Ident::Unknown,
        content: payload.to_vec(),
        mimetype: None,
        file_suffix: None,
        valid_payload: false,
        cursed: true,
    }
}

/// Detect a JSON protocol envelope via its `p` field (case-insensitive)
fn json_protocol(text: &str) -> Option<Ident> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    let protocol = object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("p"))
        .and_then(|(_, v)| v.as_str());
    match protocol {
        Some(p) if p.eq_ignore_ascii_case("src-20") => Some(Ident::Src20),
        Some(p) if p.eq_ignore_ascii_case("src-101") => Some(Ident::Src101),
        _ => Some(Ident::Unknown),
    }
}

/// Decode base64 text, tolerating stripped padding and embedded whitespace
fn decode_base64_content(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    if let Ok(bytes) = BASE64.decode(&compact) {
        return Some(bytes);
    }
    let mut padded = compact;
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    BASE64.decode(&padded).ok()
}

/// Identify content by magic bytes, falling back to text sniffing
pub fn sniff_suffix(content: &[u8]) -> Option<&'static str> {
    if content.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("png");
    }
    if content.starts_with(b"GIF87a") || content.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if content.starts_with(b"\xff\xd8\xff") {
        return Some("jpg");
    }
    if content.len() >= 12 && content.starts_with(b"RIFF") && &content[8..12] == b"WEBP" {
        return Some("webp");
    }
    if content.starts_with(b"BM") {
        return Some("bmp");
    }
    if content.starts_with(b"II*\x00") || content.starts_with(b"MM\x00*") {
        return Some("tif");
    }
    if content.starts_with(b"\x00\x00\x01\x00") {
        return Some("ico");
    }
    if content.len() >= 12 && &content[4..8] == b"ftyp" {
        return match &content[8..12] {
            b"avif" | b"avis" => Some("avif"),
            b"heic" | b"heix" => Some("heic"),
            b"mif1" | b"msf1" => Some("heif"),
            _ => None,
        };
    }
    if content.starts_with(b"\x1f\x8b") {
        return Some("gz");
    }

    let text = std::str::from_utf8(content).ok()?;
    let lower = text.trim_start().to_ascii_lowercase();
    if lower.starts_with("<svg") || (lower.starts_with("<?xml") && lower.contains("<svg")) {
        return Some("svg");
    }
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some("html");
    }
    if serde_json::from_str::<serde_json::Value>(text).is_ok() {
        return Some("json");
    }
    Some("txt")
}

/// Collapse mimetype-derived suffix aliases to canonical forms
pub fn normalize_suffix(suffix: &str) -> &str {
    match suffix {
        "svg+xml" => "svg",
        "plain" => "txt",
        "xhtml+xml" => "html",
        "jpeg" => "jpg",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48,
        0x44, 0x52,
    ];

    #[test]
    fn test_src20_json_payload() {
        let payload = br#"{"p":"src-20","op":"mint","tick":"test","amt":"1"}"#;
        let c = classify(payload, true);
        assert_eq!(c.ident, Ident::Src20);
        assert!(!c.cursed);
        assert_eq!(c.file_suffix.as_deref(), Some("json"));
    }

    #[test]
    fn test_src20_case_insensitive_protocol_field() {
        let payload = br#"{"P":"SRC-20","op":"mint","tick":"test","amt":"1"}"#;
        assert_eq!(classify(payload, true).ident, Ident::Src20);
    }

    #[test]
    fn test_src20_without_eligibility_is_cursed() {
        let payload = br#"{"p":"src-20","op":"mint","tick":"test","amt":"1"}"#;
        let c = classify(payload, false);
        assert_eq!(c.ident, Ident::Src20);
        assert!(c.cursed);
    }

    #[test]
    fn test_src101_json_payload() {
        let payload = br#"{"p":"src-101","op":"mint","tokenid":"YWxpY2U="}"#;
        assert_eq!(classify(payload, true).ident, Ident::Src101);
    }

    #[test]
    fn test_plain_json_is_cursed_unknown() {
        let c = classify(br#"{"hello":"world"}"#, true);
        assert_eq!(c.ident, Ident::Unknown);
        assert!(c.cursed);
    }

    #[test]
    fn test_base64_png_stamp() {
        let encoded = BASE64.encode(PNG_1X1);
        let c = classify(encoded.as_bytes(), false);
        assert_eq!(c.ident, Ident::Stamp);
        assert!(!c.cursed);
        assert_eq!(c.file_suffix.as_deref(), Some("png"));
        assert_eq!(c.mimetype.as_deref(), Some("image/png"));
        assert_eq!(c.content, PNG_1X1);
    }

    #[test]
    fn test_base64_with_stripped_padding() {
        let mut encoded = BASE64.encode(PNG_1X1);
        while encoded.ends_with('=') {
            encoded.pop();
        }
        let c = classify(encoded.as_bytes(), false);
        assert_eq!(c.file_suffix.as_deref(), Some("png"));
    }

    #[test]
    fn test_base64_plain_text_is_cursed() {
        let encoded = BASE64.encode(b"just some words");
        let c = classify(encoded.as_bytes(), false);
        assert_eq!(c.ident, Ident::Stamp);
        assert_eq!(c.file_suffix.as_deref(), Some("txt"));
        assert!(c.cursed);
    }

    #[test]
    fn test_undecodable_payload_is_cursed_unknown() {
        let c = classify(b"!!! not base64 !!!", false);
        assert_eq!(c.ident, Ident::Unknown);
        assert!(c.cursed);
        assert!(!c.valid_payload);
    }

    #[test]
    fn test_sniff_svg_and_html() {
        assert_eq!(sniff_suffix(b"<svg xmlns='x'></svg>"), Some("svg"));
        assert_eq!(sniff_suffix(b"<!DOCTYPE html><html></html>"), Some("html"));
    }

    #[test]
    fn test_suffix_normalization() {
        assert_eq!(normalize_suffix("svg+xml"), "svg");
        assert_eq!(normalize_suffix("plain"), "txt");
        assert_eq!(normalize_suffix("png"), "png");
    }
}
