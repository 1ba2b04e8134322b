//! Reversible mapping between raw bytes and printable code points.
//!
//! Vocabulary and merges files store every token through the GPT-2
//! byte-to-unicode table: printable Latin-1 bytes map to themselves and the
//! remaining 68 bytes are shifted into `U+0100..`, so any byte string survives a
//! round trip through JSON or whitespace-separated text.

use std::collections::HashMap;
use std::sync::OnceLock;

fn byte_level_tables() -> &'static ([char; 256], HashMap<char, u8>) {
    static TABLES: OnceLock<([char; 256], HashMap<char, u8>)> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut forward = ['\0'; 256];
        let mut reverse = HashMap::with_capacity(256);
        let mut shifted = 0u32;
        for byte in 0u8..=255 {
            let printable = matches!(byte, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF);
            let codepoint = if printable {
                u32::from(byte)
            } else {
                shifted += 1;
                255 + shifted
            };
            // Both ranges are valid scalar values, so the fallback is never taken.
            let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
            forward[byte as usize] = ch;
            reverse.insert(ch, byte);
        }
        (forward, reverse)
    })
}

/// Converts raw bytes into their printable byte-level representation.
#[must_use]
pub fn bytes_to_unicode(bytes: &[u8]) -> String {
    let (forward, _) = byte_level_tables();
    bytes.iter().map(|&b| forward[b as usize]).collect()
}

/// Converts a byte-level string produced by [`bytes_to_unicode`] back to raw bytes.
///
/// Returns the first code point outside the byte-level alphabet as the error.
pub fn unicode_to_bytes(text: &str) -> Result<Vec<u8>, char> {
    let (_, reverse) = byte_level_tables();
    text.chars()
        .map(|c| reverse.get(&c).copied().ok_or(c))
        .collect()
}
