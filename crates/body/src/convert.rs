//! String and byte encodings used by body conversions.
//!
//! Streams and byte buffers decode and encode text as UTF-8. Raw byte views
//! are different: text becomes one 16-bit code unit per UTF-16 unit, and raw
//! bytes read back as text map each byte to one char.

use bytes::{Bytes, BytesMut};

/// Decodes UTF-8, replacing invalid sequences
pub(crate) fn utf8_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Encodes text as native-endian UTF-16 code units
pub(crate) fn utf16_units(text: &str) -> Bytes {
    let mut bytes = BytesMut::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_ne_bytes());
    }
    bytes.freeze()
}

/// Maps every byte to the char with the same code point
pub(crate) fn byte_chars(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}
