//! Conversion between Unicode and the legacy Shift_JIS encoding used for names and text.
//!
//! Decoding never fails and never loses bytes: a byte which does not start a character that encodes
//! back to exactly the same bytes is kept as an escape character in `U+F780..=U+F7FF`. Encoding
//! turns those escapes back into their byte, so `encode(&decode(b))` always yields `b`.

use encoding_rs::SHIFT_JIS;

use crate::error::{Error, Result};

const ESCAPE_BASE: u32 = 0xF700;

fn escape(byte: u8) -> char {
    char::from_u32(ESCAPE_BASE + byte as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn unescape(c: char) -> Option<u8> {
    match c as u32 {
        v @ 0xF780..=0xF7FF => Some((v - ESCAPE_BASE) as u8),
        _ => None,
    }
}

/// Decode `chunk` as a single character which encodes back to the same bytes
fn decode_exact(chunk: &[u8]) -> Option<char> {
    let decoded = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(chunk)?;
    let mut chars = decoded.chars();
    let c = chars.next()?;
    if chars.next().is_some() || unescape(c).is_some() {
        return None;
    }

    let mut buffer = [0u8; 4];
    let (encoded, _, had_errors) = SHIFT_JIS.encode(c.encode_utf8(&mut buffer));
    (!had_errors && encoded.as_ref() == chunk).then_some(c)
}

/// Decode legacy encoded bytes, escaping bytes without an exact mapping
pub fn decode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b < 0x80 {
            out.push(b as char);
            i += 1;
            continue;
        }

        match (1..=2).find_map(|len| {
            data.get(i..i + len)
                .and_then(decode_exact)
                .map(|c| (c, len))
        }) {
            Some((c, len)) => {
                out.push(c);
                i += len;
            }
            None => {
                out.push(escape(b));
                i += 1;
            }
        }
    }
    out
}

/// Encode text into the legacy encoding, failing on characters it cannot represent
pub fn encode(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut buffer = [0u8; 4];
    for c in text.chars() {
        if let Some(b) = unescape(c) {
            out.push(b);
        } else if c.is_ascii() {
            out.push(c as u8);
        } else {
            let (encoded, _, had_errors) = SHIFT_JIS.encode(c.encode_utf8(&mut buffer));
            if had_errors {
                return Err(Error::Encoding(format!(
                    "{c} in {text} cannot be represented in Shift_JIS"
                )));
            }
            out.extend_from_slice(&encoded);
        }
    }
    Ok(out)
}
