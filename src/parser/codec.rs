//! Transfer-encoding and charset decoding shared by header and body parsing.
//!
//! Every function here is lenient: malformed input degrades to replacement
//! characters or passthrough bytes instead of an error.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::warn;

/// Standard alphabet that accepts missing padding and stray trailing bits,
/// both common in real-world mail.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64, ignoring embedded whitespace and line breaks.
///
/// Returns `None` if the input contains characters outside the alphabet.
pub fn decode_base64(input: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(compact).ok()
}

/// Decode a quoted-printable body (RFC 2045 §6.7).
///
/// Soft line breaks (`=` at end of line) are removed; `=XX` becomes a byte.
/// An `=` not followed by two hex digits is kept literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            result.push(input[i]);
            i += 1;
            continue;
        }
        match (input.get(i + 1), input.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => match (hex_val(hi), hex_val(lo)) {
                (Some(h), Some(l)) => {
                    result.push((h << 4) | l);
                    i += 3;
                }
                _ => {
                    result.push(b'=');
                    i += 1;
                }
            },
            _ => {
                result.push(b'=');
                i += 1;
            }
        }
    }
    result
}

/// Decode RFC 2047 Q-encoding: underscores → spaces, `=XX` → byte.
pub fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(h), Some(l)) => {
                        result.push((h << 4) | l);
                        i += 3;
                    }
                    _ => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode bytes using a named charset, defaulting to UTF-8.
///
/// Invalid sequences become U+FFFD. Unknown charsets fall back to UTF-8.
pub fn decode_charset(charset: Option<&str>, bytes: &[u8]) -> String {
    let Some(charset) = charset.map(str::trim).filter(|c| !c.is_empty()) else {
        return String::from_utf8_lossy(bytes).into_owned();
    };
    match charset.to_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _) = encoding.decode_without_bom_handling(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}
