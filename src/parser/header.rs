//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), and date parsing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::model::message::{MessageSummary, RawMessage};
use crate::parser::codec::{decode_base64, decode_charset, decode_q_encoding};

/// Build a [`MessageSummary`] from a fetched message.
///
/// Arrival time comes from the server metadata; when the server sent none,
/// the `Date:` header is used instead.
pub fn summarize(raw: &RawMessage) -> MessageSummary {
    let (header_block, _) = split_header_block(&raw.data);
    let headers = parse_headers(header_block);

    let subject = decode_header(&get_header(&headers, "subject").unwrap_or_default());
    let sender = decode_header(&get_header(&headers, "from").unwrap_or_default());

    let arrival = raw.arrival.or_else(|| {
        get_header(&headers, "date")
            .and_then(|d| parse_date(&d))
            .map(|d| d.fixed_offset())
    });

    MessageSummary {
        subject,
        sender,
        arrival,
        sequence: Some(raw.sequence),
    }
}

/// Split a message into its header block and body at the first blank line.
///
/// A message without a blank line is all headers.
pub fn split_header_block(data: &[u8]) -> (&[u8], &[u8]) {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return (&data[..i], &data[i + 2..]);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return (&data[..i], &data[i + 4..]);
        }
    }
    (data, &[])
}

/// Decode a raw header block into unfolded `(lowercase_name, raw_value)` pairs.
pub fn parse_headers(raw_headers: &[u8]) -> Vec<(String, String)> {
    unfold_headers(&decode_header_bytes(raw_headers))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF_u8, 0xBB, 0xBF][..]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (`name` must be lowercase).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value into plain text.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Text without encoded-words is returned unchanged; an empty value yields an
/// empty string. Bytes are interpreted with the word's charset (UTF-8 when
/// unknown) and invalid sequences become U+FFFD. A malformed word is kept
/// as-is.
pub fn decode_header(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is not part of the text (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &after_start[decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed after the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    // RFC 2231 language suffix: "UTF-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    if encoded_text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text.as_bytes())?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(Some(charset), &bytes),
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, RFC 3339 and IMAP `INTERNALDATE` (`18-Aug-2025 10:00:00 +0000`).
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim().trim_matches('"');
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Dropping a trailing "(UTC)" comment makes many RFC 2822 variants parse
    let no_comment = match trimmed.find(" (") {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    if let Ok(dt) = DateTime::parse_from_rfc2822(no_comment) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%d-%b-%Y %H:%M:%S %z",
        "%e-%b-%Y %H:%M:%S %z",
        "%d-%b-%Y %H:%M:%S",
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];

    let candidate = normalize_month_case(no_comment);
    for fmt in &formats {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Title-case an all-caps month name (`16-JUL-2025` → `16-Jul-2025`).
///
/// chrono's `%b` only accepts title-case month abbreviations.
fn normalize_month_case(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    for month in MONTHS {
        if let Some(pos) = s.find(month) {
            let mut out = s.to_string();
            out.replace_range(pos + 1..pos + 3, &month[1..].to_lowercase());
            debug!(from = s, to = %out, "Normalized month case");
            return out;
        }
    }
    s.to_string()
}
