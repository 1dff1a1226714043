//! MIME body handling: leaf-part decomposition, inline text extraction,
//! attachment persistence, and HTML-to-text conversion.

use std::path::PathBuf;

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::export::attachment::AttachmentWriter;
use crate::model::part::BodyPart;
use crate::parser::codec::{decode_base64, decode_charset, decode_quoted_printable};
use crate::parser::header::split_header_block;

/// Maximum nesting of `message/rfc822` parts we descend into
/// (to prevent runaway recursion on adversarial input).
const MAX_DEPTH: usize = 10;

/// Result of running a message through the part extractor.
#[derive(Debug, Default, Clone)]
pub struct Extraction {
    /// Inline text chunks in traversal order.
    pub inline_text: Vec<String>,
    /// Attachment files written, in traversal order.
    pub attachments: Vec<PathBuf>,
    /// Attachments that could not be written.
    pub failed_attachments: usize,
    /// Leaf parts visited.
    pub parts_visited: usize,
}

/// Walk every leaf part of a message, collect its inline text, and write its
/// attachments under the folder derived from `subject`.
///
/// Decoding problems never abort the walk: broken payloads are written or
/// shown as-is with replacement characters. Attachment write failures are
/// logged and counted per file.
pub fn extract_parts(raw_message: &[u8], subject: &str, writer: &AttachmentWriter) -> Extraction {
    let parts = split_parts(raw_message);
    let mut extraction = Extraction::default();
    let mut html_fallback: Option<String> = None;

    for part in &parts {
        extraction.parts_visited += 1;

        if part.decode_failed {
            warn!(
                content_type = %part.content_type,
                filename = ?part.filename,
                "Could not undo transfer encoding, using raw bytes"
            );
        }

        if part.is_attachment {
            let Some(filename) = part.usable_filename() else {
                debug!(content_type = %part.content_type, "Attachment without filename, skipped");
                continue;
            };
            match writer.write(subject, filename, &part.data) {
                Ok(path) => extraction.attachments.push(path),
                Err(e) => {
                    warn!(filename = filename, error = %e, "Failed to save attachment");
                    extraction.failed_attachments += 1;
                }
            }
        } else if part.is_inline_text() {
            let text = decode_charset(part.charset.as_deref(), &part.data);
            if !text.trim().is_empty() {
                extraction.inline_text.push(text);
            }
        } else if part.is_inline_html() && html_fallback.is_none() {
            let html = decode_charset(part.charset.as_deref(), &part.data);
            html_fallback = Some(html_to_text(&html));
        }
    }

    if extraction.inline_text.is_empty() {
        if let Some(text) = html_fallback.filter(|t| !t.is_empty()) {
            extraction.inline_text.push(text);
        }
    }

    extraction
}

/// Decompose a raw message into its leaf parts, in MIME structural order.
///
/// A non-multipart message yields exactly one part. Embedded messages are
/// descended into unless they are themselves marked as attachments.
pub fn split_parts(raw_message: &[u8]) -> Vec<BodyPart> {
    let mut parts = Vec::new();
    collect_leaves(raw_message, 0, &mut parts);
    parts
}

fn collect_leaves(raw_message: &[u8], depth: usize, out: &mut Vec<BodyPart>) {
    let Some(message) = MessageParser::default().parse(raw_message) else {
        out.push(fallback_part(raw_message));
        return;
    };

    for part in &message.parts {
        match &part.body {
            PartType::Multipart(_) => {}
            PartType::Message(nested) if !is_marked_attachment(part) => {
                if depth + 1 >= MAX_DEPTH {
                    warn!(depth, "Embedded message nesting too deep, skipped");
                    continue;
                }
                let root = nested.root_part();
                let start = root.raw_header_offset() as usize;
                let end = root.raw_end_offset() as usize;
                let bytes = nested.raw_message.get(start..end).unwrap_or_default();
                collect_leaves(bytes, depth + 1, out);
            }
            _ => out.push(leaf_part(raw_message, part)),
        }
    }
}

/// Convert one leaf into a [`BodyPart`].
///
/// Binary payloads come straight from `mail-parser`. Text payloads are
/// re-read from the raw message so their original charset bytes survive
/// (they are decoded for display later, and written verbatim when saved).
fn leaf_part(raw_message: &[u8], part: &MessagePart<'_>) -> BodyPart {
    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.to_lowercase())
        .unwrap_or_else(|| "text/plain".to_string());

    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(String::from);

    let filename = part
        .attachment_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    let is_attachment = is_marked_attachment(part) || filename.is_some();

    let (data, decode_failed) = match &part.body {
        PartType::Text(_) | PartType::Html(_) => {
            let start = part.raw_body_offset() as usize;
            let end = (part.raw_end_offset() as usize).min(raw_message.len());
            let encoded = raw_message.get(start..end).unwrap_or_default();
            undo_transfer_encoding(part.content_transfer_encoding(), encoded)
        }
        _ => (part.contents().to_vec(), part.is_encoding_problem),
    };

    BodyPart {
        content_type,
        is_attachment,
        filename,
        charset,
        data,
        decode_failed,
    }
}

/// Whether the part's disposition says `attachment`.
fn is_marked_attachment(part: &MessagePart<'_>) -> bool {
    part.content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"))
}

/// Undo a Content-Transfer-Encoding. Returns the bytes and whether decoding failed.
fn undo_transfer_encoding(encoding: Option<&str>, encoded: &[u8]) -> (Vec<u8>, bool) {
    match encoding.map(|e| e.trim().to_lowercase()).as_deref() {
        Some("base64") => match decode_base64(encoded) {
            Some(bytes) => (bytes, false),
            None => (encoded.to_vec(), true),
        },
        Some("quoted-printable") => (decode_quoted_printable(encoded), false),
        _ => (encoded.to_vec(), false),
    }
}

/// Fallback when `mail-parser` cannot parse the message: the body as one text part.
fn fallback_part(raw_message: &[u8]) -> BodyPart {
    let (_, body) = split_header_block(raw_message);
    BodyPart {
        content_type: "text/plain".to_string(),
        is_attachment: false,
        filename: None,
        charset: None,
        data: body.to_vec(),
        decode_failed: false,
    }
}

/// Convert HTML to plain text for terminal display.
///
/// - Preserves line breaks from `<br>`, `<p>`, `<div>`
/// - Removes scripts and styles
/// - Decodes common HTML entities
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    for tag in &["br", "BR", "br/", "br /"] {
        text = text.replace(&format!("<{tag}>"), "\n");
    }
    for tag in &["p", "div", "tr", "li", "h1", "h2", "h3"] {
        let upper = tag.to_uppercase();
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{tag} "), "\n<");
        text = text.replace(&format!("<{upper}>"), "\n");
        text = text.replace(&format!("</{tag}>"), "\n");
        text = text.replace(&format!("</{upper}>"), "\n");
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        ("&amp;", "&"),
    ] {
        stripped = stripped.replace(entity, replacement);
    }

    // Collapse runs of blank lines into one
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = remaining.to_ascii_lowercase().find(&open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        match after.to_ascii_lowercase().find(&close) {
            Some(end) => remaining = &after[end + close.len()..],
            None => {
                remaining = "";
                break;
            }
        }
    }
    result.push_str(remaining);
    result
}
