//! Leaf MIME parts of a message.

/// One leaf part of a message body, transfer-decoded.
///
/// A message decomposes into an ordered `Vec<BodyPart>` following its MIME
/// structure. A non-multipart message yields exactly one part.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart {
    /// Lowercased `type/subtype` (defaults to `text/plain`).
    pub content_type: String,

    /// `true` when the disposition says `attachment` or a filename is present.
    pub is_attachment: bool,

    /// Filename from `Content-Disposition` or the `name` parameter.
    pub filename: Option<String>,

    /// Declared charset, if any.
    pub charset: Option<String>,

    /// Payload after undoing the transfer encoding.
    pub data: Vec<u8>,

    /// The transfer encoding could not be undone; `data` holds the raw bytes.
    pub decode_failed: bool,
}

impl BodyPart {
    /// Inline plain text (not an attachment).
    pub fn is_inline_text(&self) -> bool {
        !self.is_attachment && self.content_type == "text/plain"
    }

    /// Inline HTML (not an attachment).
    pub fn is_inline_html(&self) -> bool {
        !self.is_attachment && self.content_type == "text/html"
    }

    /// Filename usable for writing: non-empty after trimming.
    pub fn usable_filename(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}
