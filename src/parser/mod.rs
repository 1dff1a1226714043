//! Email parsing: header decoding, transfer/charset codecs, and MIME part extraction.

pub mod codec;
pub mod header;
pub mod mime;
