//! Mailbox transports: the narrow fetch primitives the selectors are written against.
//!
//! The engine only borrows a transport for the duration of one retrieval.
//! Opening, authenticating and closing it is the caller's business.

pub mod graph;
pub mod imap;

use std::time::Duration;

use chrono::{DateTime, FixedOffset};

use crate::error::Result;
use crate::model::message::RawMessage;

/// Sequential, sequence-number addressed access to one selected folder.
pub trait MailboxSession {
    /// Number of messages in the folder. Sequence numbers run `1..=count`.
    fn message_count(&mut self) -> Result<u32>;

    /// Arrival metadata only, without downloading the message.
    ///
    /// `Ok(None)` means the server answered but sent no usable arrival time.
    fn fetch_arrival(&mut self, sequence: u32) -> Result<Option<DateTime<FixedOffset>>>;

    /// Full message content plus arrival metadata.
    fn fetch_message(&mut self, sequence: u32) -> Result<RawMessage>;
}

/// One GET against the mail API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    /// Query parameters; empty for continuation links, which carry their own.
    pub query: Vec<(String, String)>,
    /// Extra request headers (authorization is the transport's concern).
    pub headers: Vec<(String, String)>,
}

impl PageRequest {
    /// Request for a server-supplied continuation link, keeping the headers.
    pub fn continuation(&self, next_link: String) -> Self {
        Self {
            url: next_link,
            query: Vec::new(),
            headers: self.headers.clone(),
        }
    }
}

/// Status, throttling hint and body of one API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, in seconds form.
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Authenticated page access to the mail API.
pub trait ApiTransport {
    fn get(&mut self, request: &PageRequest) -> Result<PageResponse>;
}
