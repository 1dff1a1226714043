//! `mailgrab`: pull messages from an IMAP folder or the Microsoft Graph
//! mail API, select them by count, day or subject, print their text and
//! save their attachments.
//!
//! The engine works against two narrow transport traits
//! ([`transport::MailboxSession`], [`transport::ApiTransport`]); the
//! [`auth`] module opens real sessions for them.

pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod retrieve;
pub mod select;
pub mod transport;
