//! Message selection: which messages a retrieval call returns, in what order.
//!
//! - [`imap`]: walk an IMAP folder by sequence number
//! - [`api`]: page through the HTTP mail API with throttling backoff

pub mod api;
pub mod imap;

pub use self::api::{fetch_messages, FetchOptions, FilterSpec, RetryPolicy};
pub use self::imap::{
    select_by_count, select_by_date_and_keyword, select_by_subject, SelectionStats,
};
