//! Output sinks: attachment files, JSON export, and console summaries.

pub mod attachment;
pub mod json;
pub mod text;
