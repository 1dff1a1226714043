//! Core data model types: raw messages, summaries, body parts and selection predicates.

pub mod message;
pub mod part;
pub mod predicate;
