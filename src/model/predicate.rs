//! Selection predicates: which messages a retrieval call returns.

use chrono::NaiveDate;

use crate::error::{MailError, Result};

/// Exactly one predicate governs a retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPredicate {
    /// The newest `n` messages, newest first.
    LatestN(usize),

    /// Messages that arrived on `day`. When `keywords` is non-empty, only
    /// subjects containing at least one of them (case-insensitive) match.
    DateAndKeyword {
        day: NaiveDate,
        keywords: Vec<String>,
    },

    /// Messages whose subject contains the keyword (case-insensitive).
    SubjectSearch(String),
}

impl SelectionPredicate {
    /// Build a date predicate from user input.
    ///
    /// The day must be `YYYY-MM-DD`. Blank keywords are dropped, so no
    /// keywords at all means "any subject".
    pub fn date_and_keywords<I, K>(day: &str, keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let day = parse_day(day)?;
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Ok(Self::DateAndKeyword { day, keywords })
    }
}

/// Case-insensitive any-match of `keywords` in `subject`. No keywords match everything.
pub fn subject_matches_any(subject: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let subject = subject.to_lowercase();
    keywords
        .iter()
        .any(|k| subject.contains(&k.to_lowercase()))
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| MailError::InvalidDate(input.trim().to_string()))
}
