//! Selectors over a [`MailboxSession`].
//!
//! All three walk the folder from the highest sequence number downwards, so
//! results come out newest first. Matches are handed to a callback as they
//! are found; returning `false` from it stops the walk.
//!
//! A message that fails to fetch is logged and skipped unless the failure
//! ends the session (see [`MailError::is_fatal`](crate::error::MailError::is_fatal)).

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::message::{RawMessage, SelectedMessage};
use crate::model::predicate::subject_matches_any;
use crate::parser::header::summarize;
use crate::transport::MailboxSession;

/// Counters for one selection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SelectionStats {
    /// Messages in the folder when the pass started.
    pub total: u32,
    /// Sequence numbers looked at.
    pub scanned: u32,
    /// Messages handed to the callback.
    pub matched: u32,
    /// Messages skipped for missing metadata or a failed fetch.
    pub skipped: u32,
}

/// Progress reporter: `(done, total)`.
pub type Progress<'a> = Option<&'a dyn Fn(u32, u32)>;

/// The newest `n` messages, newest first.
///
/// `n` larger than the folder is clamped; `n == 0` selects nothing.
pub fn select_by_count<S: MailboxSession + ?Sized>(
    session: &mut S,
    n: usize,
    on_message: &mut dyn FnMut(SelectedMessage) -> bool,
    progress: Progress<'_>,
) -> Result<SelectionStats> {
    let total = session.message_count()?;
    let wanted = u32::try_from(n).unwrap_or(u32::MAX).min(total);
    let mut stats = SelectionStats {
        total,
        ..SelectionStats::default()
    };
    debug!(total, wanted, "Selecting latest messages");

    let lowest = total - wanted + 1;
    for (done, sequence) in (lowest..=total).rev().enumerate() {
        stats.scanned += 1;
        let keep_going = match fetch_or_skip(session, sequence, None)? {
            Some(raw) => {
                stats.matched += 1;
                on_message(selected(raw))
            }
            None => {
                stats.skipped += 1;
                true
            }
        };
        report(progress, done as u32 + 1, wanted);
        if !keep_going {
            break;
        }
    }

    Ok(stats)
}

/// Messages that arrived on `day` (local calendar). Newest first.
///
/// A non-empty `keywords` keeps only subjects containing at least one of
/// them, case-insensitively.
///
/// Only arrival metadata is fetched for messages on other days. Messages
/// without arrival metadata are skipped.
pub fn select_by_date_and_keyword<S: MailboxSession + ?Sized>(
    session: &mut S,
    day: NaiveDate,
    keywords: &[String],
    on_message: &mut dyn FnMut(SelectedMessage) -> bool,
    progress: Progress<'_>,
) -> Result<SelectionStats> {
    let total = session.message_count()?;
    let mut stats = SelectionStats {
        total,
        ..SelectionStats::default()
    };
    debug!(total, %day, keywords = ?keywords, "Scanning folder by arrival day");

    for (done, sequence) in (1..=total).rev().enumerate() {
        stats.scanned += 1;
        report(progress, done as u32 + 1, total);

        let arrival = match session.fetch_arrival(sequence) {
            Ok(Some(arrival)) => arrival,
            Ok(None) => {
                debug!(sequence, "No arrival metadata, skipping message");
                stats.skipped += 1;
                continue;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(sequence, error = %e, "Arrival fetch failed, skipping message");
                stats.skipped += 1;
                continue;
            }
        };
        if local_day(&arrival) != day {
            continue;
        }

        let Some(raw) = fetch_or_skip(session, sequence, Some(arrival))? else {
            stats.skipped += 1;
            continue;
        };
        let message = selected(raw);
        if !subject_matches_any(&message.summary.subject, keywords) {
            continue;
        }

        stats.matched += 1;
        if !on_message(message) {
            break;
        }
    }

    Ok(stats)
}

/// Messages whose decoded subject contains `keyword`, case-insensitively.
/// Newest first.
pub fn select_by_subject<S: MailboxSession + ?Sized>(
    session: &mut S,
    keyword: &str,
    on_message: &mut dyn FnMut(SelectedMessage) -> bool,
    progress: Progress<'_>,
) -> Result<SelectionStats> {
    let total = session.message_count()?;
    let mut stats = SelectionStats {
        total,
        ..SelectionStats::default()
    };
    debug!(total, keyword, "Scanning folder by subject");

    for (done, sequence) in (1..=total).rev().enumerate() {
        stats.scanned += 1;
        report(progress, done as u32 + 1, total);

        let Some(raw) = fetch_or_skip(session, sequence, None)? else {
            stats.skipped += 1;
            continue;
        };
        let message = selected(raw);
        if !message.summary.subject_contains(keyword) {
            continue;
        }

        stats.matched += 1;
        if !on_message(message) {
            break;
        }
    }

    Ok(stats)
}

/// Fetch one message. Non-fatal failures become `Ok(None)`.
///
/// `known_arrival` fills in a missing arrival time from an earlier metadata fetch.
fn fetch_or_skip<S: MailboxSession + ?Sized>(
    session: &mut S,
    sequence: u32,
    known_arrival: Option<DateTime<FixedOffset>>,
) -> Result<Option<RawMessage>> {
    match session.fetch_message(sequence) {
        Ok(mut raw) => {
            if raw.arrival.is_none() {
                raw.arrival = known_arrival;
            }
            Ok(Some(raw))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(sequence, error = %e, "Fetch failed, skipping message");
            Ok(None)
        }
    }
}

fn selected(raw: RawMessage) -> SelectedMessage {
    SelectedMessage {
        summary: summarize(&raw),
        raw,
    }
}

fn local_day(arrival: &DateTime<FixedOffset>) -> NaiveDate {
    arrival.with_timezone(&Local).date_naive()
}

fn report(progress: Progress<'_>, done: u32, total: u32) {
    if let Some(cb) = progress {
        cb(done, total);
    }
}
