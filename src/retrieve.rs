//! Retrieval orchestration: select messages, print them, save attachments.
//!
//! This is the one place where a [`SelectionPredicate`] is turned into
//! selector or fetcher calls and where results reach the console and disk.

use std::io::{self, Write};
use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::{MailError, Result};
use crate::export::attachment::AttachmentWriter;
use crate::export::json::export_json;
use crate::export::text::{write_inline_text, write_listing_line, write_separator, write_summary};
use crate::model::message::{ApiRecord, SelectedMessage};
use crate::model::predicate::{subject_matches_any, SelectionPredicate};
use crate::parser::mime::{extract_parts, Extraction};
use crate::select::api::{fetch_messages, FetchOptions, FilterSpec};
use crate::select::imap::{
    select_by_count, select_by_date_and_keyword, select_by_subject, Progress,
};
use crate::transport::{ApiTransport, MailboxSession};

/// Everything a retrieval needs besides the session and the predicate.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub attachments: AttachmentWriter,
    /// Record cap for HTTP API retrievals that carry no count of their own.
    pub max_messages: usize,
    /// Where HTTP API results are exported as JSON, if anywhere.
    pub json_export: Option<PathBuf>,
    pub fetch: FetchOptions,
}

impl RetrievalOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attachments: AttachmentWriter::new(
                &config.retrieval.attachment_dir,
                config.retrieval.on_collision,
            ),
            max_messages: config.retrieval.max_messages,
            json_export: config.retrieval.json_export.clone(),
            fetch: FetchOptions::new(&config.graph, &config.retry),
        }
    }
}

/// What a retrieval produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetrievalReport {
    /// Messages printed.
    pub messages: usize,
    /// Attachment files written.
    pub attachments: Vec<PathBuf>,
    /// Attachments that could not be written.
    pub failed_attachments: usize,
    /// Messages skipped for missing metadata or failed fetches.
    pub skipped: u32,
    /// JSON export written, if any.
    pub exported: Option<PathBuf>,
}

/// Retrieve from an IMAP folder.
///
/// Each selected message is printed as soon as it is found: summary lines,
/// inline text, then a separator. Attachments are written as they are met.
pub fn retrieve_imap<S: MailboxSession + ?Sized>(
    session: &mut S,
    predicate: &SelectionPredicate,
    options: &RetrievalOptions,
    out: &mut dyn Write,
    progress: Progress<'_>,
) -> Result<RetrievalReport> {
    let mut report = RetrievalReport::default();
    let mut output_error: Option<io::Error> = None;

    let mut on_message = |message: SelectedMessage| -> bool {
        match emit_message(&message, &options.attachments, out) {
            Ok(extraction) => {
                report.messages += 1;
                report.failed_attachments += extraction.failed_attachments;
                report.attachments.extend(extraction.attachments);
                true
            }
            Err(e) => {
                output_error = Some(e);
                false
            }
        }
    };

    let stats = match predicate {
        SelectionPredicate::LatestN(n) => {
            select_by_count(session, *n, &mut on_message, progress)?
        }
        SelectionPredicate::DateAndKeyword { day, keywords } => select_by_date_and_keyword(
            session,
            *day,
            keywords,
            &mut on_message,
            progress,
        )?,
        SelectionPredicate::SubjectSearch(keyword) => {
            select_by_subject(session, keyword, &mut on_message, progress)?
        }
    };

    if let Some(e) = output_error {
        return Err(MailError::io("<output>", e));
    }
    report.skipped = stats.skipped;
    info!(
        messages = report.messages,
        attachments = report.attachments.len(),
        skipped = report.skipped,
        "Retrieval finished"
    );
    Ok(report)
}

/// Print one message and save its attachments.
fn emit_message(
    message: &SelectedMessage,
    writer: &AttachmentWriter,
    out: &mut dyn Write,
) -> io::Result<Extraction> {
    write_summary(out, &message.summary)?;
    let extraction = extract_parts(&message.raw.data, &message.summary.subject, writer);
    write_inline_text(out, &extraction.inline_text)?;
    write_separator(out)?;
    Ok(extraction)
}

/// Retrieve from the HTTP mail API and print a one-line listing.
///
/// `LatestN` caps the fetch at `n`; the other predicates are capped at
/// `max_messages`. Date keywords are applied to the fetched records, so the
/// whole day is fetched before the cap applies.
pub fn retrieve_api<T: ApiTransport + ?Sized>(
    transport: &mut T,
    predicate: &SelectionPredicate,
    options: &RetrievalOptions,
    out: &mut dyn Write,
) -> Result<RetrievalReport> {
    let records = api_records(transport, predicate, options)?;
    let mut report = RetrievalReport {
        messages: records.len(),
        ..RetrievalReport::default()
    };

    write_listing(&records, out).map_err(|e| MailError::io("<output>", e))?;

    if let Some(path) = &options.json_export {
        export_json(&records, path)?;
        writeln!(out, "\nSaved to {}", path.display()).map_err(|e| MailError::io("<output>", e))?;
        report.exported = Some(path.clone());
    }

    info!(messages = report.messages, "Retrieval finished");
    Ok(report)
}

fn api_records<T: ApiTransport + ?Sized>(
    transport: &mut T,
    predicate: &SelectionPredicate,
    options: &RetrievalOptions,
) -> Result<Vec<ApiRecord>> {
    let fetch = &options.fetch;
    match predicate {
        SelectionPredicate::LatestN(n) => fetch_messages(transport, &FilterSpec::Recent, *n, fetch),
        SelectionPredicate::SubjectSearch(keyword) => fetch_messages(
            transport,
            &FilterSpec::Subject(keyword.clone()),
            options.max_messages,
            fetch,
        ),
        SelectionPredicate::DateAndKeyword { day, keywords } if keywords.is_empty() => {
            fetch_messages(transport, &FilterSpec::Day(*day), options.max_messages, fetch)
        }
        SelectionPredicate::DateAndKeyword { day, keywords } => {
            let mut records = fetch_messages(transport, &FilterSpec::Day(*day), usize::MAX, fetch)?;
            records.retain(|r| subject_matches_any(r.subject(), keywords));
            records.truncate(options.max_messages);
            Ok(records)
        }
    }
}

fn write_listing(records: &[ApiRecord], out: &mut dyn Write) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No messages found.");
    }
    writeln!(out, "\nFetched {} message(s):\n", records.len())?;
    for (i, record) in records.iter().enumerate() {
        write_listing_line(out, i + 1, record)?;
        if let Some(preview) = record.body_preview() {
            writeln!(out, "    {}", preview.trim())?;
        }
    }
    Ok(())
}
