//! Human-readable console output for retrieved messages.

use std::io::{self, Write};

use crate::model::message::{ApiRecord, MessageSummary};

/// Separator printed after each message.
pub const SEPARATOR_WIDTH: usize = 50;

/// Write the three summary lines of a message.
pub fn write_summary(out: &mut dyn Write, summary: &MessageSummary) -> io::Result<()> {
    writeln!(out, "Subject: {}", summary.subject)?;
    writeln!(out, "From: {}", summary.sender)?;
    writeln!(out, "Arrival Time: {}", format_arrival(summary))
}

/// Arrival time in local time, `Mon, 18 Aug 2025 10:00:00`.
pub fn format_arrival(summary: &MessageSummary) -> String {
    summary
        .arrival
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%a, %d %b %Y %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write inline text chunks in order.
pub fn write_inline_text(out: &mut dyn Write, chunks: &[String]) -> io::Result<()> {
    for chunk in chunks {
        writeln!(out, "{}", chunk.trim_end())?;
    }
    Ok(())
}

/// Write the `=====` separator between messages.
pub fn write_separator(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "\n{}\n", "=".repeat(SEPARATOR_WIDTH))
}

/// One listing line for an API record: `01. <received> | <address> | <subject>`.
pub fn write_listing_line(out: &mut dyn Write, index: usize, record: &ApiRecord) -> io::Result<()> {
    let subject = match record.subject() {
        "" => "(no subject)",
        s => s,
    };
    writeln!(
        out,
        "{:02}. {} | {} | {}",
        index,
        record.received_raw().unwrap_or(""),
        record.sender_address().unwrap_or("(no sender)"),
        subject
    )
}
