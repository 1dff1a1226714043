//! Integration tests for header decoding and part extraction.

use std::path::Path;

use mailgrab::config::CollisionPolicy;
use mailgrab::export::attachment::AttachmentWriter;
use mailgrab::model::message::RawMessage;
use mailgrab::parser::header::{decode_header, parse_date, summarize};
use mailgrab::parser::mime::{extract_parts, split_parts};

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

fn raw(name: &str) -> RawMessage {
    RawMessage {
        sequence: 1,
        arrival: None,
        data: fixture(name),
    }
}

// ─── Test 1: Encoded subject and sender ─────────────────────────────

#[test]
fn test_summary_decodes_encoded_words() {
    let summary = summarize(&raw("encoded_subject.eml"));
    assert_eq!(summary.subject, "Informe de ventas");
    assert_eq!(summary.sender, "José García <jose@example.com>");
    assert_eq!(summary.sequence, Some(1));
}

// ─── Test 2: Date header stands in for missing arrival ──────────────

#[test]
fn test_summary_falls_back_to_date_header() {
    let summary = summarize(&raw("report_a.eml"));
    let arrival = summary.arrival.expect("Date header parsed");
    assert_eq!(arrival.timestamp(), 1_755_518_400);
}

// ─── Test 3: Mixed and adjacent encoded-words ───────────────────────

#[test]
fn test_decode_header_mixed_words() {
    assert_eq!(
        decode_header("Re: =?UTF-8?Q?caf=C3=A9?= =?UTF-8?Q?_con_leche?= today"),
        "Re: café con leche today"
    );
    assert_eq!(decode_header("Plain subject"), "Plain subject");
    assert_eq!(decode_header(""), "");
}

// ─── Test 4: Date formats ───────────────────────────────────────────

#[test]
fn test_date_parsing_formats() {
    assert!(parse_date("Mon, 18 Aug 2025 12:00:00 +0000").is_some());
    assert!(parse_date("18 Aug 2025 12:00:00 +0200").is_some());
    assert!(parse_date("2025-08-18T12:00:00Z").is_some());
    assert!(parse_date("not a date").is_none());
}

// ─── Test 5: Multipart with two attachments ─────────────────────────

#[test]
fn test_extract_report_with_attachments() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("report_a.eml"), "Report A", &writer);

    assert_eq!(extraction.attachments.len(), 2);
    assert_eq!(extraction.failed_attachments, 0);
    assert_eq!(extraction.inline_text.len(), 1);
    assert!(extraction.inline_text[0].contains("Numbers for the week"));

    let dir = tmp.path().join("Report_A");
    assert_eq!(std::fs::read(dir.join("a.txt")).unwrap(), b"hello");
    let csv = std::fs::read_to_string(dir.join("b.csv")).unwrap();
    assert!(csv.contains("1,2"));
}

// ─── Test 6: Extraction is repeatable ───────────────────────────────

#[test]
fn test_extract_twice_leaves_same_files() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);
    let data = fixture("report_a.eml");

    let first = extract_parts(&data, "Report A", &writer);
    let contents: Vec<Vec<u8>> = first
        .attachments
        .iter()
        .map(|p| std::fs::read(p).unwrap())
        .collect();
    let second = extract_parts(&data, "Report A", &writer);

    assert_eq!(first.attachments, second.attachments);
    for (path, before) in second.attachments.iter().zip(contents) {
        assert_eq!(std::fs::read(path).unwrap(), before);
    }
    let files = std::fs::read_dir(tmp.path().join("Report_A")).unwrap().count();
    assert_eq!(files, 2);
}

// ─── Test 7: Embedded message is descended into ─────────────────────

#[test]
fn test_extract_nested_message() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("nested.eml"), "Fwd: Contract", &writer);

    let text = extraction.inline_text.join("\n");
    assert!(text.contains("Outer body"));
    assert!(text.contains("Inner body"));
    assert_eq!(extraction.attachments.len(), 1);
    assert_eq!(
        std::fs::read(tmp.path().join("Fwd__Contract").join("contract.pdf")).unwrap(),
        b"%PDF-1.4 fake"
    );
}

// ─── Test 8: Invalid UTF-8 degrades to replacement characters ───────

#[test]
fn test_invalid_utf8_body() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("invalid_utf8.eml"), "Broken bytes", &writer);

    assert_eq!(extraction.inline_text.len(), 1);
    let text = &extraction.inline_text[0];
    assert!(text.contains("before"));
    assert!(text.contains("after"));
    assert!(text.contains('\u{FFFD}'));
    assert!(extraction.attachments.is_empty());
}

// ─── Test 9: HTML-only message falls back to stripped text ──────────

#[test]
fn test_html_only_fallback() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("html_only.eml"), "Newsletter", &writer);

    assert_eq!(extraction.inline_text.len(), 1);
    let text = &extraction.inline_text[0];
    assert!(text.contains("Hello & welcome"));
    assert!(text.contains("Second line"));
    assert!(!text.contains("color"));
}

// ─── Test 10: Quoted-printable Latin-1 body ─────────────────────────

#[test]
fn test_quoted_printable_latin1_body() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("encoded_subject.eml"), "x", &writer);

    assert_eq!(extraction.inline_text.len(), 1);
    assert!(extraction.inline_text[0].contains("Café con leña"));
}

// ─── Test 11: Attachment count matches disposition ──────────────────

#[test]
fn test_attachment_count_matches_parts() {
    for name in [
        "report_a.eml",
        "nested.eml",
        "html_only.eml",
        "invalid_utf8.eml",
        "mixed_broken.eml",
    ] {
        let data = fixture(name);
        let expected = split_parts(&data)
            .iter()
            .filter(|p| p.is_attachment && p.usable_filename().is_some())
            .count();

        let tmp = tempfile::tempdir().unwrap();
        let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Number);
        let extraction = extract_parts(&data, name, &writer);
        assert_eq!(extraction.attachments.len(), expected, "fixture {name}");
    }
}

// ─── Test 12: Unwritable target is isolated per attachment ──────────

#[test]
fn test_unwritable_target_counts_failures() {
    let tmp = tempfile::tempdir().unwrap();
    // A regular file where the attachment root directory should be.
    let blocker = tmp.path().join("blocked");
    std::fs::write(&blocker, b"").unwrap();
    let writer = AttachmentWriter::new(&blocker, CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("report_a.eml"), "Report A", &writer);

    assert!(extraction.attachments.is_empty());
    assert_eq!(extraction.failed_attachments, 2);
    assert_eq!(extraction.inline_text.len(), 1);
}

// ─── Test 13: Damaged parts do not stop later ones ──────────────────

#[test]
fn test_damaged_parts_do_not_stop_walk() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = AttachmentWriter::new(tmp.path(), CollisionPolicy::Overwrite);

    let extraction = extract_parts(&fixture("mixed_broken.eml"), "Mixed damage", &writer);

    assert_eq!(extraction.parts_visited, 3);
    assert_eq!(extraction.inline_text.len(), 1);
    let text = &extraction.inline_text[0];
    assert!(text.contains("before"));
    assert!(text.contains("after"));
    assert!(text.contains('\u{FFFD}'));

    // Undecodable payload is kept as received.
    let dir = tmp.path().join("Mixed_damage");
    let broken = std::fs::read(dir.join("broken.txt")).unwrap();
    assert!(String::from_utf8_lossy(&broken).contains("not*base64"));

    assert_eq!(std::fs::read(dir.join("ok.txt")).unwrap(), b"hello");
    assert_eq!(extraction.attachments.len(), 2);
    assert_eq!(extraction.failed_attachments, 0);
}
