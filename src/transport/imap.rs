//! [`MailboxSession`] over an authenticated `imap` session.

use std::io::{Read, Write};

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use super::MailboxSession;
use crate::error::{MailError, Result};
use crate::model::message::RawMessage;

/// Fetch query for full content. `BODY.PEEK[]` leaves the `\Seen` flag alone.
const FULL_MESSAGE_QUERY: &str = "(BODY.PEEK[] INTERNALDATE)";

/// Fetch query for arrival metadata only.
const ARRIVAL_QUERY: &str = "INTERNALDATE";

/// A folder of an IMAP session, opened read-only.
///
/// Borrows the session; logging out stays with whoever opened it.
pub struct ImapMailbox<'a, T: Read + Write> {
    session: &'a mut imap::Session<T>,
    folder: String,
}

impl<'a, T: Read + Write> ImapMailbox<'a, T> {
    pub fn new(session: &'a mut imap::Session<T>, folder: impl Into<String>) -> Self {
        Self {
            session,
            folder: folder.into(),
        }
    }
}

impl<T: Read + Write> MailboxSession for ImapMailbox<'_, T> {
    fn message_count(&mut self) -> Result<u32> {
        let mailbox = self.session.examine(&self.folder)?;
        debug!(folder = %self.folder, exists = mailbox.exists, "Examined folder");
        Ok(mailbox.exists)
    }

    fn fetch_arrival(&mut self, sequence: u32) -> Result<Option<DateTime<FixedOffset>>> {
        let fetches = self.session.fetch(sequence.to_string(), ARRIVAL_QUERY)?;
        Ok(fetches
            .iter()
            .find(|f| f.message == sequence)
            .and_then(|f| f.internal_date()))
    }

    fn fetch_message(&mut self, sequence: u32) -> Result<RawMessage> {
        let fetches = self.session.fetch(sequence.to_string(), FULL_MESSAGE_QUERY)?;
        let fetch = fetches
            .iter()
            .find(|f| f.message == sequence)
            .ok_or_else(|| MailError::Imap(format!("no FETCH response for message {sequence}")))?;
        let data = fetch
            .body()
            .ok_or_else(|| MailError::Imap(format!("message {sequence} has no body")))?
            .to_vec();

        Ok(RawMessage {
            sequence,
            arrival: fetch.internal_date(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Replays a scripted server transcript and swallows client commands.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Logged-in session whose next command (tag `a2`) gets `responses`.
    fn session(responses: &str) -> imap::Session<Scripted> {
        let transcript = format!("a1 OK LOGIN completed\r\n{responses}a2 OK FETCH completed\r\n");
        let stream = Scripted {
            input: Cursor::new(transcript.into_bytes()),
            sent: Vec::new(),
        };
        imap::Client::new(stream)
            .login("user", "pass")
            .map_err(|(e, _)| e)
            .unwrap()
    }

    #[test]
    fn test_arrival_ignores_unsolicited_fetch() {
        let mut session = session(
            "* 7 FETCH (INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")\r\n\
             * 3 FETCH (INTERNALDATE \"18-Aug-2025 10:00:00 +0000\")\r\n",
        );
        let mut mailbox = ImapMailbox::new(&mut session, "INBOX");
        let arrival = mailbox.fetch_arrival(3).unwrap().unwrap();
        assert_eq!(arrival.to_rfc3339(), "2025-08-18T10:00:00+00:00");
    }

    #[test]
    fn test_message_ignores_unsolicited_fetch() {
        let body = "Subject: mine\r\n\r\nhello\r\n";
        let mut session = session(&format!(
            "* 9 FETCH (FLAGS (\\Seen))\r\n\
             * 3 FETCH (INTERNALDATE \"18-Aug-2025 10:00:00 +0000\" BODY[] {{{}}}\r\n{body})\r\n",
            body.len()
        ));
        let mut mailbox = ImapMailbox::new(&mut session, "INBOX");
        let raw = mailbox.fetch_message(3).unwrap();
        assert_eq!(raw.sequence, 3);
        assert_eq!(raw.data, body.as_bytes());
        assert!(raw.arrival.is_some());
    }

    #[test]
    fn test_message_missing_from_response() {
        let mut session = session("* 9 FETCH (FLAGS (\\Seen))\r\n");
        let mut mailbox = ImapMailbox::new(&mut session, "INBOX");
        assert!(matches!(
            mailbox.fetch_message(3),
            Err(MailError::Imap(_))
        ));
    }
}
