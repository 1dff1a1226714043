//! Centralized error types for mailgrab.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by the mailgrab library.
///
/// Decoding problems and missing arrival metadata never show up here: they
/// are recovered where they happen (replacement characters, skipped messages).
#[derive(Error, Debug)]
pub enum MailError {
    /// The session or token was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server answered with a non-retryable status.
    #[error("Request failed with status {status}: {reason}")]
    Transport { status: u16, reason: String },

    /// Throttling did not clear within the configured retry bounds.
    #[error("Gave up after {attempts} throttled attempt(s) ({waited:?} spent waiting)")]
    RetryExhausted { attempts: u32, waited: Duration },

    /// An IMAP command failed.
    #[error("IMAP error: {0}")]
    Imap(String),

    /// The IMAP connection is gone; no further command can succeed.
    #[error("IMAP connection lost: {0}")]
    ConnectionLost(String),

    /// The HTTP client could not complete a request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with something we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A date string did not match `YYYY-MM-DD`.
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Configuration or credentials are unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error ends the whole retrieval rather than a single message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_)
                | Self::ConnectionLost(_)
                | Self::Transport { .. }
                | Self::RetryExhausted { .. }
                | Self::Config(_)
                | Self::InvalidDate(_)
        )
    }
}

impl From<imap::error::Error> for MailError {
    fn from(err: imap::error::Error) -> Self {
        match err {
            imap::error::Error::No(msg) if msg.to_lowercase().contains("auth") => {
                Self::Auth(msg)
            }
            imap::error::Error::ConnectionLost => {
                Self::ConnectionLost("server closed the connection".into())
            }
            err @ (imap::error::Error::Io(_)
            | imap::error::Error::Tls(_)
            | imap::error::Error::TlsHandshake(_)) => Self::ConnectionLost(err.to_string()),
            other => Self::Imap(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MailError::Auth("expired".into()).is_fatal());
        assert!(MailError::Transport {
            status: 404,
            reason: "not found".into()
        }
        .is_fatal());
        assert!(!MailError::Imap("NO fetch failed".into()).is_fatal());
        assert!(MailError::ConnectionLost("reset".into()).is_fatal());
        assert!(!MailError::io("x", std::io::Error::other("disk")).is_fatal());
    }

    #[test]
    fn test_display_mentions_status() {
        let err = MailError::Transport {
            status: 400,
            reason: "bad filter".into(),
        };
        assert_eq!(err.to_string(), "Request failed with status 400: bad filter");
    }

    #[test]
    fn test_imap_connection_errors_are_fatal() {
        let lost = MailError::from(imap::error::Error::ConnectionLost);
        assert!(matches!(lost, MailError::ConnectionLost(_)));
        assert!(lost.is_fatal());

        let io = MailError::from(imap::error::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(matches!(io, MailError::ConnectionLost(_)));

        let no = MailError::from(imap::error::Error::No("message expunged".into()));
        assert!(matches!(no, MailError::Imap(_)));
        assert!(!no.is_fatal());
    }
}
