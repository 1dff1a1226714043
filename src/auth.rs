//! Session setup: IMAP password login and the OAuth device-code flow for
//! the HTTP mail API.
//!
//! Nothing here is used by the retrieval engine itself; callers open a
//! session, hand it to [`crate::retrieve`], and close it afterwards.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::time::{Duration, Instant};

use native_tls::{TlsConnector, TlsStream};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::error::{MailError, Result};

/// IMAP account credentials, read from a TOML file:
///
/// ```toml
/// user = "someone@example.com"
/// password = "app-password"
/// ```
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Load credentials from a TOML file.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let contents = std::fs::read_to_string(path).map_err(|e| MailError::io(path, e))?;
    let creds: Credentials = toml::from_str(&contents)
        .map_err(|e| MailError::Config(format!("{}: {e}", path.display())))?;
    if creds.user.trim().is_empty() {
        return Err(MailError::Config(format!("{}: empty user", path.display())));
    }
    Ok(creds)
}

/// Authenticated IMAP session over TLS.
pub type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// Connect over TLS and log in.
pub fn connect_imap(host: &str, port: u16, creds: &Credentials) -> Result<ImapSession> {
    let tls = TlsConnector::builder()
        .build()
        .map_err(|e| MailError::Imap(format!("TLS setup failed: {e}")))?;
    let client = imap::connect((host, port), host, &tls)?;
    debug!(host, port, "Connected");

    let session = client
        .login(&creds.user, &creds.password)
        .map_err(|(e, _)| match e {
            imap::error::Error::No(msg) | imap::error::Error::Bad(msg) => MailError::Auth(msg),
            other => MailError::from(other),
        })?;
    info!(host, user = %creds.user, "Logged in");
    Ok(session)
}

// ── Device-code flow ────────────────────────────────────────────

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Answer to the device authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Ready-made instructions for the user.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Outcome of one token poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Token(String),
    Pending,
    SlowDown,
    Failed(String),
}

/// Interpret a token endpoint response body.
pub fn parse_token_response(body: &str) -> PollOutcome {
    #[derive(Deserialize)]
    struct TokenBody {
        access_token: Option<String>,
        error: Option<String>,
        error_description: Option<String>,
    }

    let Ok(parsed) = serde_json::from_str::<TokenBody>(body) else {
        return PollOutcome::Failed("unreadable token response".to_string());
    };
    if let Some(token) = parsed.access_token {
        return PollOutcome::Token(token);
    }
    match parsed.error.as_deref() {
        Some("authorization_pending") => PollOutcome::Pending,
        Some("slow_down") => PollOutcome::SlowDown,
        Some(code) => PollOutcome::Failed(match parsed.error_description {
            Some(desc) => format!("{code}: {desc}"),
            None => code.to_string(),
        }),
        None => PollOutcome::Failed("token response without token or error".to_string()),
    }
}

/// Run the device-code flow and return an access token.
///
/// Sign-in instructions are written to `prompt`.
pub fn acquire_token(graph: &GraphConfig, prompt: &mut dyn Write) -> Result<String> {
    if graph.client_id.trim().is_empty() {
        return Err(MailError::Config(
            "graph.client_id is not set; pass --token or configure an app registration".into(),
        ));
    }

    let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let authority = graph.authority.trim_end_matches('/');
    let scopes = graph.scopes.join(" ");

    let device: DeviceCode = http
        .post(format!("{authority}/oauth2/v2.0/devicecode"))
        .form(&[("client_id", graph.client_id.as_str()), ("scope", scopes.as_str())])
        .send()?
        .error_for_status()
        .map_err(|e| MailError::Auth(format!("device code request failed: {e}")))?
        .json()?;

    let instructions = device.message.clone().unwrap_or_else(|| {
        format!(
            "To sign in, open {} and enter the code {}",
            device.verification_uri, device.user_code
        )
    });
    writeln!(prompt, "{instructions}").map_err(|e| MailError::io("<stderr>", e))?;

    let deadline = Instant::now() + Duration::from_secs(device.expires_in);
    let mut interval = Duration::from_secs(device.interval.max(1));

    loop {
        if Instant::now() >= deadline {
            return Err(MailError::Auth("device code expired before sign-in".into()));
        }
        std::thread::sleep(interval);

        let body = http
            .post(format!("{authority}/oauth2/v2.0/token"))
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", graph.client_id.as_str()),
                ("device_code", device.device_code.as_str()),
            ])
            .send()?
            .text()?;

        match parse_token_response(&body) {
            PollOutcome::Token(token) => {
                info!("Access token acquired");
                return Ok(token);
            }
            PollOutcome::Pending => debug!("Authorization pending"),
            PollOutcome::SlowDown => interval += Duration::from_secs(5),
            PollOutcome::Failed(reason) => return Err(MailError::Auth(reason)),
        }
    }
}
