//! [`ApiTransport`] for the Microsoft Graph mail API over blocking `reqwest`.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use tracing::debug;

use super::{ApiTransport, PageRequest, PageResponse};
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bearer-token authorized HTTP client.
pub struct GraphClient {
    http: Client,
    token: String,
}

impl GraphClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("mailgrab/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
        })
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ApiTransport for GraphClient {
    fn get(&mut self, request: &PageRequest) -> Result<PageResponse> {
        let mut builder = self
            .http
            .get(&request.url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text()?;

        debug!(url = %request.url, status, bytes = body.len(), "GET");
        Ok(PageResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// `Retry-After` in delay-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
