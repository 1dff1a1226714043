//! Paginated retrieval from the HTTP mail API.
//!
//! One filtered request is issued, then the server's continuation links are
//! followed until enough records are collected or no link is returned.
//! Throttling statuses (429, 503, 504) are retried against the same page
//! after the server's `Retry-After`, within [`RetryPolicy`] bounds.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{GraphConfig, RetryConfig};
use crate::error::{MailError, Result};
use crate::model::message::ApiRecord;
use crate::transport::{ApiTransport, PageRequest, PageResponse};

/// Fields requested for every record.
pub const SELECT_FIELDS: &str =
    "id,subject,from,receivedDateTime,conversationId,webLink,bodyPreview";

/// Server-side filter for the first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// Newest first, no filter.
    Recent,
    /// Server-side subject search.
    Subject(String),
    /// Records received during one UTC calendar day.
    Day(NaiveDate),
}

/// Bounds on throttling backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per page, including the first.
    pub max_attempts: u32,
    /// Wait when the server sends no `Retry-After`.
    pub default_wait: Duration,
    /// Cumulative wait budget for one fetch.
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            default_wait: config.default_wait(),
            max_total_wait: config.max_total_wait(),
        }
    }
}

/// Endpoint and paging settings for [`fetch_messages`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Messages collection URL.
    pub base_url: String,
    /// Records requested per page (`$top`).
    pub page_size: u32,
    pub retry: RetryPolicy,
}

impl FetchOptions {
    pub fn new(graph: &GraphConfig, retry: &RetryConfig) -> Self {
        Self {
            base_url: graph.base_url.clone(),
            page_size: graph.page_size.max(1),
            retry: RetryPolicy::from(retry),
        }
    }
}

/// One page of the collection.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    value: Vec<ApiRecord>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Fetch up to `max_count` records matching `filter`, in server order.
///
/// Stops requesting pages as soon as `max_count` records are in hand.
pub fn fetch_messages<T: ApiTransport + ?Sized>(
    transport: &mut T,
    filter: &FilterSpec,
    max_count: usize,
    options: &FetchOptions,
) -> Result<Vec<ApiRecord>> {
    let mut records = Vec::new();
    if max_count == 0 {
        return Ok(records);
    }

    let mut waited = Duration::ZERO;
    let mut pages = 0usize;
    let mut next = Some(first_request(filter, max_count, options));

    while let Some(request) = next.take() {
        let response = send_with_backoff(transport, &request, &options.retry, &mut waited)?;
        let page: Page = serde_json::from_str(&response.body)
            .map_err(|e| MailError::InvalidResponse(format!("page {}: {e}", pages + 1)))?;
        pages += 1;
        debug!(page = pages, records = page.value.len(), "Fetched page");

        records.extend(page.value);
        if records.len() >= max_count {
            break;
        }
        next = page.next_link.map(|link| request.continuation(link));
    }

    records.truncate(max_count);
    info!(records = records.len(), pages, "Fetched messages");
    Ok(records)
}

/// Build the filtered first request.
pub fn first_request(filter: &FilterSpec, max_count: usize, options: &FetchOptions) -> PageRequest {
    let top = max_count.min(options.page_size as usize).max(1);
    let mut query = vec![
        ("$select".to_string(), SELECT_FIELDS.to_string()),
        ("$top".to_string(), top.to_string()),
    ];
    let mut headers = Vec::new();

    match filter {
        FilterSpec::Recent => {
            query.push(("$orderby".to_string(), "receivedDateTime DESC".to_string()));
        }
        FilterSpec::Subject(keyword) => {
            // $search needs eventual consistency and cannot be combined with $orderby.
            let escaped = keyword.replace('"', "\\\"");
            query.push(("$search".to_string(), format!("\"subject:{escaped}\"")));
            headers.push(("ConsistencyLevel".to_string(), "eventual".to_string()));
        }
        FilterSpec::Day(day) => {
            let d = day.format("%Y-%m-%d");
            query.push((
                "$filter".to_string(),
                format!("receivedDateTime ge {d}T00:00:00Z and receivedDateTime le {d}T23:59:59Z"),
            ));
        }
    }

    PageRequest {
        url: options.base_url.clone(),
        query,
        headers,
    }
}

/// Send one request, retrying while the server throttles.
///
/// `waited` accumulates across calls so the budget covers the whole fetch.
fn send_with_backoff<T: ApiTransport + ?Sized>(
    transport: &mut T,
    request: &PageRequest,
    policy: &RetryPolicy,
    waited: &mut Duration,
) -> Result<PageResponse> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let wait = match transport.get(request) {
            Ok(response) => match response.status {
                200..=299 => return Ok(response),
                429 | 503 | 504 => {
                    warn!(status = response.status, attempt = attempts, "Throttled");
                    response.retry_after.unwrap_or(policy.default_wait)
                }
                401 | 403 => return Err(MailError::Auth(error_reason(&response.body))),
                status => {
                    return Err(MailError::Transport {
                        status,
                        reason: error_reason(&response.body),
                    })
                }
            },
            Err(MailError::Http(e)) => {
                warn!(error = %e, attempt = attempts, "Request failed");
                policy.default_wait
            }
            Err(e) => return Err(e),
        };

        if attempts >= policy.max_attempts || *waited + wait > policy.max_total_wait {
            return Err(MailError::RetryExhausted {
                attempts,
                waited: *waited,
            });
        }
        info!(wait_secs = wait.as_secs(), "Backing off before retry");
        std::thread::sleep(wait);
        *waited += wait;
    }
}

/// Human-readable reason from an error body: `code: message` when the body
/// is the usual `{"error": {...}}` object, otherwise the start of the body.
fn error_reason(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(default)]
        code: String,
        #[serde(default)]
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) if !error.code.is_empty() => {
            format!("{}: {}", error.code, error.message)
        }
        Ok(ErrorBody { error }) => error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct Replay {
        responses: VecDeque<Result<PageResponse>>,
        requests: Vec<PageRequest>,
    }

    impl Replay {
        fn push(&mut self, status: u16, body: serde_json::Value) -> &mut Self {
            self.responses.push_back(Ok(PageResponse {
                status,
                retry_after: None,
                body: body.to_string(),
            }));
            self
        }

        fn throttle(&mut self, status: u16, retry_after: Option<Duration>) -> &mut Self {
            self.responses.push_back(Ok(PageResponse {
                status,
                retry_after,
                body: String::new(),
            }));
            self
        }
    }

    impl ApiTransport for Replay {
        fn get(&mut self, request: &PageRequest) -> Result<PageResponse> {
            self.requests.push(request.clone());
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(MailError::Imap("no more canned responses".into())))
        }
    }

    fn page(ids: std::ops::Range<usize>, next: Option<&str>) -> serde_json::Value {
        let value: Vec<_> = ids
            .map(|i| json!({"id": format!("m{i}"), "subject": format!("Message {i}")}))
            .collect();
        match next {
            Some(link) => json!({"value": value, "@odata.nextLink": link}),
            None => json!({"value": value}),
        }
    }

    fn options() -> FetchOptions {
        FetchOptions {
            base_url: "https://mail.test/v1/me/messages".into(),
            page_size: 25,
            retry: RetryPolicy {
                max_attempts: 3,
                default_wait: Duration::ZERO,
                max_total_wait: Duration::from_secs(1),
            },
        }
    }

    fn query_value<'a>(request: &'a PageRequest, key: &str) -> Option<&'a str> {
        request
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_stops_after_max_count() {
        let mut api = Replay::default();
        api.push(200, page(0..25, Some("https://mail.test/next1")));
        let records = fetch_messages(&mut api, &FilterSpec::Recent, 10, &options()).unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(api.requests.len(), 1);
        assert_eq!(query_value(&api.requests[0], "$top"), Some("10"));
    }

    #[test]
    fn test_follows_continuation_links() {
        let mut api = Replay::default();
        api.push(200, page(0..3, Some("https://mail.test/next1")))
            .push(200, page(3..5, None));
        let records = fetch_messages(&mut api, &FilterSpec::Recent, 50, &options()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.0["id"].clone()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(api.requests.len(), 2);
        assert_eq!(api.requests[1].url, "https://mail.test/next1");
        assert!(api.requests[1].query.is_empty());
    }

    #[test]
    fn test_retries_same_page_after_throttle() {
        let mut api = Replay::default();
        api.throttle(429, Some(Duration::ZERO))
            .push(200, page(0..2, None));
        let records = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(api.requests.len(), 2);
        assert_eq!(api.requests[0], api.requests[1]);
    }

    #[test]
    fn test_retry_exhausted() {
        let mut api = Replay::default();
        api.throttle(503, None).throttle(503, None).throttle(503, None);
        let err = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap_err();
        assert!(matches!(err, MailError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(api.requests.len(), 3);
    }

    #[test]
    fn test_wait_budget_bounds_retries() {
        let mut api = Replay::default();
        api.throttle(429, Some(Duration::from_secs(30)));
        let err = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap_err();
        assert!(matches!(err, MailError::RetryExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_bad_request_is_fatal() {
        let mut api = Replay::default();
        api.push(
            400,
            json!({"error": {"code": "BadRequest", "message": "Invalid filter clause"}}),
        );
        let err = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap_err();
        match err {
            MailError::Transport { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "BadRequest: Invalid filter clause");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.requests.len(), 1);
    }

    #[test]
    fn test_unauthorized_maps_to_auth() {
        let mut api = Replay::default();
        api.push(401, json!({"error": {"code": "InvalidAuthenticationToken", "message": "expired"}}));
        let err = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap_err();
        assert!(matches!(err, MailError::Auth(_)));
    }

    #[test]
    fn test_zero_max_count_sends_nothing() {
        let mut api = Replay::default();
        let records = fetch_messages(&mut api, &FilterSpec::Recent, 0, &options()).unwrap();
        assert!(records.is_empty());
        assert!(api.requests.is_empty());
    }

    #[test]
    fn test_subject_request_uses_search() {
        let req = first_request(&FilterSpec::Subject("Q3 report".into()), 50, &options());
        assert_eq!(query_value(&req, "$search"), Some("\"subject:Q3 report\""));
        assert_eq!(query_value(&req, "$orderby"), None);
        assert_eq!(
            req.headers,
            vec![("ConsistencyLevel".to_string(), "eventual".to_string())]
        );
    }

    #[test]
    fn test_day_request_uses_filter() {
        let day = NaiveDate::from_ymd_opt(2025, 8, 18).unwrap();
        let req = first_request(&FilterSpec::Day(day), 50, &options());
        assert_eq!(
            query_value(&req, "$filter"),
            Some("receivedDateTime ge 2025-08-18T00:00:00Z and receivedDateTime le 2025-08-18T23:59:59Z")
        );
        assert_eq!(query_value(&req, "$top"), Some("25"));
    }

    #[test]
    fn test_continuation_keeps_headers() {
        let req = first_request(&FilterSpec::Subject("x".into()), 5, &options());
        let next = req.continuation("https://mail.test/next".into());
        assert_eq!(next.headers, req.headers);
        assert!(next.query.is_empty());
    }

    #[test]
    fn test_invalid_page_body() {
        let mut api = Replay::default();
        api.responses.push_back(Ok(PageResponse {
            status: 200,
            retry_after: None,
            body: "<html>".into(),
        }));
        let err = fetch_messages(&mut api, &FilterSpec::Recent, 5, &options()).unwrap_err();
        assert!(matches!(err, MailError::InvalidResponse(_)));
    }
}
