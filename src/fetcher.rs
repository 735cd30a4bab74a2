use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";
pub const PAGE_SIZE: usize = 100;
/// GitHub never returns more than this many search results.
pub const SEARCH_RESULT_CEILING: usize = 1000;
const MAX_ATTEMPTS: u32 = 3;
const USER_AGENT: &str = "review-lens";

// ---------------------------------------------------------------------------
// Transport abstraction (for testability)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Blocking HTTP transport. `Err` means the request never produced a response.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String> {
        let method = match request.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        let mut call = self.agent.request(method, &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let outcome = match &request.body {
            Some(body) => call.send_json(body),
            None => call.call(),
        };
        // Error statuses still carry headers and a body worth classifying.
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => return Err(e.to_string()),
        };

        let status = response.status();
        let mut headers = HashMap::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                headers.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response
            .into_string()
            .map_err(|e| format!("failed to read response body: {e}"))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Rate limit tracking
// ---------------------------------------------------------------------------

/// Quota snapshot from the most recent response. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: Option<DateTime<Utc>>,
}

impl RateLimit {
    fn from_response(response: &HttpResponse) -> Option<Self> {
        let remaining = response.header("x-ratelimit-remaining")?.parse().ok()?;
        let limit = response
            .header("x-ratelimit-limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Some(Self {
            limit,
            remaining,
            reset: parse_reset(response),
        })
    }
}

fn parse_reset(response: &HttpResponse) -> Option<DateTime<Utc>> {
    let epoch: i64 = response.header("x-ratelimit-reset")?.parse().ok()?;
    DateTime::from_timestamp(epoch, 0)
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// GitHub REST/GraphQL client with retries, rate-limit detection and paging.
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    token: Option<String>,
    graphql_url: String,
    retry_delay_unit: Duration,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, token: Option<String>) -> Self {
        if token.is_none() {
            warn!("no GitHub token configured; unauthenticated requests are limited to 60/hour");
        }
        Self {
            transport,
            token,
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            retry_delay_unit: Duration::from_secs(1),
            rate_limit: Mutex::new(None),
        }
    }

    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = url.into();
        self
    }

    /// Backoff before retry `n` is `n * unit`.
    pub fn with_retry_delay(mut self, unit: Duration) -> Self {
        self.retry_delay_unit = unit;
        self
    }

    /// Latest quota snapshot, if any response carried one.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit.lock().ok().and_then(|guard| *guard)
    }

    /// GET a single URL and decode its JSON body.
    pub async fn fetch(&self, url: &str) -> Result<Value> {
        let request = self.request(Method::Get, url, None);
        self.execute(request).await
    }

    /// Fetch every page of a paginated endpoint, preserving server order.
    ///
    /// Handles bare JSON arrays and search envelopes (`total_count` + `items`).
    pub async fn fetch_all_pages(&self, base_url: &str) -> Result<Vec<Value>> {
        let first = self.fetch(&page_url(base_url, 1)).await?;

        if let Some(total) = first.get("total_count") {
            let total = total.as_u64().unwrap_or(0) as usize;
            let items = take_items(first)?;
            return self.collect_search_pages(base_url, total, items).await;
        }
        match first {
            Value::Array(items) => self.collect_list_pages(base_url, items).await,
            other => Err(Error::Network(format!(
                "unexpected paginated response shape from {base_url}: {}",
                truncate_for_log(&other.to_string())
            ))),
        }
    }

    /// Run a GraphQL query and return its `data` member.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });
        let request = self.request(Method::Post, &self.graphql_url, Some(body));
        let json = self.execute(request).await?;

        if let Some(errors) = json.get("errors") {
            return Err(Error::Api {
                status: 200,
                message: format!("GraphQL errors: {errors}"),
            });
        }
        json.get("data")
            .cloned()
            .ok_or_else(|| Error::Network("GraphQL response missing data".to_string()))
    }

    async fn collect_list_pages(&self, base_url: &str, first: Vec<Value>) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut page = 1;
        let mut items = first;
        loop {
            let count = items.len();
            all.extend(items);
            debug!(url = base_url, page, count, "fetched page");
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
            items = match self.fetch(&page_url(base_url, page)).await? {
                Value::Array(items) => items,
                other => {
                    return Err(Error::Network(format!(
                        "expected a list on page {page} of {base_url}, got: {}",
                        truncate_for_log(&other.to_string())
                    )));
                }
            };
        }
        Ok(all)
    }

    async fn collect_search_pages(
        &self,
        base_url: &str,
        total: usize,
        first: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let capped = total.min(SEARCH_RESULT_CEILING);
        let pages = capped.div_ceil(PAGE_SIZE);
        if total > SEARCH_RESULT_CEILING {
            warn!(
                total,
                ceiling = SEARCH_RESULT_CEILING,
                "search matched more results than GitHub returns; results truncated"
            );
        }

        let mut all = first;
        debug!(url = base_url, page = 1, pages, total, "fetched search page");
        if all.is_empty() {
            return Ok(all);
        }
        for page in 2..=pages {
            let items = take_items(self.fetch(&page_url(base_url, page)).await?)?;
            if items.is_empty() {
                break;
            }
            debug!(url = base_url, page, pages, "fetched search page");
            all.extend(items);
        }
        Ok(all)
    }

    fn request(&self, method: Method, url: &str, body: Option<Value>) -> HttpRequest {
        let mut headers = vec![
            (
                "Accept".to_string(),
                "application/vnd.github+json".to_string(),
            ),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        if let Some(ref token) = self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        }
    }

    async fn execute(&self, request: HttpRequest) -> Result<Value> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let transport = Arc::clone(&self.transport);
            let req = request.clone();
            let outcome = tokio::task::spawn_blocking(move || transport.send(&req))
                .await
                .map_err(|e| Error::Network(format!("request task failed: {e}")))?;

            let result = match outcome {
                Ok(response) => {
                    self.record_rate_limit(&response);
                    classify(&request.url, response)
                }
                Err(e) => Err(Error::Network(e)),
            };

            match result {
                Ok(json) => return Ok(json),
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt < MAX_ATTEMPTS {
                        let backoff = self.retry_delay_unit * attempt;
                        warn!(
                            attempt,
                            url = %request.url,
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "retrying GitHub request after transient error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Network(format!(
            "request to {} failed after {MAX_ATTEMPTS} attempts: {last_error}",
            request.url
        )))
    }

    fn record_rate_limit(&self, response: &HttpResponse) {
        if let Some(limit) = RateLimit::from_response(response)
            && let Ok(mut guard) = self.rate_limit.lock()
        {
            *guard = Some(limit);
        }
    }
}

/// Map a raw response onto the error taxonomy, decoding JSON on success.
fn classify(url: &str, response: HttpResponse) -> Result<Value> {
    match response.status {
        200..=299 => serde_json::from_str(&response.body).map_err(|e| {
            Error::Network(format!("undecodable response body from {url}: {e}"))
        }),
        401 => Err(Error::AuthRequired),
        403 if response.header("x-ratelimit-remaining") == Some("0") => {
            let reset = parse_reset(&response)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "an unknown time".to_string());
            Err(Error::RateLimitExceeded { reset })
        }
        404 => Err(Error::NotFound(url.to_string())),
        429 | 500..=599 => Err(Error::Network(format!(
            "HTTP {} from {url}",
            response.status
        ))),
        status => Err(Error::Api {
            status,
            message: api_message(&response.body),
        }),
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate_for_log(body))
}

fn take_items(envelope: Value) -> Result<Vec<Value>> {
    match envelope {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(Error::Network(
                "search response missing items array".to_string(),
            )),
        },
        other => Err(Error::Network(format!(
            "expected a search envelope, got: {}",
            truncate_for_log(&other.to_string())
        ))),
    }
}

/// Append paging parameters, respecting an existing query string.
pub fn page_url(base_url: &str, page: usize) -> String {
    let sep = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{sep}per_page={PAGE_SIZE}&page={page}")
}

fn truncate_for_log(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("{head}...")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Handler = dyn Fn(&HttpRequest) -> std::result::Result<HttpResponse, String> + Send + Sync;

    /// Transport answering every request through a closure, counting calls.
    pub(crate) struct MockTransport {
        handler: Box<Handler>,
        pub(crate) calls: AtomicUsize,
        pub(crate) urls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub(crate) fn new<F>(handler: F) -> Self
        where
            F: Fn(&HttpRequest) -> std::result::Result<HttpResponse, String> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for MockTransport {
        fn send(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(request.url.clone());
            (self.handler)(request)
        }
    }

    pub(crate) fn json_response(status: u16, body: Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.to_string(),
        }
    }

    fn fetcher(transport: Arc<MockTransport>) -> Fetcher {
        Fetcher::new(transport, Some("token".to_string())).with_retry_delay(Duration::ZERO)
    }

    fn page_of(url: &str) -> usize {
        url.rsplit("page=")
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_decodes_json() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(json_response(200, serde_json::json!({ "ok": true })))
        }));
        let value = fetcher(transport).fetch("https://api/x").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_fetch_attaches_bearer_token_when_present() {
        let transport = Arc::new(MockTransport::new(|req| {
            let auth = req
                .headers
                .iter()
                .find(|(k, _)| k == "Authorization")
                .map(|(_, v)| v.clone());
            Ok(json_response(200, serde_json::json!({ "auth": auth })))
        }));
        let with = fetcher(Arc::clone(&transport)).fetch("u").await.unwrap();
        assert_eq!(with["auth"], "Bearer token");

        let without = Fetcher::new(transport, None).fetch("u").await.unwrap();
        assert!(without["auth"].is_null());
    }

    #[tokio::test]
    async fn test_fetch_401_is_auth_required() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(json_response(401, serde_json::json!({ "message": "Bad credentials" })))
        }));
        let err = fetcher(Arc::clone(&transport)).fetch("u").await.unwrap_err();
        assert!(matches!(err, Error::AuthRequired));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_found() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(json_response(404, serde_json::json!({ "message": "Not Found" })))
        }));
        let err = fetcher(transport).fetch("https://api/repos/a/b").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref u) if u == "https://api/repos/a/b"));
    }

    #[tokio::test]
    async fn test_fetch_403_with_zero_quota_reports_reset() {
        let transport = Arc::new(MockTransport::new(|_| {
            let mut response = json_response(403, serde_json::json!({ "message": "rate" }));
            response
                .headers
                .insert("x-ratelimit-remaining".to_string(), "0".to_string());
            response
                .headers
                .insert("x-ratelimit-reset".to_string(), "1735689600".to_string());
            Ok(response)
        }));
        let err = fetcher(transport).fetch("u").await.unwrap_err();
        match err {
            Error::RateLimitExceeded { ref reset } => {
                assert!(reset.starts_with("2025-01-01T00:00:00"));
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }
        assert!(err.to_string().contains("2025-01-01"));
    }

    #[tokio::test]
    async fn test_fetch_403_without_zero_quota_is_api_error() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(json_response(403, serde_json::json!({ "message": "forbidden" })))
        }));
        let err = fetcher(transport).fetch("u").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let transport = Arc::new(MockTransport::new({
            let attempts = AtomicUsize::new(0);
            move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok(json_response(200, serde_json::json!([1])))
                }
            }
        }));
        let value = fetcher(Arc::clone(&transport)).fetch("u").await.unwrap();
        assert_eq!(value, serde_json::json!([1]));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_three_attempts() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(json_response(502, serde_json::json!({})))
        }));
        let err = fetcher(Arc::clone(&transport)).fetch("u").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_garbled_body_is_never_returned() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: "{\"items\": [".to_string(),
            })
        }));
        let err = fetcher(transport).fetch("u").await.unwrap_err();
        assert!(err.to_string().contains("undecodable"));
    }

    #[tokio::test]
    async fn test_rate_limit_snapshot_tracks_latest_response() {
        let transport = Arc::new(MockTransport::new(|_| {
            let mut response = json_response(200, serde_json::json!([]));
            response
                .headers
                .insert("x-ratelimit-remaining".to_string(), "4999".to_string());
            response
                .headers
                .insert("x-ratelimit-limit".to_string(), "5000".to_string());
            Ok(response)
        }));
        let fetcher = fetcher(transport);
        assert!(fetcher.rate_limit().is_none());
        fetcher.fetch("u").await.unwrap();
        let limit = fetcher.rate_limit().unwrap();
        assert_eq!(limit.remaining, 4999);
        assert_eq!(limit.limit, 5000);
    }

    #[tokio::test]
    async fn test_list_pagination_stops_on_short_page() {
        let transport = Arc::new(MockTransport::new(|req| {
            let count = match page_of(&req.url) {
                1 | 2 => PAGE_SIZE,
                _ => 7,
            };
            let items: Vec<Value> = (0..count).map(|i| serde_json::json!(i)).collect();
            Ok(json_response(200, Value::Array(items)))
        }));
        let items = fetcher(Arc::clone(&transport))
            .fetch_all_pages("https://api/list")
            .await
            .unwrap();
        assert_eq!(items.len(), 2 * PAGE_SIZE + 7);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_pagination_stops_on_empty_page() {
        let transport = Arc::new(MockTransport::new(|req| {
            let count = if page_of(&req.url) == 1 { PAGE_SIZE } else { 0 };
            let items: Vec<Value> = (0..count).map(|i| serde_json::json!(i)).collect();
            Ok(json_response(200, Value::Array(items)))
        }));
        let items = fetcher(Arc::clone(&transport))
            .fetch_all_pages("https://api/list")
            .await
            .unwrap();
        assert_eq!(items.len(), PAGE_SIZE);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_pagination_caps_at_result_ceiling() {
        let transport = Arc::new(MockTransport::new(|req| {
            let page = page_of(&req.url);
            let items: Vec<Value> = (0..PAGE_SIZE)
                .map(|i| serde_json::json!({ "n": (page - 1) * PAGE_SIZE + i }))
                .collect();
            Ok(json_response(
                200,
                serde_json::json!({ "total_count": 1500, "items": items }),
            ))
        }));
        let items = fetcher(Arc::clone(&transport))
            .fetch_all_pages("https://api/search/issues?q=x")
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 10);
        assert_eq!(items.len(), SEARCH_RESULT_CEILING);
        assert_eq!(items[0]["n"], 0);
        assert_eq!(items[999]["n"], 999);
    }

    #[tokio::test]
    async fn test_search_pagination_stops_on_empty_page() {
        let transport = Arc::new(MockTransport::new(|req| {
            let items: Vec<Value> = if page_of(&req.url) == 1 {
                (0..PAGE_SIZE).map(|i| serde_json::json!(i)).collect()
            } else {
                Vec::new()
            };
            Ok(json_response(
                200,
                serde_json::json!({ "total_count": 450, "items": items }),
            ))
        }));
        let items = fetcher(Arc::clone(&transport))
            .fetch_all_pages("https://api/search/issues?q=x")
            .await
            .unwrap();
        assert_eq!(items.len(), PAGE_SIZE);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_graphql_errors_are_surfaced() {
        let transport = Arc::new(MockTransport::new(|req| {
            assert_eq!(req.method, Method::Post);
            Ok(json_response(
                200,
                serde_json::json!({ "errors": [{ "message": "bad query" }] }),
            ))
        }));
        let err = fetcher(transport)
            .graphql("query { x }", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad query"));
    }

    #[test]
    fn test_page_url_respects_existing_query() {
        assert_eq!(page_url("https://a/b", 2), "https://a/b?per_page=100&page=2");
        assert_eq!(
            page_url("https://a/b?q=x", 1),
            "https://a/b?q=x&per_page=100&page=1"
        );
    }
}
