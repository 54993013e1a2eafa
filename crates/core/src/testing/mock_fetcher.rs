//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};

/// A canned response for one URL.
#[derive(Debug, Clone)]
struct MockResponse {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
    delay: Option<Duration>,
    error: Option<String>,
}

impl MockResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
            error: None,
        }
    }
}

/// Mock implementation of the Fetcher trait.
///
/// Provides controllable behavior for testing:
/// - Canned responses per URL (query string included)
/// - Response sequences for pages fetched more than once
/// - Simulated delays and connection failures
/// - Recorded requests for assertions
///
/// Unknown URLs answer 404 with an empty body.
///
/// # Example
///
/// ```rust,ignore
/// use metaburst_core::testing::MockFetcher;
///
/// let fetcher = MockFetcher::new();
/// fetcher.respond("https://tracker.example.org/search/foo/", 200, PAGE).await;
///
/// // Run a search with the fetcher...
///
/// let requests = fetcher.requests().await;
/// assert_eq!(requests.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockFetcher {
    /// Responses by URL; the last one of a sequence repeats.
    routes: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    /// Recorded requests.
    requests: Arc<RwLock<Vec<FetchRequest>>>,
    /// Stored cookies as `(domain, name, value)`.
    cookies: Arc<RwLock<Vec<(String, String, String)>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    async fn route(&self, url: &str, responses: Vec<MockResponse>) {
        self.routes
            .write()
            .await
            .insert(url.to_string(), responses.into());
    }

    /// Answer `url` with a status and body.
    pub async fn respond(&self, url: &str, status: u16, body: &str) {
        self.route(url, vec![MockResponse::new(status, body)]).await;
    }

    /// Answer `url` with a status, body and response headers.
    pub async fn respond_with_headers(&self, url: &str, status: u16, body: &str, headers: Vec<(&str, &str)>) {
        let mut response = MockResponse::new(status, body);
        response.headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_string()))
            .collect();
        self.route(url, vec![response]).await;
    }

    /// Answer successive requests to `url` in order, repeating the last.
    pub async fn respond_sequence(&self, url: &str, responses: Vec<(u16, String)>) {
        let responses = responses
            .into_iter()
            .map(|(status, body)| MockResponse::new(status, body))
            .collect();
        self.route(url, responses).await;
    }

    /// Answer `url` only after `delay`.
    pub async fn respond_delayed(&self, url: &str, status: u16, body: &str, delay: Duration) {
        let mut response = MockResponse::new(status, body);
        response.delay = Some(delay);
        self.route(url, vec![response]).await;
    }

    /// Fail requests to `url` with a connection error.
    pub async fn fail(&self, url: &str, error: &str) {
        let mut response = MockResponse::new(0, "");
        response.error = Some(error.to_string());
        self.route(url, vec![response]).await;
    }

    /// Replace the stored cookies with `(domain, name, value)` entries.
    pub async fn set_cookies(&self, cookies: Vec<(&str, &str, &str)>) {
        *self.cookies.write().await = cookies
            .into_iter()
            .map(|(d, n, v)| (d.to_string(), n.to_string(), v.to_string()))
            .collect();
    }

    /// Get recorded requests.
    pub async fn requests(&self) -> Vec<FetchRequest> {
        self.requests.read().await.clone()
    }

    /// Get the URLs of recorded requests.
    pub async fn requested_urls(&self) -> Vec<String> {
        self.requests
            .read()
            .await
            .iter()
            .map(FetchRequest::full_url)
            .collect()
    }

    /// Clear recorded requests.
    pub async fn clear_requests(&self) {
        self.requests.write().await.clear();
    }

    async fn next_response(&self, url: &str) -> MockResponse {
        let mut routes = self.routes.write().await;
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockResponse::new(404, "")),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockResponse::new(404, "")),
            None => MockResponse::new(404, ""),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.full_url();
        self.requests.write().await.push(request.clone());

        let response = self.next_response(&url).await;
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = response.error {
            return Err(FetchError::ConnectionFailed(error));
        }

        Ok(FetchResponse {
            status: response.status,
            url,
            headers: response.headers.into_iter().collect(),
            request_headers: request.headers,
            body: response.body,
        })
    }

    async fn cookies_for(&self, domain: &str) -> Vec<(String, String)> {
        let domain = domain.to_lowercase();
        self.cookies
            .read()
            .await
            .iter()
            .filter(|(d, _, _)| d.contains(&domain))
            .map(|(_, n, v)| (n.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_url_is_404() {
        let fetcher = MockFetcher::new();
        let response = fetcher.fetch(FetchRequest::get("https://a.example.org/")).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(response.body.is_empty());
        assert_eq!(fetcher.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let fetcher = MockFetcher::new();
        fetcher
            .respond_sequence("https://a.example.org/", vec![(200, "one".to_string()), (200, "two".to_string())])
            .await;
        let mut bodies = Vec::new();
        for _ in 0..3 {
            bodies.push(fetcher.fetch(FetchRequest::get("https://a.example.org/")).await.unwrap().body);
        }
        assert_eq!(bodies, vec!["one", "two", "two"]);
    }

    #[tokio::test]
    async fn test_failure_and_query_string_routes() {
        let fetcher = MockFetcher::new();
        fetcher.fail("https://down.example.org/", "refused").await;
        fetcher.respond("https://a.example.org/s?q=x", 200, "hit").await;

        let err = fetcher.fetch(FetchRequest::get("https://down.example.org/")).await;
        assert!(matches!(err, Err(FetchError::ConnectionFailed(_))));

        let request = FetchRequest::get("https://a.example.org/s").query(vec![("q".to_string(), "x".to_string())]);
        assert_eq!(fetcher.fetch(request).await.unwrap().body, "hit");
        assert_eq!(
            fetcher.requested_urls().await,
            vec!["https://down.example.org/", "https://a.example.org/s?q=x"]
        );
    }
}
