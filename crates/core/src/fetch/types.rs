//! Types for the fetch layer.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// HTTP method used by sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request issued on behalf of a source.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Header overrides; an empty value removes a default header.
    pub headers: Vec<(String, String)>,
    /// Form fields, sent urlencoded with POST.
    pub form: Vec<(String, String)>,
    /// Query-string fields appended to the URL.
    pub query: Vec<(String, String)>,
    /// Charset label used to decode the body instead of the declared one.
    pub response_charset: Option<String>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            form: Vec::new(),
            query: Vec::new(),
            response_charset: None,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            form,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.headers.extend(headers);
        self
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn response_charset(mut self, charset: Option<String>) -> Self {
        self.response_charset = charset;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// URL including the query-string fields.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let encoded: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, encoded.join("&"))
    }
}

/// A completed exchange. Non-2xx statuses are responses, not errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Response headers with lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Headers actually sent, cookies excluded.
    pub request_headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// HTTP capability used by source pipelines.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform one request, retrying transient failures.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;

    /// `(name, value)` of stored cookies whose domain contains `domain`.
    async fn cookies_for(&self, domain: &str) -> Vec<(String, String)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_appends_query() {
        let request = FetchRequest::get("https://example.org/search")
            .query(vec![("q".into(), "a b".into()), ("page".into(), "1".into())]);
        assert_eq!(request.full_url(), "https://example.org/search?q=a%20b&page=1");

        let request = FetchRequest::get("https://example.org/s?x=1").query(vec![("q".into(), "z".into())]);
        assert_eq!(request.full_url(), "https://example.org/s?x=1&q=z");
    }

    #[test]
    fn test_post_builder() {
        let request = FetchRequest::post("https://example.org/login", vec![("u".into(), "me".into())])
            .header("X-Requested-With", "XMLHttpRequest");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.form.len(), 1);
        assert_eq!(request.headers[0].0, "X-Requested-With");
    }

    #[test]
    fn test_content_type_lookup() {
        let mut response = FetchResponse::default();
        assert_eq!(response.content_type(), "");
        response
            .headers
            .insert("content-type".into(), "application/x-bittorrent".into());
        assert!(response.content_type().contains("bittorrent"));
    }
}
