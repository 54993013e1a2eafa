//! reqwest-backed [`Fetcher`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FetchConfig;

use super::cookies::CookieJar;
use super::types::{FetchError, FetchRequest, FetchResponse, Fetcher, Method};

/// Statuses worth another attempt.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// HTTP client shared by every source session of the process.
pub struct HttpFetcher {
    client: Client,
    jar: Arc<CookieJar>,
    user_agent: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    /// Create a new HttpFetcher with the given configuration.
    pub fn new(config: &FetchConfig, jar: Arc<CookieJar>) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(jar.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs);

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let proxy =
                reqwest::Proxy::all(proxy_url).map_err(|e| FetchError::Setup(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            jar,
            user_agent: config.user_agent.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    async fn send_once(
        &self,
        request: &FetchRequest,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url).form(&request.form),
        };
        builder = builder.headers(headers.clone());
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder.send().await
    }

    async fn fetch_with_retry(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.full_url();
        reqwest::Url::parse(&url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let sent_headers = merge_headers(browser_headers(&url, &self.user_agent), &request.headers);
        let header_map = to_header_map(&sent_headers);

        let mut attempt = 0;
        loop {
            let can_retry = attempt < self.max_retries;
            match self.send_once(request, &url, &header_map).await {
                Ok(response)
                    if can_retry && RETRY_STATUSES.contains(&response.status().as_u16()) =>
                {
                    debug!(url = %url, status = %response.status(), attempt, "Retrying request");
                }
                Ok(response) => {
                    return read_response(response, sent_headers, request.response_charset.as_deref())
                        .await;
                }
                Err(e) if can_retry && (e.is_timeout() || e.is_connect()) => {
                    debug!(url = %url, error = %e, attempt, "Retrying request");
                }
                Err(e) => return Err(classify_error(e)),
            }
            tokio::time::sleep(self.retry_backoff * 2u32.pow(attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        if request.url.starts_with("magnet:") {
            return Ok(FetchResponse {
                status: StatusCode::OK.as_u16(),
                url: request.url.clone(),
                body: request.url,
                ..Default::default()
            });
        }

        self.jar.load().await;
        let result = self.fetch_with_retry(&request).await;
        self.jar.save().await;

        match &result {
            Ok(response) => debug!(
                url = %response.url,
                status = response.status,
                bytes = response.body.len(),
                "Fetched"
            ),
            Err(e) => warn!(url = %request.url, error = %e, "Fetch failed"),
        }
        result
    }

    async fn cookies_for(&self, domain: &str) -> Vec<(String, String)> {
        self.jar.cookies_for(domain)
    }
}

/// Headers a desktop browser would send to `url`.
pub fn browser_headers(url: &str, user_agent: &str) -> Vec<(String, String)> {
    vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Cache-Control".to_string(), "no-cache".to_string()),
        ("Content-Language".to_string(), "en-US".to_string()),
        ("Origin".to_string(), url.to_string()),
        ("Referer".to_string(), url.to_string()),
        ("User-Agent".to_string(), user_agent.to_string()),
    ]
}

/// Apply overrides to `defaults`, matching names case-insensitively.
/// An override with an empty value removes the header.
pub fn merge_headers(
    defaults: Vec<(String, String)>,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged = defaults;
    for (name, value) in overrides {
        merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        if !value.is_empty() {
            merged.push((name.clone(), value.clone()));
        }
    }
    merged
}

fn to_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => debug!(header = %name, "Skipping invalid header"),
        }
    }
    map
}

async fn read_response(
    response: reqwest::Response,
    request_headers: Vec<(String, String)>,
    response_charset: Option<&str>,
) -> Result<FetchResponse, FetchError> {
    let status = response.status().as_u16();
    let url = response.url().to_string();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
        .collect();

    let bytes = response.bytes().await.map_err(classify_error)?;
    let content_type = headers.get("content-type").map(String::as_str).unwrap_or("");
    let body = decode_body(&bytes, response_charset, content_type);

    Ok(FetchResponse {
        status,
        url,
        headers,
        request_headers,
        body,
    })
}

/// Decode a body with the forced charset, else the declared one, else UTF-8.
pub fn decode_body(bytes: &[u8], forced: Option<&str>, content_type: &str) -> String {
    let declared = content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .next()
        .map(|c| c.trim_matches('"'));

    let encoding = forced
        .or(declared)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn classify_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::ConnectionFailed(e.to_string())
    } else if e.is_builder() {
        FetchError::InvalidUrl(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}
