//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock fetcher injected, so searches run against canned pages
//! without network access.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use metaburst_core::{
    config::SourceSettings, definitions::merge_document, testing::MockFetcher, Config,
    DefinitionRegistry, SearchEngine,
};
use metaburst_server::state::AppState;

/// Re-export fixtures for test convenience
pub use metaburst_core::testing::fixtures;

/// Test fixture with an in-process router and a controllable fetcher.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_search() {
///     let fixture = TestFixture::new().await;
///     fixture.fetcher.respond(URL, 200, fixtures::RESULTS_PAGE).await;
///
///     let response = fixture.post("/api/v1/search/movie", json!({"title": "Movie"})).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock fetcher - configure pages per URL
    pub fetcher: Arc<MockFetcher>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// A source answering at `https://<id>.example.org/search/<query>`.
pub fn source_definition(id: &str) -> Value {
    let mut definition = fixtures::html_definition();
    definition["name"] = json!(id.to_uppercase());
    definition["base_url"] = json!(format!("https://{}.example.org/search/QUERY", id));
    definition["movie_keywords"] = json!("{title}");
    definition["general_keywords"] = json!("{title}");
    definition
}

impl TestFixture {
    /// Create a fixture with two public sources, `alpha` and `beta`.
    pub async fn new() -> Self {
        let mut definitions = serde_json::Map::new();
        definitions.insert("alpha".to_string(), source_definition("alpha"));
        definitions.insert("beta".to_string(), source_definition("beta"));
        definitions.insert("broken".to_string(), json!({"name": "Broken"}));
        Self::with_definitions(definitions, BTreeMap::new()).await
    }

    /// Create a fixture with custom definitions and per-source settings.
    pub async fn with_definitions(
        definitions: serde_json::Map<String, Value>,
        settings: BTreeMap<String, SourceSettings>,
    ) -> Self {
        let mut config = Config::default();
        config.engine.request_spacing_ms = 0;
        config.engine.timeout_secs = 10;
        config.sources = settings;

        let mut documents = BTreeMap::new();
        merge_document(&mut documents, definitions, false);
        let registry = DefinitionRegistry::from_documents(documents, &config.sources);

        let fetcher = Arc::new(MockFetcher::new());
        let engine = SearchEngine::new(Arc::new(config), Arc::new(registry), fetcher.clone());
        let state = Arc::new(AppState::new(engine, "0123456789abcdef".to_string()));
        let router = metaburst_server::api::create_router(state);

        Self { router, fetcher }
    }

    /// Send a GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
