//! Search API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metaburst_core::{
    definitions::SourceSummary, CanonicalResult, MediaKind, SearchProgress, SearchReport,
    SearchRequest,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub id: String,
    pub kind: MediaKind,
    pub results: Vec<CanonicalResult>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub timed_out: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failed: BTreeMap<String, String>,
}

impl From<SearchReport> for SearchResponse {
    fn from(report: SearchReport) -> Self {
        Self {
            id: report.id,
            kind: report.kind,
            results: report.results,
            duration_ms: report.duration_ms,
            timed_out: report.timed_out,
            failed: report.failed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    /// Only list sources used for this search method.
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceSummary>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rejected: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/search/{method}
///
/// Search all enabled sources. The body is the host payload for `method`
/// (`movie`, `episode`, `season`, `anime`, anything else is a general search).
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<SearchResponse>, impl IntoResponse> {
    let anime = payload
        .get("anime")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let kind = MediaKind::from_method(&method, anime);

    let request = match SearchRequest::from_payload(payload, kind) {
        Ok(request) => request,
        Err(e) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    };

    let report = state.engine().search(request, kind).await;
    info!(
        search_id = %report.id,
        kind = %kind,
        results = report.results.len(),
        "Search served"
    );
    Ok(Json(SearchResponse::from(report)))
}

/// GET /api/v1/search/progress
///
/// Progress of the latest search.
pub async fn get_progress(State(state): State<Arc<AppState>>) -> Json<SearchProgress> {
    let progress = state.engine().subscribe().borrow().clone();
    Json(progress)
}

/// GET /api/v1/sources
///
/// List loaded definitions and the ones rejected at load time.
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Json<SourcesResponse> {
    let registry = state.registry();
    let sources = match query.method {
        Some(method) => {
            let kind = MediaKind::from_method(&method, false);
            let enabled: Vec<String> = registry
                .enabled_for(kind, &state.config().sources)
                .iter()
                .map(|s| s.id.clone())
                .collect();
            registry
                .summaries()
                .into_iter()
                .filter(|s| enabled.contains(&s.id))
                .collect()
        }
        None => registry.summaries(),
    };

    Json(SourcesResponse {
        sources,
        rejected: registry.rejected().clone(),
    })
}
