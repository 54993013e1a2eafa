//! Types for the search orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::searcher::{CanonicalResult, MediaKind};

/// Errors that can occur while building the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP client setup failed.
    #[error("fetch client error: {0}")]
    Fetch(#[from] FetchError),
}

/// Outcome of one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    /// Search ID (UUID).
    pub id: String,
    pub kind: MediaKind,
    /// Merged, deduplicated results, most seeded first.
    pub results: Vec<CanonicalResult>,
    /// Sources still running at the deadline.
    pub timed_out: Vec<String>,
    /// Sources that stopped early, with the reason.
    pub failed: BTreeMap<String, String>,
    pub duration_ms: u64,
}

impl SearchReport {
    pub(crate) fn empty(id: String, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            results: Vec::new(),
            timed_out: Vec::new(),
            failed: BTreeMap::new(),
            duration_ms: 0,
        }
    }
}

/// Coarse progress of the running search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Search ID (UUID); empty before the first search.
    pub search_id: String,
    /// Sources started.
    pub total: usize,
    /// Sources not finished yet.
    pub pending: usize,
    /// Results received so far, before ranking.
    pub results: usize,
    pub elapsed_ms: u64,
    pub done: bool,
}
