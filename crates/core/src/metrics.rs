//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Searches (count, duration, outcome)
//! - Sources (queries, results, auth failures, duration)
//! - Filtering (rejected results)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Searches
// =============================================================================

/// Searches total by kind and outcome.
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_searches_total", "Total searches run"),
        &["kind", "outcome"], // "complete", "timed_out", "invalid"
    )
    .unwrap()
});

/// Search duration in seconds.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("metaburst_search_duration_seconds", "Duration of whole searches")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 20.0, 30.0, 60.0]),
        &["kind"],
    )
    .unwrap()
});

/// Results returned per search.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("metaburst_search_results", "Results returned per search")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Sources
// =============================================================================

/// Queries issued to sources.
pub static SOURCE_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_source_queries_total", "Queries issued per source"),
        &["source", "outcome"], // "ok", "error"
    )
    .unwrap()
});

/// Accepted results per source.
pub static SOURCE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_source_results_total", "Accepted results per source"),
        &["source"],
    )
    .unwrap()
});

/// Source runs by outcome.
pub static SOURCE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_source_runs_total", "Source runs by outcome"),
        &["source", "outcome"], // "complete", "failed", "abandoned"
    )
    .unwrap()
});

/// Authentication failures per source.
pub static AUTH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_auth_failures_total", "Failed source logins"),
        &["source"],
    )
    .unwrap()
});

/// Time a source took from start to its last batch.
pub static SOURCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("metaburst_source_duration_seconds", "Duration of source runs")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Filtering
// =============================================================================

/// Results dropped by the filters, by reason.
pub static RESULTS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaburst_results_rejected_total", "Results dropped by filters"),
        &["reason"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Searches
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        // Sources
        Box::new(SOURCE_QUERIES.clone()),
        Box::new(SOURCE_RESULTS.clone()),
        Box::new(SOURCE_RUNS.clone()),
        Box::new(AUTH_FAILURES.clone()),
        Box::new(SOURCE_DURATION.clone()),
        // Filtering
        Box::new(RESULTS_REJECTED.clone()),
    ]
}
