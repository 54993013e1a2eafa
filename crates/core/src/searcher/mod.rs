//! Per-source search.
//!
//! This module turns a [`SearchRequest`] into queries for one source,
//! fetches and extracts result pages, and filters what comes back into
//! [`CanonicalResult`]s. Running many sources at once is the
//! orchestrator's job.

mod dedup;
mod extract;
mod filtering;
pub mod normalize;
mod pipeline;
mod query_builder;
mod results;
mod session;
mod subpage;
mod types;

pub use dedup::{deduplicate_results, fingerprint};
pub use extract::{attach_download_headers, extract_api, extract_html};
pub use filtering::{size_range, FilterRules, Rejection, RELEASE_TYPES, RESOLUTIONS};
pub use pipeline::{run_source, shape_query, SearchRun, ShapedQuery, SourceEvent};
pub use query_builder::{
    LanguagePreference, PlannedQuery, QueryPlan, QuerySanitizer, MIN_QUERY_TIME,
};
pub use results::{build_results, rank_results};
pub use session::{Credentials, SourceSession};
pub use subpage::{extract_from_page, needs_subpage, resolve_subpages};
pub use types::*;
