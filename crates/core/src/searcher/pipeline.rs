//! Search of one source.
//!
//! For each planned query the pipeline builds the request, authenticates if
//! needed, fetches and extracts the page, resolves detail pages, then filters
//! and deduplicates the batch. Every non-empty batch is streamed out
//! immediately so the caller can report progress and keep partial results
//! when the deadline hits.

use encoding_rs::{Encoding, UTF_8};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::definitions::{Extraction, SourceDefinition};
use crate::fetch::{FetchRequest, Fetcher};
use crate::metrics::{AUTH_FAILURES, SOURCE_QUERIES, SOURCE_RESULTS};

use super::extract::{attach_download_headers, extract_api, extract_html};
use super::filtering::FilterRules;
use super::query_builder::{LanguagePreference, PlannedQuery, QueryPlan, QuerySanitizer};
use super::results::build_results;
use super::session::{Credentials, SourceSession};
use super::subpage::{needs_subpage, resolve_subpages};
use super::types::{CanonicalResult, MediaKind, SearchError, SearchRequest};

/// Progress of one source task.
#[derive(Debug)]
pub enum SourceEvent {
    /// Accepted results of one query.
    Batch {
        source_id: String,
        results: Vec<CanonicalResult>,
    },
    /// The source is done; `Err` carries the reason it stopped early.
    Finished {
        source_id: String,
        outcome: Result<usize, String>,
    },
}

/// Everything a source task needs besides its definition. Shared by all
/// source tasks of one search.
pub struct SearchRun {
    pub request: Arc<SearchRequest>,
    pub kind: MediaKind,
    pub fetcher: Arc<dyn Fetcher>,
    pub sanitizer: QuerySanitizer,
    pub languages: LanguagePreference,
    pub filters: FilterConfig,
    pub user_agent: String,
    pub request_spacing: Duration,
    pub icons_dir: Option<PathBuf>,
    pub allow_noseeds: bool,
    pub deadline: Instant,
}

impl SearchRun {
    /// Time left before the search deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// A query turned into request parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedQuery {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

/// Run all queries of a source, sending each accepted batch to `events`.
///
/// Returns the number of accepted results. Fetch failures of single queries
/// are logged and skipped; a failed login ends the source.
pub async fn run_source(
    run: &SearchRun,
    source: Arc<SourceDefinition>,
    credentials: Credentials,
    events: &mpsc::Sender<SourceEvent>,
) -> Result<usize, SearchError> {
    let rules = FilterRules::new(&run.filters, run.kind);
    let mut plan = QueryPlan::build(&source, run.kind, &run.request, &run.sanitizer, &run.languages);
    let mut session = SourceSession::new(
        source.clone(),
        run.fetcher.clone(),
        credentials,
        run.user_agent.clone(),
        run.request_spacing,
        run.request.skip_auth,
    );
    let template = source.query_url(run.kind);
    let mut found = 0usize;

    while let Some(planned) = plan.next(found > 0, run.remaining()) {
        let shaped = shape_query(&source, &template, &planned);
        if shaped.url.is_empty() {
            break;
        }

        let url = match session.prepare_url(&shaped.url).await {
            Ok(url) => url,
            Err(e) => {
                AUTH_FAILURES.with_label_values(&[source.id.as_str()]).inc();
                return Err(e);
            }
        };
        info!(source = %source.id, url = %url, "Searching");

        let request = if shaped.form.is_empty() {
            FetchRequest::get(url)
        } else {
            FetchRequest::post(url, shaped.form)
        }
        .headers(source.headers.iter().cloned())
        .query(shaped.query)
        .timeout(run.remaining());

        let response = match session.open(request).await {
            Ok(response) => {
                SOURCE_QUERIES.with_label_values(&[source.id.as_str(), "ok"]).inc();
                response
            }
            Err(e) => {
                SOURCE_QUERIES.with_label_values(&[source.id.as_str(), "error"]).inc();
                warn!(source = %source.id, query = %planned.query, error = %e, "Query failed");
                continue;
            }
        };
        if !response.is_ok() {
            debug!(source = %source.id, status = response.status, "Non-OK search response");
        }

        let records = match &source.extraction {
            Extraction::Html(parser) => extract_html(&source.id, parser, &response.body),
            Extraction::Api(format) => extract_api(&source, format, &response.body),
        };

        let mut direct = Vec::with_capacity(records.len());
        let mut detail = Vec::new();
        for mut record in records {
            record.locator = attach_download_headers(&session, record.locator).await;
            if needs_subpage(&source, &record) {
                detail.push(record);
            } else {
                direct.push(record);
            }
        }
        if !detail.is_empty() {
            direct.extend(resolve_subpages(&source, session.fetcher(), detail).await);
        }

        let title = source.filter_title.then_some(planned.query.as_str());
        let results = build_results(
            &source,
            direct,
            &rules,
            title,
            run.icons_dir.as_deref(),
            run.allow_noseeds,
        );
        if results.is_empty() {
            continue;
        }

        found += results.len();
        SOURCE_RESULTS
            .with_label_values(&[source.id.as_str()])
            .inc_by(results.len() as u64);
        let batch = SourceEvent::Batch {
            source_id: source.id.clone(),
            results,
        };
        if events.send(batch).await.is_err() {
            debug!(source = %source.id, "Collector gone, stopping");
            break;
        }
    }

    Ok(found)
}

/// Build the search URL and form/query fields of a planned query.
///
/// The query and extra are percent-encoded (in the source's charset when it
/// is not UTF-8). Spaces become the source's separator and `FIRSTLETTER`
/// the query's first character. Form and query-string fields get the query
/// decoded again, since the HTTP layer encodes them.
pub fn shape_query(source: &SourceDefinition, template: &str, planned: &PlannedQuery) -> ShapedQuery {
    let query = encode_query(source, &planned.query);
    let extra = encode_query(source, &planned.extra);
    if query.is_empty() {
        return ShapedQuery {
            url: String::new(),
            form: Vec::new(),
            query: Vec::new(),
        };
    }

    let mut url = template.replace("QUERY", &query).replace("EXTRA", &extra);
    url = url.replace(' ', &source.separator);
    if source.separator != "%20" {
        url = url.replace("%20", &source.separator);
    }
    let first: String = query.chars().take(1).collect();
    url = url.replace("FIRSTLETTER", &first);

    let fill = |fields: &[(String, String)]| -> Vec<(String, String)> {
        fields
            .iter()
            .map(|(k, v)| (k.clone(), unquote(&v.replace("QUERY", &query))))
            .collect()
    };

    ShapedQuery {
        url,
        form: fill(&source.post_data),
        query: fill(&source.get_data),
    }
}

fn encode_query(source: &SourceDefinition, text: &str) -> String {
    let encoded = if source.legacy_charset() {
        let encoding = Encoding::for_label(source.charset.as_bytes()).unwrap_or(UTF_8);
        let (bytes, _, _) = encoding.encode(text);
        urlencoding::encode_binary(&bytes).into_owned()
    } else {
        urlencoding::encode(text).into_owned()
    };
    encoded.replace("%2F", "/")
}

fn unquote(text: &str) -> String {
    urlencoding::decode(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}
