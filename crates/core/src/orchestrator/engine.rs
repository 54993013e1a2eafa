//! Concurrent search across all enabled sources.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::definitions::DefinitionRegistry;
use crate::fetch::{CookieJar, Fetcher, HttpFetcher};
use crate::metrics::{SEARCHES_TOTAL, SEARCH_DURATION, SEARCH_RESULTS, SOURCE_DURATION, SOURCE_RUNS};
use crate::searcher::{
    deduplicate_results, rank_results, run_source, CanonicalResult, Credentials,
    LanguagePreference, MediaKind, QuerySanitizer, SearchError, SearchRequest, SearchRun,
    SourceEvent,
};

use super::types::{EngineError, SearchProgress, SearchReport};

/// How often progress is published while sources run.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Name of the persisted cookie file inside the scratch directory.
const COOKIE_FILE: &str = "common_cookies.json";

/// Runs searches against every enabled source at once.
pub struct SearchEngine {
    config: Arc<Config>,
    registry: Arc<DefinitionRegistry>,
    fetcher: Arc<dyn Fetcher>,
    progress: watch::Sender<SearchProgress>,
}

impl SearchEngine {
    pub fn new(config: Arc<Config>, registry: Arc<DefinitionRegistry>, fetcher: Arc<dyn Fetcher>) -> Self {
        let (progress, _) = watch::channel(SearchProgress::default());
        Self {
            config,
            registry,
            fetcher,
            progress,
        }
    }

    /// Build the engine from configuration: load definitions and set up the
    /// HTTP client with the persisted cookie jar.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let jar = Arc::new(CookieJar::new(config.engine.scratch_dir.join(COOKIE_FILE)));
        let fetcher = HttpFetcher::new(&config.fetch, jar)?;
        let registry = DefinitionRegistry::load(&config.definitions, &config.sources);
        Ok(Self::new(Arc::new(config), Arc::new(registry), Arc::new(fetcher)))
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Watch the progress of running searches.
    pub fn subscribe(&self) -> watch::Receiver<SearchProgress> {
        self.progress.subscribe()
    }

    /// Search for a host payload, returning only the results.
    ///
    /// `method` is the host's search method (`movie`, `episode`, ...). An
    /// unusable payload yields no results.
    pub async fn search_payload(&self, payload: serde_json::Value, method: &str) -> Vec<CanonicalResult> {
        let anime = payload
            .get("anime")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let kind = MediaKind::from_method(method, anime);

        match SearchRequest::from_payload(payload, kind) {
            Ok(request) => self.search(request, kind).await.results,
            Err(e) => {
                warn!(method = %method, error = %e, "Rejected search payload");
                SEARCHES_TOTAL.with_label_values(&[kind.as_str(), "invalid"]).inc();
                Vec::new()
            }
        }
    }

    /// Run one search over every enabled source.
    ///
    /// Sources run concurrently until they finish or the search budget runs
    /// out. Sources still running at the deadline are abandoned and keep the
    /// batches they already delivered. One failing source never affects the
    /// others.
    pub async fn search(&self, request: SearchRequest, kind: MediaKind) -> SearchReport {
        let started = Instant::now();
        let search_id = Uuid::new_v4().to_string();
        let effective = Duration::from_secs(self.config.engine.effective_timeout_secs());
        // A payload may shorten the budget, never extend it past the host clamp.
        let budget = request
            .timeout_secs
            .map_or(effective, |t| Duration::from_secs(t).min(effective));
        let deadline = started
            .checked_add(budget)
            .or_else(|| started.checked_add(effective))
            .unwrap_or(started);

        let sources = self.registry.enabled_for(kind, &self.config.sources);
        if sources.is_empty() {
            info!(search_id = %search_id, kind = %kind, "No enabled sources");
            SEARCHES_TOTAL.with_label_values(&[kind.as_str(), "complete"]).inc();
            return SearchReport::empty(search_id, kind);
        }

        info!(
            search_id = %search_id,
            kind = %kind,
            title = %request.title,
            sources = sources.len(),
            budget_secs = budget.as_secs(),
            "Starting search"
        );

        let engine = &self.config.engine;
        let run = Arc::new(SearchRun {
            request: Arc::new(request),
            kind,
            fetcher: self.fetcher.clone(),
            sanitizer: QuerySanitizer::new(&self.config.query),
            languages: LanguagePreference {
                host_language: engine.host_language.clone(),
                exceptions: engine.language_exceptions.clone(),
            },
            filters: self.config.filters.clone(),
            user_agent: self.config.fetch.user_agent.clone(),
            request_spacing: Duration::from_millis(engine.request_spacing_ms),
            icons_dir: engine.icons_dir.clone(),
            allow_noseeds: engine.allow_noseeds,
            deadline,
        });

        let (tx, mut rx) = mpsc::channel(64);
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(sources.len());
        for source in sources {
            let credentials = Credentials::from_settings(self.config.sources.get(&source.id));
            let run = run.clone();
            let tx = tx.clone();
            let id = source.id.clone();
            let handle = tokio::spawn(async move {
                let source_started = Instant::now();
                let source_id = source.id.clone();
                let outcome = run_source(&run, source, credentials, &tx)
                    .await
                    .map_err(|e| e.to_string());
                SOURCE_DURATION
                    .with_label_values(&[source_id.as_str()])
                    .observe(source_started.elapsed().as_secs_f64());
                let _ = tx.send(SourceEvent::Finished { source_id, outcome }).await;
            });
            handles.push((id, handle));
        }
        drop(tx);

        let total = handles.len();
        let mut collector = Collector::new(handles.iter().map(|(id, _)| id.clone()));
        let mut deadline_hit = false;

        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while !collector.pending.is_empty() {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => collector.accept(event),
                    // Every task is gone; the rest ended without reporting.
                    None => break,
                },
                _ = ticker.tick() => {
                    self.publish(&search_id, total, &collector, started, false);
                    debug!(
                        search_id = %search_id,
                        pending = collector.pending.len(),
                        results = collector.received,
                        "Search progress"
                    );
                }
                _ = &mut sleep => {
                    deadline_hit = true;
                    break;
                }
            }
        }
        // Events sent before the deadline still count.
        while let Ok(event) = rx.try_recv() {
            collector.accept(event);
        }
        drop(rx);

        let mut timed_out = Vec::new();
        for (id, handle) in &handles {
            if !collector.pending.contains(id) {
                continue;
            }
            if handle.is_finished() {
                warn!(source = %id, "Source task ended without reporting");
                SOURCE_RUNS.with_label_values(&[id.as_str(), "failed"]).inc();
                let reason = SearchError::Aborted("task ended without reporting".to_string());
                collector.failed.insert(id.clone(), reason.to_string());
            } else {
                handle.abort();
                SOURCE_RUNS.with_label_values(&[id.as_str(), "abandoned"]).inc();
                timed_out.push(id.clone());
            }
        }
        if !timed_out.is_empty() {
            warn!(search_id = %search_id, sources = ?timed_out, "Search deadline reached, abandoning sources");
        }

        // Finished sources first in completion order, the others after.
        let mut order = std::mem::take(&mut collector.finished_order);
        order.extend(
            handles
                .iter()
                .map(|(id, _)| id.clone())
                .filter(|id| collector.pending.contains(id)),
        );

        let mut merged = Vec::new();
        for id in &order {
            if let Some(results) = collector.collected.remove(id) {
                merged.extend(rank_results(results, engine.sort_by, engine.max_results));
            }
        }
        let results = deduplicate_results(merged, engine.allow_noseeds);

        let elapsed = started.elapsed();
        let outcome = if deadline_hit { "timed_out" } else { "complete" };
        SEARCHES_TOTAL.with_label_values(&[kind.as_str(), outcome]).inc();
        SEARCH_DURATION
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
        SEARCH_RESULTS
            .with_label_values(&[kind.as_str()])
            .observe(results.len() as f64);
        self.publish(&search_id, total, &collector, started, true);

        info!(
            search_id = %search_id,
            results = results.len(),
            timed_out = timed_out.len(),
            failed = collector.failed.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Search finished"
        );

        SearchReport {
            id: search_id,
            kind,
            results,
            timed_out,
            failed: collector.failed,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    fn publish(&self, search_id: &str, total: usize, collector: &Collector, started: Instant, done: bool) {
        self.progress.send_replace(SearchProgress {
            search_id: search_id.to_string(),
            total,
            pending: collector.pending.len(),
            results: collector.received,
            elapsed_ms: started.elapsed().as_millis() as u64,
            done,
        });
    }
}

/// Results and outcomes gathered from the source tasks of one search.
struct Collector {
    pending: HashSet<String>,
    collected: HashMap<String, Vec<CanonicalResult>>,
    finished_order: Vec<String>,
    failed: BTreeMap<String, String>,
    received: usize,
}

impl Collector {
    fn new(ids: impl Iterator<Item = String>) -> Self {
        Self {
            pending: ids.collect(),
            collected: HashMap::new(),
            finished_order: Vec::new(),
            failed: BTreeMap::new(),
            received: 0,
        }
    }

    fn accept(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Batch { source_id, results } => {
                debug!(source = %source_id, results = results.len(), "Batch received");
                self.received += results.len();
                self.collected.entry(source_id).or_default().extend(results);
            }
            SourceEvent::Finished { source_id, outcome } => {
                self.pending.remove(&source_id);
                match outcome {
                    Ok(found) => {
                        debug!(source = %source_id, found, "Source finished");
                        SOURCE_RUNS.with_label_values(&[source_id.as_str(), "complete"]).inc();
                    }
                    Err(reason) => {
                        warn!(source = %source_id, error = %reason, "Source failed");
                        SOURCE_RUNS.with_label_values(&[source_id.as_str(), "failed"]).inc();
                        self.failed.insert(source_id.clone(), reason);
                    }
                }
                self.finished_order.push(source_id);
            }
        }
    }
}
