use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
    /// Per-source settings keyed by source id.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSettings>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// How each source's accepted results are ordered before truncation.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Resolution,
    Seeds,
    Size,
    #[default]
    Balanced,
}

/// Search engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Overall search budget in seconds (default: 27).
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
    /// Caller-side timeout. When set, the budget is clamped to this minus 3 seconds.
    #[serde(default)]
    pub host_timeout_secs: Option<u64>,
    /// Results kept per source after ranking (default: 5).
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub sort_by: SortMode,
    /// Keep results that report zero seeds.
    #[serde(default)]
    pub allow_noseeds: bool,
    /// Pause between two requests of the same source session.
    #[serde(default = "default_request_spacing")]
    pub request_spacing_ms: u64,
    /// Preferred title language of the caller (e.g. "en").
    #[serde(default)]
    pub host_language: Option<String>,
    /// Sources that never use the host language for titles.
    #[serde(default)]
    pub language_exceptions: Vec<String>,
    /// Directory holding the shared cookie jar.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Directory with `<source id>.png` icons.
    #[serde(default)]
    pub icons_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_engine_timeout(),
            host_timeout_secs: None,
            max_results: default_max_results(),
            sort_by: SortMode::default(),
            allow_noseeds: false,
            request_spacing_ms: default_request_spacing(),
            host_language: None,
            language_exceptions: Vec::new(),
            scratch_dir: default_scratch_dir(),
            icons_dir: None,
        }
    }
}

impl EngineConfig {
    /// The budget actually granted to one search.
    pub fn effective_timeout_secs(&self) -> u64 {
        match self.host_timeout_secs {
            Some(host) => self.timeout_secs.min(host.saturating_sub(3)),
            None => self.timeout_secs,
        }
    }
}

fn default_engine_timeout() -> u64 {
    27
}

fn default_max_results() -> usize {
    5
}

fn default_request_spacing() -> u64 {
    250
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("metaburst")
}

/// Query sanitization settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// A title containing any of these characters gets its template quotes removed.
    #[serde(default = "default_special_chars")]
    pub special_chars: String,
    #[serde(default = "default_true")]
    pub strip_title_quotes: bool,
    /// Remove single quotes from every expanded query.
    #[serde(default)]
    pub filter_quotes: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            special_chars: default_special_chars(),
            strip_title_quotes: true,
            filter_quotes: false,
        }
    }
}

fn default_special_chars() -> String {
    "()\"':.[]<>/\\?".to_string()
}

fn default_true() -> bool {
    true
}

/// Inclusive size range in GB.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SizeRange {
    #[serde(default)]
    pub min_gb: f64,
    #[serde(default = "default_max_size")]
    pub max_gb: f64,
}

impl Default for SizeRange {
    fn default() -> Self {
        Self {
            min_gb: 0.0,
            max_gb: default_max_size(),
        }
    }
}

fn default_max_size() -> f64 {
    10.0
}

/// Result filtering settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub require_resolution: bool,
    #[serde(default)]
    pub require_release_type: bool,
    #[serde(default)]
    pub require_keywords: bool,
    #[serde(default)]
    pub require_size: bool,
    /// Enables the accept/block/require lists.
    #[serde(default)]
    pub additional_filters: bool,
    /// Extra allowed release patterns.
    #[serde(default)]
    pub accept: Vec<String>,
    /// Extra denied release patterns.
    #[serde(default)]
    pub block: Vec<String>,
    /// Keywords that must all appear in a name.
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub size: SizeRange,
    /// Use the per-kind ranges below instead of `size` for non-general searches.
    #[serde(default)]
    pub separate_sizes: bool,
    #[serde(default)]
    pub movies: SizeRange,
    #[serde(default)]
    pub seasons: SizeRange,
    #[serde(default)]
    pub episodes: SizeRange,
    /// Resolution toggles (240p, 480p, 720p, 1080p, 2k, 4k, music). Missing means enabled.
    #[serde(default)]
    pub resolutions: BTreeMap<String, bool>,
    /// Release type toggles (brrip, webdl, cam, ...). Missing means enabled.
    #[serde(default)]
    pub release_types: BTreeMap<String, bool>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            require_resolution: true,
            require_release_type: false,
            require_keywords: false,
            require_size: false,
            additional_filters: false,
            accept: Vec::new(),
            block: Vec::new(),
            require: Vec::new(),
            size: SizeRange::default(),
            separate_sizes: false,
            movies: SizeRange::default(),
            seasons: SizeRange::default(),
            episodes: SizeRange::default(),
            resolutions: BTreeMap::new(),
            release_types: BTreeMap::new(),
        }
    }
}

/// HTTP fetch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout in seconds (default: 20).
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Retries for transient failures (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff between retries, doubled on each attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_fetch_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            proxy_url: None,
            accept_invalid_certs: false,
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    100
}

/// Where source definitions are read from
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DefinitionsConfig {
    /// Definition files merged in order; later files override earlier ones per leaf.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Directory of user-supplied definitions. These are always enabled.
    #[serde(default)]
    pub custom_dir: Option<PathBuf>,
}

/// Media kinds a source is used for.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Contains {
    #[default]
    All,
    Movies,
    Shows,
}

/// Per-source user settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Replacement domain for mirrors (e.g. "https://mirror.example.org").
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub contains: Contains,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub passkey: Option<String>,
}

/// Sanitized config for API responses (credentials redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub query: QueryConfig,
    pub filters: FilterConfig,
    pub fetch: SanitizedFetchConfig,
    pub definitions: DefinitionsConfig,
    pub sources: BTreeMap<String, SanitizedSourceSettings>,
}

/// Fetch config with the proxy address hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFetchConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub proxy_configured: bool,
    pub accept_invalid_certs: bool,
}

/// Source settings without credentials
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub contains: Contains,
    pub username_configured: bool,
    pub password_configured: bool,
    pub passkey_configured: bool,
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            engine: config.engine.clone(),
            query: config.query.clone(),
            filters: config.filters.clone(),
            fetch: SanitizedFetchConfig {
                user_agent: config.fetch.user_agent.clone(),
                timeout_secs: config.fetch.timeout_secs,
                max_retries: config.fetch.max_retries,
                proxy_configured: is_set(&config.fetch.proxy_url),
                accept_invalid_certs: config.fetch.accept_invalid_certs,
            },
            definitions: config.definitions.clone(),
            sources: config
                .sources
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        SanitizedSourceSettings {
                            enabled: s.enabled,
                            alias: s.alias.clone(),
                            contains: s.contains,
                            username_configured: is_set(&s.username),
                            password_configured: is_set(&s.password),
                            passkey_configured: is_set(&s.passkey),
                        },
                    )
                })
                .collect(),
        }
    }
}
