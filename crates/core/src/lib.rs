pub mod config;
pub mod definitions;
pub mod fetch;
pub mod markup;
pub mod metrics;
pub mod orchestrator;
pub mod searcher;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    SortMode,
};
pub use definitions::{DefinitionError, DefinitionRegistry, SourceDefinition, SourceSummary};
pub use fetch::{CookieJar, FetchError, FetchRequest, FetchResponse, Fetcher, HttpFetcher};
pub use orchestrator::{EngineError, SearchEngine, SearchProgress, SearchReport};
pub use searcher::{CanonicalResult, MediaKind, SearchError, SearchRequest};
