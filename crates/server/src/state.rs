use std::sync::Arc;
use metaburst_core::{Config, DefinitionRegistry, SanitizedConfig, SearchEngine};

/// Shared application state
pub struct AppState {
    engine: SearchEngine,
    config_hash: String,
}

impl AppState {
    pub fn new(engine: SearchEngine, config_hash: String) -> Self {
        Self {
            engine,
            config_hash,
        }
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        self.engine.registry()
    }

    /// Short hash of the loaded configuration.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(self.config())
    }
}
