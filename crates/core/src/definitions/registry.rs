//! Loading and lookup of source definitions.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Contains, DefinitionsConfig, SourceSettings};
use crate::searcher::MediaKind;

use super::alias::{apply_alias, root_of};
use super::merge::merge_values;
use super::source::SourceDefinition;
use super::DefinitionError;

/// Short description of a loaded source, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    pub private: bool,
    pub custom: bool,
    pub is_api: bool,
    pub root_url: String,
}

/// All compiled definitions of the process.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    sources: BTreeMap<String, Arc<SourceDefinition>>,
    /// Sources excluded at load time, with the reason.
    rejected: BTreeMap<String, String>,
}

impl DefinitionRegistry {
    /// Read the configured files in order, then the custom directory.
    ///
    /// Unreadable files and invalid sources are logged and skipped.
    pub fn load(config: &DefinitionsConfig, settings: &BTreeMap<String, SourceSettings>) -> Self {
        let mut documents = BTreeMap::new();

        for path in &config.files {
            match read_document(path) {
                Ok(document) => merge_document(&mut documents, document, false),
                Err(e) => warn!(error = %e, "Skipping definitions file"),
            }
        }

        if let Some(dir) = &config.custom_dir {
            for path in custom_files(dir) {
                info!(path = %path.display(), "Importing custom definitions");
                match read_document(&path) {
                    Ok(document) => merge_document(&mut documents, document, true),
                    Err(e) => warn!(error = %e, "Skipping custom definitions file"),
                }
            }
        }

        Self::from_documents(documents, settings)
    }

    /// Compile already merged documents keyed by source id.
    pub fn from_documents(
        documents: BTreeMap<String, Value>,
        settings: &BTreeMap<String, SourceSettings>,
    ) -> Self {
        let mut registry = Self::default();
        for (id, mut document) in documents {
            if let Some(alias) = settings
                .get(&id)
                .and_then(|s| s.alias.as_deref())
                .filter(|a| !a.is_empty())
            {
                if apply_alias(&mut document, alias) {
                    debug!(source = %id, alias = %alias, "Applied URL alias");
                }
            }

            match SourceDefinition::compile(&id, &document) {
                Ok(source) => {
                    registry.sources.insert(id, Arc::new(source));
                }
                Err(e) => {
                    warn!(source = %id, error = %e, "Excluding source with invalid definition");
                    registry.rejected.insert(id, e.to_string());
                }
            }
        }
        info!(
            loaded = registry.sources.len(),
            rejected = registry.rejected.len(),
            "Definitions loaded"
        );
        registry
    }

    pub fn get(&self, id: &str) -> Option<Arc<SourceDefinition>> {
        self.sources.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn rejected(&self) -> &BTreeMap<String, String> {
        &self.rejected
    }

    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.sources
            .values()
            .map(|s| SourceSummary {
                id: s.id.clone(),
                name: s.name.clone(),
                private: s.private,
                custom: s.custom,
                is_api: s.is_api(),
                root_url: s.root_url.clone(),
            })
            .collect()
    }

    /// Sources to query for a media kind.
    ///
    /// A source is used when its settings enable it (falling back to the
    /// definition's own flag) and its `contains` restriction admits the
    /// kind. Custom sources are always used.
    pub fn enabled_for(
        &self,
        kind: MediaKind,
        settings: &BTreeMap<String, SourceSettings>,
    ) -> Vec<Arc<SourceDefinition>> {
        self.sources
            .iter()
            .filter(|(id, source)| {
                if source.custom {
                    return true;
                }
                let (enabled, contains) = match settings.get(*id) {
                    Some(s) => (s.enabled, s.contains),
                    None => (source.enabled, Contains::All),
                };
                enabled && contains_admits(contains, kind)
            })
            .map(|(_, source)| source.clone())
            .collect()
    }
}

fn contains_admits(contains: Contains, kind: MediaKind) -> bool {
    match contains {
        Contains::All => true,
        Contains::Movies => kind == MediaKind::Movie,
        Contains::Shows => !matches!(kind, MediaKind::General | MediaKind::Movie),
    }
}

fn read_document(path: &Path) -> Result<serde_json::Map<String, Value>, DefinitionError> {
    let content = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| DefinitionError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `*.json` files of a directory, sorted by name.
fn custom_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "No custom definitions directory");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// Merge one document's sources into the accumulated set.
///
/// A new `base_url` re-derives `root_url` unless the same document sets it.
pub fn merge_document(
    documents: &mut BTreeMap<String, Value>,
    document: serde_json::Map<String, Value>,
    custom: bool,
) {
    for (id, mut definition) in document {
        let Some(map) = definition.as_object_mut() else {
            warn!(source = %id, "Ignoring non-object definition");
            continue;
        };
        if !map.contains_key("root_url") {
            if let Some(root) = map.get("base_url").and_then(Value::as_str).and_then(root_of) {
                map.insert("root_url".to_string(), Value::String(root));
            }
        }
        if custom {
            map.insert("custom".to_string(), Value::Bool(true));
            map.insert("enabled".to_string(), Value::Bool(true));
        }

        match documents.get_mut(&id) {
            Some(existing) => merge_values(existing, definition),
            None => {
                documents.insert(id, definition);
            }
        }
    }
}
