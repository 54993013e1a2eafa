//! Declarative per-source definitions.
//!
//! Definition documents are JSON objects keyed by source id. Files are merged
//! leaf by leaf in load order, aliases are applied, and each source is then
//! compiled into a [`SourceDefinition`] whose expressions are already parsed.

mod alias;
mod merge;
mod registry;
mod source;

pub use alias::{apply_alias, domain_of, root_of};
pub use merge::merge_values;
pub use registry::{merge_document, DefinitionRegistry, SourceSummary};
pub use source::{
    ApiFormat, AuthRecipe, Extraction, HtmlParser, KeywordTemplate, SourceDefinition, SubpageMode,
};

use std::path::PathBuf;
use thiserror::Error;

use crate::markup::SelectorError;

/// Errors raised while loading definitions.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid definition for {source_id}: {reason}")]
    Invalid { source_id: String, reason: String },

    #[error("Invalid {field} expression for {source_id}: {error}")]
    Expression {
        source_id: String,
        field: String,
        error: SelectorError,
    },
}

impl DefinitionError {
    pub(crate) fn invalid(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn expression(source_id: &str, field: &str, error: SelectorError) -> Self {
        Self::Expression {
            source_id: source_id.to_string(),
            field: field.to_string(),
            error,
        }
    }
}
