//! Search orchestrator.
//!
//! The orchestrator fans a search out to every enabled source:
//! - **Sources**: one task per source, run concurrently
//! - **Collection**: batches are gathered as they arrive, with periodic progress
//! - **Deadline**: sources still running when the budget is spent are abandoned

mod engine;
mod types;

pub use engine::SearchEngine;
pub use types::{EngineError, SearchProgress, SearchReport};
