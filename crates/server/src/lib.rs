//! HTTP surface of the metaburst search engine.

pub mod api;
pub mod metrics;
pub mod state;
