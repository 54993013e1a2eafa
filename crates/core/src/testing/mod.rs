//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`Fetcher`](crate::fetch::Fetcher) and
//! definition fixtures, allowing source pipelines and whole searches to be
//! tested without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use metaburst_core::testing::{fixtures, MockFetcher};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.respond("https://tracker.example.org/search/Movie/", 200, fixtures::RESULTS_PAGE).await;
//!
//! let source = fixtures::html_source_with(serde_json::json!({"movie_keywords": "{title}"}));
//! // Run the source with the fetcher...
//! ```

mod mock_fetcher;

pub use mock_fetcher::MockFetcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::definitions::{merge_values, SourceDefinition};

    /// A results table with a magnet row (12 seeds) and a torrent-file row
    /// (5 seeds).
    pub const RESULTS_PAGE: &str = r#"
        <html><body>
        <table class="nav"><tr><td>ignore</td></tr></table>
        <table class="list">
          <tr><th>Name</th><th>Link</th><th>Size</th><th>S</th><th>L</th></tr>
          <tr><td>x</td><td><a href="/t/1">Movie.2020.1080p.BluRay</a></td>
              <td><a class="magnet" href="magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567">m</a></td>
              <td>1.4 GB</td><td>12</td><td>3</td></tr>
          <tr><td>x</td><td><a href="/t/2">Movie.2020.720p.WEB</a></td>
              <td><a class="magnet" href="https://tracker.example.org/dl/2.torrent">t</a></td>
              <td>700 MB</td><td>5</td><td>1</td></tr>
        </table>
        </body></html>"#;

    /// Base definition of an HTML source with id `example`.
    pub fn html_definition() -> Value {
        json!({
            "name": "Example",
            "enabled": true,
            "base_url": "https://tracker.example.org/search/QUERY/",
            "parser": {
                "row": "table[class=list] > tr:*1",
                "name": "td:1 > a:0",
                "torrent": "a[class=magnet]:0 | attr(href)",
                "size": "td:3",
                "seeds": "td:4",
                "peers": "td:5"
            }
        })
    }

    /// Compile the base HTML source with `overrides` merged over it.
    pub fn html_source_with(overrides: Value) -> SourceDefinition {
        let mut definition = html_definition();
        merge_values(&mut definition, overrides);
        SourceDefinition::compile("example", &definition).expect("fixture definition compiles")
    }

    /// An API source returning movies with nested torrents.
    pub fn api_source() -> SourceDefinition {
        let definition = json!({
            "name": "Api",
            "enabled": true,
            "base_url": "https://api.example.org/list?query_term=QUERY",
            "is_api": true,
            "api_format": {
                "results": "data.movies",
                "subresults": "torrents",
                "name": "title_long",
                "torrent": "url",
                "info_hash": "hash",
                "quality": "quality",
                "size": "size_bytes",
                "seeds": "seeds",
                "peers": "peers"
            }
        });
        SourceDefinition::compile("api", &definition).expect("fixture definition compiles")
    }
}
