//! Types for the torrent search system.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::fetch::FetchError;

/// Kind of search requested by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    General,
    Movie,
    Episode,
    Season,
    Anime,
}

impl MediaKind {
    pub const ALL: [MediaKind; 5] = [
        MediaKind::General,
        MediaKind::Movie,
        MediaKind::Episode,
        MediaKind::Season,
        MediaKind::Anime,
    ];

    /// Map a host method name. Episode searches flagged as anime become `Anime`.
    pub fn from_method(method: &str, anime: bool) -> Self {
        match method.to_ascii_lowercase().as_str() {
            "movie" => MediaKind::Movie,
            "episode" | "show" if anime => MediaKind::Anime,
            "episode" | "show" => MediaKind::Episode,
            "season" => MediaKind::Season,
            "anime" => MediaKind::Anime,
            _ => MediaKind::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::General => "general",
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
            MediaKind::Season => "season",
            MediaKind::Anime => "anime",
        }
    }

    /// Prefix of the keyword templates in definitions (`tv_keywords`, ...).
    pub fn keyword_prefix(&self) -> &'static str {
        match self {
            MediaKind::Episode => "tv",
            other => other.as_str(),
        }
    }

    /// Definition key of the URL template (`show_query`, ...).
    pub fn query_key(&self) -> &'static str {
        match self {
            MediaKind::General => "general_query",
            MediaKind::Movie => "movie_query",
            MediaKind::Episode => "show_query",
            MediaKind::Season => "season_query",
            MediaKind::Anime => "anime_query",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search as handed over by the caller. Shared read-only by all source tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Title to search for (`query` for general searches).
    #[serde(default, alias = "query")]
    pub title: String,
    /// Titles per language code, plus `original` and `source`.
    #[serde(default)]
    pub titles: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub year: Option<u32>,
    /// Release years per region.
    #[serde(default)]
    pub years: BTreeMap<String, u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub season: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub episode: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub absolute_number: Option<u32>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub imdb_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub tmdb_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub show_tmdb_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub tvdb_id: Option<String>,
    #[serde(default)]
    pub anime: bool,
    /// Caller shows no progress UI.
    #[serde(default)]
    pub silent: bool,
    /// Treat private sources as already logged in.
    #[serde(default)]
    pub skip_auth: bool,
    /// Overrides the configured search budget.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SearchRequest {
    /// A general search for free text.
    pub fn general(query: impl Into<String>) -> Self {
        let query = query.into();
        let mut titles = BTreeMap::new();
        titles.insert("source".to_string(), query.clone());
        Self {
            title: query,
            titles,
            ..Default::default()
        }
    }

    /// Build a request from a host payload.
    ///
    /// General searches accept a bare string or `{"query": ...}`; language
    /// keys of `titles` are lower-cased.
    pub fn from_payload(payload: serde_json::Value, kind: MediaKind) -> Result<Self, SearchError> {
        let mut request = match payload {
            serde_json::Value::String(query) => Self::general(query),
            other => serde_json::from_value::<SearchRequest>(other)
                .map_err(|e| SearchError::InvalidRequest(e.to_string()))?,
        };
        if kind == MediaKind::General && !request.titles.contains_key("source") {
            request
                .titles
                .insert("source".to_string(), request.title.clone());
        }
        request.titles = request
            .titles
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Ok(request)
    }

    /// Title the query sanitizer inspects for special characters.
    pub fn source_title(&self) -> &str {
        self.titles
            .get("source")
            .map(String::as_str)
            .unwrap_or(&self.title)
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// A record as scraped from one page or API response, before filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub id: Option<String>,
    pub name: String,
    /// Magnet link or torrent URL, possibly still a detail page needing a subpage fetch.
    pub locator: String,
    pub info_hash: String,
    pub size: String,
    pub seeds: String,
    pub peers: String,
    pub referer: Option<String>,
}

/// A filtered, ranked result ready for the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalResult {
    pub id: String,
    pub name: String,
    /// Locator; non-magnet links may carry `|Header=value&...` request headers.
    pub uri: String,
    pub info_hash: String,
    /// Human readable size as reported by the source.
    pub size: String,
    pub size_bytes: u64,
    pub seeds: u32,
    pub peers: u32,
    pub language: String,
    /// Color-tagged source label.
    pub provider: String,
    pub source_id: String,
    pub icon: String,
    /// Resolution category index + 1.
    pub sort_resolution: u32,
    /// (seeds + 1) * 3 * sort_resolution
    pub sort_balance: u64,
}

/// Errors that end one source's search early.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Source task aborted: {0}")]
    Aborted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_kind_from_method() {
        assert_eq!(MediaKind::from_method("movie", false), MediaKind::Movie);
        assert_eq!(MediaKind::from_method("episode", false), MediaKind::Episode);
        assert_eq!(MediaKind::from_method("episode", true), MediaKind::Anime);
        assert_eq!(MediaKind::from_method("season", true), MediaKind::Season);
        assert_eq!(MediaKind::from_method("whatever", false), MediaKind::General);
    }

    #[test]
    fn test_media_kind_definition_keys() {
        assert_eq!(MediaKind::Episode.keyword_prefix(), "tv");
        assert_eq!(MediaKind::Episode.query_key(), "show_query");
        assert_eq!(MediaKind::Anime.keyword_prefix(), "anime");
    }

    #[test]
    fn test_request_from_string_payload() {
        let request = SearchRequest::from_payload(json!("ubuntu iso"), MediaKind::General).unwrap();
        assert_eq!(request.title, "ubuntu iso");
        assert_eq!(request.source_title(), "ubuntu iso");
    }

    #[test]
    fn test_request_from_query_payload() {
        let request =
            SearchRequest::from_payload(json!({"query": "debian"}), MediaKind::General).unwrap();
        assert_eq!(request.title, "debian");
        assert_eq!(request.titles.get("source").map(String::as_str), Some("debian"));
    }

    #[test]
    fn test_request_from_movie_payload() {
        let payload = json!({
            "title": "The Movie",
            "titles": {"EN": "The Movie", "RU": "Фильм", "original": "The Movie"},
            "year": 2020,
            "years": {"ru": 2021},
            "imdb_id": "tt0000001",
            "tmdb_id": 42,
            "season": "3",
            "silent": true
        });
        let request = SearchRequest::from_payload(payload, MediaKind::Movie).unwrap();
        assert_eq!(request.year, Some(2020));
        assert_eq!(request.years.get("ru"), Some(&2021));
        assert_eq!(request.titles.get("ru").map(String::as_str), Some("Фильм"));
        assert_eq!(request.tmdb_id.as_deref(), Some("42"));
        assert_eq!(request.season, Some(3));
        assert!(request.silent);
        assert!(!request.skip_auth);
    }

    #[test]
    fn test_request_rejects_wrong_shape() {
        let result = SearchRequest::from_payload(json!({"title": 5}), MediaKind::Movie);
        assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
    }
}
