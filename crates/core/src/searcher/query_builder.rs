//! Expansion of keyword templates into concrete queries.
//!
//! Templates such as `{title:fr} {year}` or `{title} s{season:2}e{episode:2}`
//! are expanded against the request once per source. The resulting
//! [`QueryPlan`] hands queries out lazily so fallback tiers can be skipped
//! after the first results arrive.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::debug;

use crate::config::QueryConfig;
use crate::definitions::{KeywordTemplate, SourceDefinition};

use super::types::{MediaKind, SearchRequest};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(.*?)\}").unwrap());
static QUOTED_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["'](\{title.*?\})["']"#).unwrap());

/// Queries are not issued with less than this left before the deadline.
pub const MIN_QUERY_TIME: Duration = Duration::from_secs(3);

/// Quote handling applied to templates and expanded queries.
#[derive(Debug, Clone)]
pub struct QuerySanitizer {
    special_chars: String,
    strip_title_quotes: bool,
    filter_quotes: bool,
}

impl QuerySanitizer {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            special_chars: config.special_chars.clone(),
            strip_title_quotes: config.strip_title_quotes,
            filter_quotes: config.filter_quotes,
        }
    }

    /// Whether a title contains one of the special characters.
    pub fn has_special(&self, title: &str) -> bool {
        title.chars().any(|c| self.special_chars.contains(c))
    }

    /// Remove quotes around `{title...}` placeholders when the title has
    /// special characters.
    pub fn prepare_template(&self, template: &str, has_special: bool) -> String {
        if self.strip_title_quotes && has_special {
            QUOTED_TITLE.replace_all(template, "$1").into_owned()
        } else {
            template.to_string()
        }
    }

    /// Final pass over an expanded query.
    pub fn finish(&self, query: String) -> String {
        if self.filter_quotes {
            query.replace('\'', "")
        } else {
            query
        }
    }
}

impl Default for QuerySanitizer {
    fn default() -> Self {
        Self::new(&QueryConfig::default())
    }
}

/// Host language settings used to pick title translations.
#[derive(Debug, Clone, Default)]
pub struct LanguagePreference {
    pub host_language: Option<String>,
    /// Sources that ignore the host language.
    pub exceptions: Vec<String>,
}

/// One query ready to be issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub query: String,
    pub extra: String,
    pub priority: u32,
}

/// Ordered queries of one source for one search.
#[derive(Debug)]
pub struct QueryPlan {
    pending: VecDeque<PlannedQuery>,
    used: HashSet<String>,
    last_priority: u32,
}

impl QueryPlan {
    pub fn build(
        source: &SourceDefinition,
        kind: MediaKind,
        request: &SearchRequest,
        sanitizer: &QuerySanitizer,
        languages: &LanguagePreference,
    ) -> Self {
        let expander = Expander {
            source,
            kind,
            request,
            languages,
        };
        let has_special = sanitizer.has_special(request.source_title());
        let years = distinct_years(request);

        let mut pending = VecDeque::new();
        for template in source.templates(kind) {
            for keywords in split_template(template, kind, &years) {
                let keywords = sanitizer.prepare_template(&keywords, has_special);
                let extra = sanitizer.prepare_template(&template.extra, has_special);

                let Some(query) = expander.expand(&keywords) else {
                    debug!(source = %source.id, template = %keywords, "Skipping query with unavailable values");
                    continue;
                };
                let extra = expander.expand(&extra).unwrap_or_default();
                pending.push_back(PlannedQuery {
                    query: sanitizer.finish(query),
                    extra: sanitizer.finish(extra),
                    priority: template.priority,
                });
            }
        }

        Self {
            pending,
            used: HashSet::new(),
            last_priority: 1,
        }
    }

    /// Next query to issue.
    ///
    /// Empty and repeated queries are dropped, fallback tiers are skipped
    /// once the source has results, and nothing is issued with less than
    /// [`MIN_QUERY_TIME`] remaining.
    pub fn next(&mut self, has_results: bool, remaining: Duration) -> Option<PlannedQuery> {
        while let Some(planned) = self.pending.pop_front() {
            if planned.query.trim().is_empty() {
                continue;
            }
            let key = format!("{}{}", planned.query, planned.extra);
            if self.used.contains(&key) {
                continue;
            }
            if planned.priority > self.last_priority && has_results {
                debug!(query = %planned.query, "Skipping fallback query, results already found");
                continue;
            }
            if remaining < MIN_QUERY_TIME {
                debug!(query = %planned.query, "Skipping query, search budget almost spent");
                continue;
            }
            self.used.insert(key);
            self.last_priority = planned.priority;
            return Some(planned);
        }
        None
    }

    pub fn remaining_queries(&self) -> usize {
        self.pending.len()
    }
}

/// Distinct release years keyed by region, `default` being the main year.
/// Only meaningful with more than one entry.
fn distinct_years(request: &SearchRequest) -> BTreeMap<String, u32> {
    let Some(year) = request.year else {
        return BTreeMap::new();
    };
    if request.years.is_empty() {
        return BTreeMap::new();
    }

    let mut all = request.years.clone();
    all.insert("default".to_string(), year);

    let mut seen = HashSet::new();
    let mut distinct = BTreeMap::new();
    // The main year claims its value before any region does.
    seen.insert(year);
    distinct.insert("default".to_string(), year);
    for (region, value) in all {
        if seen.insert(value) {
            distinct.insert(region, value);
        }
    }
    distinct
}

/// One template per requested title language and per distinct year.
fn split_template(
    template: &KeywordTemplate,
    kind: MediaKind,
    years: &BTreeMap<String, u32>,
) -> Vec<String> {
    let text = &template.keywords;
    let mut variants = vec![text.clone()];

    for caps in PLACEHOLDER.captures_iter(text) {
        let raw = &caps[1];
        let keyword = raw.to_lowercase();
        if !keyword.starts_with("title") || !keyword.contains(':') {
            continue;
        }
        let placeholder = format!("{{{}}}", raw);
        if kind == MediaKind::General {
            variants = vec![text.replace(&placeholder, "{title}")];
            break;
        }
        let langs: Vec<&str> = keyword.split(':').skip(1).collect();
        if langs.len() < 2 {
            continue;
        }
        variants = langs
            .iter()
            .map(|lang| text.replace(&placeholder, &format!("{{title:{}}}", lang)))
            .collect();
        break;
    }

    if years.len() > 1 {
        variants = variants
            .into_iter()
            .flat_map(|variant| {
                if variant.contains("{year}") {
                    years
                        .keys()
                        .map(|region| variant.replace("{year}", &format!("{{year:{}}}", region)))
                        .collect()
                } else {
                    vec![variant]
                }
            })
            .collect();
    }
    variants
}

/// Placeholder resolution for one source and request.
struct Expander<'a> {
    source: &'a SourceDefinition,
    kind: MediaKind,
    request: &'a SearchRequest,
    languages: &'a LanguagePreference,
}

impl Expander<'_> {
    /// Expand every placeholder. `None` means the query cannot be built.
    fn expand(&self, text: &str) -> Option<String> {
        let mut out = text.to_string();
        for caps in PLACEHOLDER.captures_iter(text) {
            let raw = &caps[1];
            if let Some(value) = self.resolve(&raw.to_lowercase())? {
                out = out.replace(&format!("{{{}}}", raw), &value);
            }
        }
        Some(out)
    }

    /// `Some(None)` leaves an unknown placeholder untouched.
    fn resolve(&self, keyword: &str) -> Option<Option<String>> {
        let (name, modifier) = split_keyword(keyword);
        let request = self.request;
        let value = match name {
            "title" => self.title(modifier.and_then(|m| m.strip_prefix(':')))?,
            "year" => match modifier.and_then(|m| m.strip_prefix(':')) {
                None | Some("default") => request.year.map(|y| y.to_string()).unwrap_or_default(),
                Some(region) => request
                    .years
                    .get(region)
                    .map(|y| y.to_string())
                    .unwrap_or_default(),
            },
            "imdb_id" => request.imdb_id.clone().unwrap_or_default(),
            "tmdb_id" => request.tmdb_id.clone().unwrap_or_default(),
            "show_tmdb_id" => request.show_tmdb_id.clone().unwrap_or_default(),
            "tvdb_id" => request.tvdb_id.clone().unwrap_or_default(),
            "season" => format_number(request.season?, modifier)?,
            "episode" => format_number(request.episode?, modifier)?,
            "absolute_episode" => format_number(request.absolute_number?, modifier)?,
            _ => return Some(None),
        };
        Some(Some(value))
    }

    /// Title for an optional explicit language.
    ///
    /// Without one, the host language is tried (unless the source is
    /// exempt), then the source's language, then the main title. An explicit
    /// or chosen language without a translation yields no query.
    fn title(&self, explicit: Option<&str>) -> Option<String> {
        let request = self.request;
        let main_title = match request.titles.get("original") {
            Some(original) if request.title.is_empty() => original.clone(),
            _ => request.title.clone(),
        };
        if self.kind == MediaKind::General || request.titles.is_empty() {
            return Some(main_title);
        }

        let has = |lang: &str| request.titles.contains_key(lang);
        let exempt = self.languages.exceptions.iter().any(|e| e == &self.source.id);
        let language = explicit
            .map(str::to_string)
            .or_else(|| {
                self.languages
                    .host_language
                    .as_ref()
                    .filter(|l| !exempt && has(l))
                    .cloned()
            })
            .or_else(|| self.source.language.as_ref().filter(|l| has(l)).cloned());

        let Some(language) = language else {
            return Some(main_title);
        };
        let translated = request
            .titles
            .get(&language)
            .filter(|t| !t.trim().is_empty())?;

        let mut title = translated.clone();
        for c in self.source.remove_special_characters.chars() {
            title = title.replace(c, "");
        }
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        debug!(source = %self.source.id, language = %language, title = %title, "Using translated title");
        Some(title)
    }
}

/// `season+1` -> ("season", Some("+1")), `title:fr` -> ("title", Some(":fr")).
fn split_keyword(keyword: &str) -> (&str, Option<&str>) {
    match keyword.find(|c| c == ':' || c == '+') {
        Some(pos) => (&keyword[..pos], Some(&keyword[pos..])),
        None => (keyword, None),
    }
}

/// Widest zero padding a `:W` modifier may ask for.
const MAX_PADDING: usize = 8;

/// Apply `+N` (offset) or `:W` (zero padding) to a number. An offset that
/// overflows yields `None`, which skips the query.
fn format_number(value: u32, modifier: Option<&str>) -> Option<String> {
    match modifier {
        Some(m) if m.starts_with('+') => {
            let offset: u32 = m[1..].trim().parse().unwrap_or(0);
            value.checked_add(offset).map(|v| v.to_string())
        }
        Some(m) if m.starts_with(':') => {
            let width: usize = m[1..].trim().parse().unwrap_or(0);
            Some(format!("{:0width$}", value, width = width.min(MAX_PADDING)))
        }
        _ => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::html_source_with;
    use serde_json::json;

    fn request(title: &str) -> SearchRequest {
        SearchRequest {
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn plan(source: &SourceDefinition, kind: MediaKind, request: &SearchRequest) -> Vec<PlannedQuery> {
        let mut plan = QueryPlan::build(
            source,
            kind,
            request,
            &QuerySanitizer::default(),
            &LanguagePreference::default(),
        );
        let mut out = Vec::new();
        while let Some(q) = plan.next(false, Duration::from_secs(30)) {
            out.push(q);
        }
        out
    }

    #[test]
    fn test_episode_placeholders() {
        let source = html_source_with(json!({
            "tv_keywords": "{title} s{season:2}e{episode:2}",
            "tv_keywords2": "{title} {season}x{episode+1}"
        }));
        let mut request = request("Show");
        request.season = Some(3);
        request.episode = Some(7);

        let queries: Vec<String> = plan(&source, MediaKind::Episode, &request)
            .into_iter()
            .map(|q| q.query)
            .collect();
        assert_eq!(queries, vec!["Show s03e07", "Show 3x8"]);
    }

    #[test]
    fn test_offset_overflow_skips_query() {
        let source = html_source_with(json!({
            "tv_keywords": "{title} {season+1}",
            "tv_keywords2": "{title} s{season:2}"
        }));
        let mut request = request("Show");
        request.season = Some(u32::MAX);
        request.episode = Some(1);

        let queries: Vec<String> = plan(&source, MediaKind::Episode, &request)
            .into_iter()
            .map(|q| q.query)
            .collect();
        assert_eq!(queries, vec![format!("Show s{}", u32::MAX)]);
    }

    #[test]
    fn test_missing_numbers_skip_query() {
        let source = html_source_with(json!({
            "anime_keywords": "{title} {absolute_episode:3}",
            "anime_keywords2": "{title} {episode}"
        }));
        let mut request = request("Anime");
        request.episode = Some(12);
        let queries = plan(&source, MediaKind::Anime, &request);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "Anime 12");

        request.absolute_number = Some(112);
        let queries = plan(&source, MediaKind::Anime, &request);
        assert_eq!(queries[0].query, "Anime 112");
    }

    #[test]
    fn test_ids_default_to_empty() {
        let source = html_source_with(json!({"movie_keywords": "{imdb_id}{tmdb_id}"}));
        let mut request = request("Movie");
        request.imdb_id = Some("tt0000001".to_string());
        let queries = plan(&source, MediaKind::Movie, &request);
        assert_eq!(queries[0].query, "tt0000001");
    }

    #[test]
    fn test_title_languages_split() {
        let source = html_source_with(json!({"movie_keywords": "{title:ru:en} {year}"}));
        let mut request = request("The Movie");
        request.year = Some(2020);
        request.titles = [
            ("ru".to_string(), "Фильм".to_string()),
            ("en".to_string(), "The  Movie".to_string()),
        ]
        .into_iter()
        .collect();

        let queries: Vec<String> = plan(&source, MediaKind::Movie, &request)
            .into_iter()
            .map(|q| q.query)
            .collect();
        assert_eq!(queries, vec!["Фильм 2020", "The Movie 2020"]);
    }

    #[test]
    fn test_missing_language_title_skips() {
        let source = html_source_with(json!({
            "movie_keywords": "{title:fr}",
            "movie_keywords2": "{title}"
        }));
        let mut request = request("The Movie");
        request.titles = [("en".to_string(), "The Movie".to_string())].into_iter().collect();
        let queries = plan(&source, MediaKind::Movie, &request);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "The Movie");
    }

    #[test]
    fn test_language_chain() {
        let source = html_source_with(json!({
            "language": "ru",
            "remove_special_characters": ":",
            "movie_keywords": "{title}"
        }));
        let mut request = request("Movie: Part 1");
        request.titles = [
            ("de".to_string(), "Film: Teil 1".to_string()),
            ("ru".to_string(), "Фильм: Часть 1".to_string()),
        ]
        .into_iter()
        .collect();

        let build = |languages: &LanguagePreference| {
            let mut plan = QueryPlan::build(
                &source,
                MediaKind::Movie,
                &request,
                &QuerySanitizer::default(),
                languages,
            );
            plan.next(false, Duration::from_secs(30)).unwrap().query
        };

        // Host language wins.
        let host = LanguagePreference {
            host_language: Some("de".to_string()),
            exceptions: Vec::new(),
        };
        assert_eq!(build(&host), "Film Teil 1");

        // Exempt source falls back to its own language.
        let exempt = LanguagePreference {
            host_language: Some("de".to_string()),
            exceptions: vec![source.id.clone()],
        };
        assert_eq!(build(&exempt), "Фильм Часть 1");

        // Host language without a translation also falls back.
        let missing = LanguagePreference {
            host_language: Some("it".to_string()),
            exceptions: Vec::new(),
        };
        assert_eq!(build(&missing), "Фильм Часть 1");
    }

    #[test]
    fn test_general_ignores_language_suffix() {
        let source = html_source_with(json!({"general_keywords": "{title:fr:de}"}));
        let request = SearchRequest::general("ubuntu");
        let queries = plan(&source, MediaKind::General, &request);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "ubuntu");
    }

    #[test]
    fn test_year_split() {
        let source = html_source_with(json!({"movie_keywords": "{title} {year}"}));
        let mut request = request("Movie");
        request.year = Some(2020);
        request.years = [
            ("us".to_string(), 2020),
            ("ru".to_string(), 2021),
        ]
        .into_iter()
        .collect();

        let queries: Vec<String> = plan(&source, MediaKind::Movie, &request)
            .into_iter()
            .map(|q| q.query)
            .collect();
        assert_eq!(queries, vec!["Movie 2020", "Movie 2021"]);
    }

    #[test]
    fn test_quote_stripping_and_filtering() {
        let source = html_source_with(json!({"movie_keywords": "\"{title}\" {year}"}));
        let mut request = request("Mission: Impossible");
        request.year = Some(1996);
        request.titles = [("source".to_string(), "Mission: Impossible".to_string())]
            .into_iter()
            .collect();
        assert_eq!(plan(&source, MediaKind::Movie, &request)[0].query, "Mission: Impossible 1996");

        let plain = {
            let mut r = request.clone();
            r.title = "Heat".to_string();
            r.titles.clear();
            r
        };
        assert_eq!(plan(&source, MediaKind::Movie, &plain)[0].query, "\"Heat\" 1996");

        let sanitizer = QuerySanitizer::new(&QueryConfig {
            filter_quotes: true,
            ..Default::default()
        });
        let mut apostrophe = request.clone();
        apostrophe.title = "Ocean's Eleven".to_string();
        apostrophe.titles.clear();
        let mut plan = QueryPlan::build(
            &source,
            MediaKind::Movie,
            &apostrophe,
            &sanitizer,
            &LanguagePreference::default(),
        );
        assert_eq!(
            plan.next(false, Duration::from_secs(30)).unwrap().query,
            "Oceans Eleven 1996"
        );
    }

    #[test]
    fn test_fallback_suppressed_after_results() {
        let source = html_source_with(json!({
            "movie_keywords": "{title} {year}",
            "movie_keywords2": "{title}",
            "movie_keywords_fallback": "{title} movie",
        }));
        let mut request = request("Movie");
        request.year = Some(2020);

        let mut plan = QueryPlan::build(
            &source,
            MediaKind::Movie,
            &request,
            &QuerySanitizer::default(),
            &LanguagePreference::default(),
        );
        let budget = Duration::from_secs(20);
        assert_eq!(plan.next(false, budget).unwrap().query, "Movie 2020");
        // Same tier still runs after results.
        assert_eq!(plan.next(true, budget).unwrap().query, "Movie");
        assert!(plan.next(true, budget).is_none());

        let mut plan = QueryPlan::build(
            &source,
            MediaKind::Movie,
            &request,
            &QuerySanitizer::default(),
            &LanguagePreference::default(),
        );
        plan.next(false, budget);
        plan.next(false, budget);
        let fallback = plan.next(false, budget).unwrap();
        assert_eq!(fallback.query, "Movie movie");
        assert_eq!(fallback.priority, 2);
    }

    #[test]
    fn test_duplicates_and_deadline() {
        let source = html_source_with(json!({
            "movie_keywords": "{title}",
            "movie_keywords2": "{title}",
        }));
        let request = request("Movie");
        let mut plan = QueryPlan::build(
            &source,
            MediaKind::Movie,
            &request,
            &QuerySanitizer::default(),
            &LanguagePreference::default(),
        );
        assert_eq!(plan.remaining_queries(), 2);
        assert!(plan.next(false, Duration::from_secs(2)).is_none());

        let mut plan = QueryPlan::build(
            &source,
            MediaKind::Movie,
            &request,
            &QuerySanitizer::default(),
            &LanguagePreference::default(),
        );
        assert!(plan.next(false, Duration::from_secs(10)).is_some());
        assert!(plan.next(false, Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5, None).as_deref(), Some("5"));
        assert_eq!(format_number(5, Some(":2")).as_deref(), Some("05"));
        assert_eq!(format_number(5, Some(":3")).as_deref(), Some("005"));
        assert_eq!(format_number(5, Some("+1")).as_deref(), Some("6"));
        assert_eq!(format_number(u32::MAX, Some("+1")), None);
        assert_eq!(format_number(5, Some(":4000000000")).as_deref(), Some("00000005"));
        assert_eq!(split_keyword("title:fr"), ("title", Some(":fr")));
        assert_eq!(split_keyword("season+1"), ("season", Some("+1")));
    }
}
