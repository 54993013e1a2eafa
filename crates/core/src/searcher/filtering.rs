//! Quality filtering and resolution classification of result names.
//!
//! Rules are built once per search from [`FilterConfig`] and shared read-only
//! by every source task. Names are normalized, padded with spaces and
//! matched against category patterns that must be bounded by non-word
//! characters on both sides.

use regex_lite::Regex;
use thiserror::Error;
use tracing::warn;

use crate::config::{FilterConfig, SizeRange};

use super::normalize::{clean_number, normalize_name, size_to_bytes};
use super::types::MediaKind;

/// Resolution categories in ascending order. A name matching none is 480p.
pub const RESOLUTIONS: [(&str, &[&str]); 7] = [
    ("240p", &["240[pр]", "vhs-?rip"]),
    (
        "480p",
        &["480[pр]", "xvid|dvd|dvdrip|hdtv|web-(dl)?rip|iptv|sat-?rip|tv-?rip"],
    ),
    ("720p", &["720[pр]|1280x720", "hd720p?|hd-?rip|b[rd]rip"]),
    (
        "1080p",
        &["1080[piр]|1920x1080", r"hd1080p?|fullhd|fhd|blu\W*ray|bd\W*remux"],
    ),
    ("2k", &["1440[pр]", "2k"]),
    ("4k", &["4k|2160[pр]|uhd", "4k|hd4k"]),
    ("music", &["mp3|flac|alac|ost|sound-?track"]),
];

/// Index of the 480p category.
const DEFAULT_RESOLUTION: usize = 1;

/// Release type categories.
pub const RELEASE_TYPES: [(&str, &[&str]); 16] = [
    ("brrip", &["brrip|bd-?rip|blu-?ray|bd-?remux"]),
    ("webdl", &["web_?-?dl|web-?rip|dl-?rip|yts"]),
    ("hdrip", &["hd-?rip"]),
    ("hdtv", &["hd-?tv"]),
    ("dvd", &["dvd|dvd-?rip|vcd-?rip"]),
    ("dvdscr", &["dvd-?scr"]),
    ("screener", &["screener|scr"]),
    ("3d", &["3d"]),
    ("telesync", &["telesync|ts|tc"]),
    ("cam", &["cam|hd-?cam"]),
    ("tvrip", &["tv-?rip|sat-?rip|dvb"]),
    ("vhsrip", &["vhs-?rip"]),
    ("iptvrip", &["iptv-?rip"]),
    ("trailer", &["trailer|трейлер|тизер"]),
    ("workprint", &["workprint"]),
    ("line", &["line"]),
];

/// Why a result was dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Empty name")]
    EmptyName,

    #[error("Resolution not allowed ({0})")]
    Resolution(String),

    #[error("Name mismatch")]
    NameMismatch,

    #[error("Missing required keyword ({0})")]
    MissingKeyword(String),

    #[error("Missing release type keyword")]
    MissingReleaseType,

    #[error("Blocked by release type keyword")]
    BlockedReleaseType,

    #[error("Size out of range ({0})")]
    SizeOutOfRange(String),
}

impl Rejection {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::EmptyName => "empty_name",
            Rejection::Resolution(_) => "resolution",
            Rejection::NameMismatch => "name_mismatch",
            Rejection::MissingKeyword(_) => "missing_keyword",
            Rejection::MissingReleaseType => "missing_release_type",
            Rejection::BlockedReleaseType => "blocked_release_type",
            Rejection::SizeOutOfRange(_) => "size",
        }
    }
}

/// A category pattern bounded by non-word characters.
#[derive(Debug, Clone)]
struct Pattern(Regex);

impl Pattern {
    fn compile(key: &str) -> Option<Self> {
        match Regex::new(&format!(r"\W(?:{})\W", key)) {
            Ok(regex) => Some(Self(regex)),
            Err(e) => {
                warn!(pattern = %key, error = %e, "Ignoring invalid filter pattern");
                None
            }
        }
    }

    fn matches(&self, padded: &str) -> bool {
        self.0.is_match(padded)
    }
}

fn any_match(patterns: &[Pattern], padded: &str) -> bool {
    patterns.iter().any(|p| p.matches(padded))
}

fn pad(name: &str) -> String {
    format!(" {} ", name.to_lowercase())
}

/// Split a user list entry such as "x265, hevc".
fn split_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| item.split(','))
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Filtering rules of one search.
#[derive(Debug, Clone)]
pub struct FilterRules {
    resolutions: Vec<Vec<Pattern>>,
    resolutions_allowed: Vec<bool>,
    filter_resolutions: bool,
    require_resolution: bool,
    releases_allow: Vec<Pattern>,
    releases_deny: Vec<Pattern>,
    require_release_type: bool,
    required_keywords: Vec<String>,
    require_keywords: bool,
    require_size: bool,
    min_bytes: f64,
    max_bytes: f64,
}

impl FilterRules {
    pub fn new(config: &FilterConfig, kind: MediaKind) -> Self {
        let toggled = |map: &std::collections::BTreeMap<String, bool>, key: &str| {
            map.get(key).copied().unwrap_or(true)
        };

        let mut releases_allow = Vec::new();
        let mut releases_deny = Vec::new();
        let mut resolutions = Vec::new();
        let mut resolutions_allowed = Vec::new();

        for (label, keys) in RESOLUTIONS {
            let patterns: Vec<Pattern> = keys.iter().filter_map(|k| Pattern::compile(k)).collect();
            let allowed = toggled(&config.resolutions, label);
            if allowed {
                releases_allow.extend(patterns.iter().cloned());
            }
            resolutions.push(patterns);
            resolutions_allowed.push(allowed);
        }
        let filter_resolutions = !resolutions_allowed.iter().all(|a| *a);

        for (label, keys) in RELEASE_TYPES {
            let patterns = keys.iter().filter_map(|k| Pattern::compile(k));
            if toggled(&config.release_types, label) {
                releases_allow.extend(patterns);
            } else {
                releases_deny.extend(patterns);
            }
        }

        let mut required_keywords = Vec::new();
        if config.additional_filters {
            releases_allow.extend(
                split_list(&config.accept)
                    .iter()
                    .filter_map(|k| Pattern::compile(k)),
            );
            releases_deny.extend(
                split_list(&config.block)
                    .iter()
                    .filter_map(|k| Pattern::compile(k)),
            );
            required_keywords = split_list(&config.require);
        }

        let (min_gb, max_gb) = size_range(config, kind);

        Self {
            resolutions,
            resolutions_allowed,
            filter_resolutions,
            require_resolution: config.require_resolution,
            releases_allow,
            releases_deny,
            require_release_type: config.require_release_type,
            required_keywords,
            require_keywords: config.require_keywords,
            require_size: config.require_size,
            min_bytes: min_gb * 1e9,
            max_bytes: max_gb * 1e9,
        }
    }

    /// Check a result name and size.
    ///
    /// `title` is the issued query for sources that double-check names.
    pub fn verify(&self, name: &str, size: &str, title: Option<&str>) -> Result<(), Rejection> {
        if name.is_empty() {
            return Err(Rejection::EmptyName);
        }
        let name = normalize_name(name);
        let padded = pad(&name);

        if self.filter_resolutions && self.require_resolution {
            let idx = self.resolution_index(&padded);
            if !self.resolutions_allowed[idx] {
                return Err(Rejection::Resolution(RESOLUTIONS[idx].0.to_string()));
            }
        }

        if let Some(title) = title.filter(|t| !t.is_empty()) {
            let title = normalize_name(title);
            if !title.split_whitespace().all(|token| name.contains(token)) {
                return Err(Rejection::NameMismatch);
            }
        }

        if self.require_keywords {
            if let Some(missing) = self
                .required_keywords
                .iter()
                .find(|keyword| !contains_keyword(&padded, keyword))
            {
                return Err(Rejection::MissingKeyword(missing.clone()));
            }
        }

        if self.require_release_type && !any_match(&self.releases_allow, &padded) {
            return Err(Rejection::MissingReleaseType);
        }

        if any_match(&self.releases_deny, &padded) {
            return Err(Rejection::BlockedReleaseType);
        }

        if self.require_size && !size.is_empty() && !self.in_size_range(size) {
            return Err(Rejection::SizeOutOfRange(size.to_string()));
        }

        Ok(())
    }

    /// Inclusive byte range check.
    pub fn in_size_range(&self, size: &str) -> bool {
        let bytes = size_to_bytes(&clean_number(size));
        self.min_bytes <= bytes && bytes <= self.max_bytes
    }

    /// Resolution category index of a raw name. The last matching category wins.
    pub fn determine_resolution(&self, name: &str) -> usize {
        self.resolution_index(&pad(&normalize_name(name)))
    }

    fn resolution_index(&self, padded: &str) -> usize {
        self.resolutions
            .iter()
            .enumerate()
            .filter(|(_, patterns)| any_match(patterns, padded))
            .map(|(idx, _)| idx)
            .last()
            .unwrap_or(DEFAULT_RESOLUTION)
    }
}

/// All space-separated parts of a keyword appear in the padded name;
/// underscores stand for spaces.
fn contains_keyword(padded: &str, keyword: &str) -> bool {
    keyword
        .split_whitespace()
        .all(|part| padded.contains(&part.replace('_', " ")))
}

/// Size range in GB for a media kind, with min clamped below max.
pub fn size_range(config: &FilterConfig, kind: MediaKind) -> (f64, f64) {
    let range: SizeRange = if config.separate_sizes {
        match kind {
            MediaKind::General => config.size,
            MediaKind::Movie => config.movies,
            MediaKind::Season => config.seasons,
            MediaKind::Episode | MediaKind::Anime => config.episodes,
        }
    } else {
        config.size
    };

    let mut min = range.min_gb;
    if min > range.max_gb {
        warn!(
            min_gb = range.min_gb,
            max_gb = range.max_gb,
            "Minimum size above maximum, using max size minus 1 GB"
        );
        min = (range.max_gb - 1.0).max(0.0);
    }
    (min, range.max_gb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn toggles(enabled: &[&str], all: &[(&str, &[&str])]) -> BTreeMap<String, bool> {
        all.iter()
            .map(|(label, _)| (label.to_string(), enabled.contains(label)))
            .collect()
    }

    fn rules(config: FilterConfig) -> FilterRules {
        FilterRules::new(&config, MediaKind::Movie)
    }

    #[test]
    fn test_determine_resolution() {
        let rules = rules(FilterConfig::default());
        assert_eq!(rules.determine_resolution("Movie.2020.1080p.WEB"), 3);
        assert_eq!(rules.determine_resolution("Movie 720p x264"), 2);
        assert_eq!(rules.determine_resolution("Movie.2160p.HDR"), 5);
        // No category matches: 480p.
        assert_eq!(rules.determine_resolution("Movie 2020"), 1);
        // Last (highest) category wins.
        assert_eq!(rules.determine_resolution("Movie 720p 1080p"), 3);
    }

    #[test]
    fn test_resolution_word_boundaries() {
        let rules = rules(FilterConfig::default());
        // "1080p" glued to other word characters is not a match.
        assert_eq!(rules.determine_resolution("Movie.x1080px"), 1);
        assert_eq!(rules.determine_resolution("Movie-1080p-"), 3);
        // Cyrillic р counts as p.
        assert_eq!(rules.determine_resolution("Фильм 720р"), 2);
    }

    #[test]
    fn test_resolution_filtering() {
        let config = FilterConfig {
            resolutions: toggles(&["720p", "1080p"], &RESOLUTIONS),
            ..Default::default()
        };
        let rules = rules(config);
        assert!(rules.verify("Movie.1080p.BluRay", "", None).is_ok());
        assert_eq!(
            rules.verify("Movie.CAM", "", None),
            Err(Rejection::Resolution("480p".to_string()))
        );

        let lenient = FilterConfig {
            require_resolution: false,
            resolutions: toggles(&["720p"], &RESOLUTIONS),
            ..Default::default()
        };
        assert!(FilterRules::new(&lenient, MediaKind::Movie)
            .verify("Movie.CAM", "", None)
            .is_ok());
    }

    #[test]
    fn test_end_to_end_rows() {
        let config = FilterConfig {
            resolutions: toggles(&["720p", "1080p"], &RESOLUTIONS),
            release_types: toggles(&["brrip", "webdl"], &RELEASE_TYPES),
            ..Default::default()
        };
        let rules = rules(config);
        let survivors: Vec<&str> = ["Movie.1080p.BluRay", "Movie.CAM", "Movie.720p.WEB"]
            .into_iter()
            .filter(|name| rules.verify(name, "", None).is_ok())
            .collect();
        assert_eq!(survivors, vec!["Movie.1080p.BluRay", "Movie.720p.WEB"]);
    }

    #[test]
    fn test_release_type_allow_and_deny() {
        let config = FilterConfig {
            require_release_type: true,
            release_types: toggles(&["brrip", "webdl"], &RELEASE_TYPES),
            ..Default::default()
        };
        let rules = rules(config);
        assert!(rules.verify("Movie 2020 BDRip", "", None).is_ok());
        // Allowed through the enabled resolution patterns.
        assert!(rules.verify("Movie 2020 720p", "", None).is_ok());
        assert_eq!(
            rules.verify("Movie 2020", "", None),
            Err(Rejection::MissingReleaseType)
        );
        assert_eq!(
            rules.verify("Movie 2020 720p HDCAM", "", None),
            Err(Rejection::BlockedReleaseType)
        );
    }

    #[test]
    fn test_deny_applies_without_require_release_type() {
        let config = FilterConfig {
            release_types: toggles(&["brrip"], &RELEASE_TYPES),
            ..Default::default()
        };
        assert_eq!(
            rules(config).verify("Movie TS 720p", "", None),
            Err(Rejection::BlockedReleaseType)
        );
    }

    #[test]
    fn test_additional_filters() {
        let config = FilterConfig {
            additional_filters: true,
            require_keywords: true,
            block: vec!["x265, hevc".to_string()],
            require: vec!["multi_sub".to_string()],
            ..Default::default()
        };
        let rules = rules(config);
        assert!(rules.verify("Movie 1080p multi sub", "", None).is_ok());
        assert_eq!(
            rules.verify("Movie 1080p", "", None),
            Err(Rejection::MissingKeyword("multi_sub".to_string()))
        );
        assert_eq!(
            rules.verify("Movie 1080p HEVC multi sub", "", None),
            Err(Rejection::BlockedReleaseType)
        );

        let disabled = FilterConfig {
            additional_filters: false,
            require_keywords: true,
            block: vec!["hevc".to_string()],
            require: vec!["multi".to_string()],
            ..Default::default()
        };
        assert!(FilterRules::new(&disabled, MediaKind::Movie)
            .verify("Movie 1080p HEVC", "", None)
            .is_ok());
    }

    #[test]
    fn test_title_double_check() {
        let rules = rules(FilterConfig::default());
        assert!(rules.verify("The.Movie.2020.1080p", "", Some("the.movie")).is_ok());
        assert!(rules.verify("The Movie 2020 1080p", "", Some("The Movie 2020")).is_ok());
        assert_eq!(
            rules.verify("Other Film 2020", "", Some("The Movie")),
            Err(Rejection::NameMismatch)
        );
    }

    #[test]
    fn test_size_boundaries_inclusive() {
        let config = FilterConfig {
            require_size: true,
            size: SizeRange {
                min_gb: 1.0,
                max_gb: 2.0,
            },
            ..Default::default()
        };
        let rules = rules(config);
        assert!(rules.in_size_range("1000000000"));
        assert!(rules.in_size_range("2000000000"));
        assert!(rules.in_size_range("1.5 GB"));
        assert!(!rules.in_size_range("999999999"));
        assert!(!rules.in_size_range("2000000001"));
        assert_eq!(
            rules.verify("Movie 1080p", "3.1 GB", None),
            Err(Rejection::SizeOutOfRange("3.1 GB".to_string()))
        );
        // Missing size is never rejected.
        assert!(rules.verify("Movie 1080p", "", None).is_ok());
    }

    #[test]
    fn test_size_range_per_kind_and_clamp() {
        let config = FilterConfig {
            separate_sizes: true,
            movies: SizeRange {
                min_gb: 5.0,
                max_gb: 3.0,
            },
            episodes: SizeRange {
                min_gb: 0.1,
                max_gb: 1.0,
            },
            ..Default::default()
        };
        assert_eq!(size_range(&config, MediaKind::Movie), (2.0, 3.0));
        assert_eq!(size_range(&config, MediaKind::Anime), (0.1, 1.0));
        assert_eq!(size_range(&config, MediaKind::General), (0.0, 10.0));

        let tiny = FilterConfig {
            size: SizeRange {
                min_gb: 2.0,
                max_gb: 0.5,
            },
            ..Default::default()
        };
        assert_eq!(size_range(&tiny, MediaKind::Movie), (0.0, 0.5));
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(
            rules(FilterConfig::default()).verify("", "1 GB", None),
            Err(Rejection::EmptyName)
        );
    }
}
