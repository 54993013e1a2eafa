//! Turning scraped records into ranked results.

use std::path::Path;
use tracing::debug;

use crate::config::SortMode;
use crate::definitions::SourceDefinition;
use crate::metrics::RESULTS_REJECTED;

use super::dedup::deduplicate_results;
use super::filtering::FilterRules;
use super::normalize::{clean_size, get_int, size_to_bytes};
use super::types::{CanonicalResult, RawRecord};

/// Filter one batch of records and build its results.
///
/// `title` is the query to double-check names against, for sources that
/// ask for it. The batch is deduplicated before it is returned.
pub fn build_results(
    source: &SourceDefinition,
    records: Vec<RawRecord>,
    rules: &FilterRules,
    title: Option<&str>,
    icons_dir: Option<&Path>,
    allow_noseeds: bool,
) -> Vec<CanonicalResult> {
    let total = records.len();
    let language = source.language.clone().unwrap_or_else(|| "en".to_string());
    let provider = source.label();
    let icon = icons_dir
        .map(|dir| dir.join(format!("{}.png", source.id)).display().to_string())
        .unwrap_or_default();

    let mut results = Vec::new();
    for record in records {
        let size = clean_size(&record.size);
        if let Err(reason) = rules.verify(&record.name, &size, title) {
            debug!(source = %source.id, name = %record.name, reason = %reason, "Result rejected");
            RESULTS_REJECTED.with_label_values(&[reason.kind()]).inc();
            continue;
        }

        let seeds = saturate(get_int(&record.seeds));
        let sort_resolution = rules.determine_resolution(&record.name) as u32 + 1;
        results.push(CanonicalResult {
            id: record.id.unwrap_or_default(),
            size_bytes: size_to_bytes(&size).max(0.0) as u64,
            name: record.name,
            uri: record.locator,
            info_hash: record.info_hash,
            size,
            seeds,
            peers: saturate(get_int(&record.peers)),
            language: language.clone(),
            provider: provider.clone(),
            source_id: source.id.clone(),
            icon: icon.clone(),
            sort_resolution,
            sort_balance: (seeds as u64 + 1) * 3 * sort_resolution as u64,
        });
    }

    let accepted = results.len();
    let results = deduplicate_results(results, allow_noseeds);
    debug!(
        source = %source.id,
        records = total,
        accepted,
        kept = results.len(),
        "Batch filtered"
    );
    results
}

/// Order a source's results by the sort mode, best first, and keep at most
/// `max_results`.
pub fn rank_results(
    mut results: Vec<CanonicalResult>,
    mode: SortMode,
    max_results: usize,
) -> Vec<CanonicalResult> {
    match mode {
        SortMode::Balanced => results.sort_by(|a, b| b.sort_balance.cmp(&a.sort_balance)),
        SortMode::Resolution => results.sort_by(|a, b| b.sort_resolution.cmp(&a.sort_resolution)),
        SortMode::Seeds => results.sort_by(|a, b| b.seeds.cmp(&a.seeds)),
        SortMode::Size => results.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes)),
    }
    results.truncate(max_results);
    results
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::searcher::{MediaKind, RELEASE_TYPES, RESOLUTIONS};
    use crate::testing::fixtures::html_source_with;
    use serde_json::json;

    fn record(name: &str, locator: &str, size: &str, seeds: &str) -> RawRecord {
        RawRecord {
            name: name.to_string(),
            locator: locator.to_string(),
            size: size.to_string(),
            seeds: seeds.to_string(),
            peers: "2".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_results_fields() {
        let source = html_source_with(json!({"name": "Tracker", "color": "FFFF0000", "language": "RU"}));
        let rules = FilterRules::new(&FilterConfig::default(), MediaKind::Movie);
        let results = build_results(
            &source,
            vec![record("Movie.2020.1080p.BluRay", "magnet:?xt=urn:btih:AAA", "1.5 GBytes", "1204")],
            &rules,
            None,
            Some(Path::new("/icons")),
            false,
        );

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.size, "1.5 GB");
        assert_eq!(result.size_bytes, 1_500_000_000);
        assert_eq!(result.seeds, 1204);
        assert_eq!(result.peers, 2);
        assert_eq!(result.language, "ru");
        assert_eq!(result.provider, "[COLOR FFFF0000]Tracker[/COLOR]");
        assert_eq!(result.icon, format!("/icons/{}.png", source.id));
        // 1080p is category 3.
        assert_eq!(result.sort_resolution, 4);
        assert_eq!(result.sort_balance, 1205 * 3 * 4);
    }

    #[test]
    fn test_build_results_rejects_and_dedups() {
        let source = html_source_with(json!({}));
        let rules = FilterRules::new(&FilterConfig::default(), MediaKind::Movie);
        let records = vec![
            record("", "magnet:?xt=urn:btih:AAA", "", "5"),
            record("Movie 2020", "magnet:?xt=urn:btih:BBB", "", "5"),
            record("Movie 2020 repack", "magnet:?xt=urn:btih:BBB", "", "9"),
            record("Movie 2020 no seeds", "magnet:?xt=urn:btih:CCC", "", "0"),
            record("Other 2020", "magnet:?xt=urn:btih:DDD", "", "1"),
        ];
        let results = build_results(&source, records, &rules, Some("Movie"), None, false);
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Movie 2020"]);
        assert_eq!(results[0].language, "en");
        assert!(results[0].icon.is_empty());
    }

    fn ranked(mode: SortMode) -> Vec<String> {
        let source = html_source_with(json!({}));
        let rules = FilterRules::new(&FilterConfig::default(), MediaKind::Movie);
        let records = vec![
            record("A 720p", "magnet:?xt=urn:btih:A", "4 GB", "100"),
            record("B 2160p", "magnet:?xt=urn:btih:B", "20 GB", "10"),
            record("C 1080p", "magnet:?xt=urn:btih:C", "900 MB", "50"),
        ];
        let results = build_results(&source, records, &rules, None, None, false);
        rank_results(results, mode, 2)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    #[test]
    fn test_rank_modes() {
        assert_eq!(ranked(SortMode::Seeds), vec!["A 720p", "C 1080p"]);
        assert_eq!(ranked(SortMode::Resolution), vec!["B 2160p", "C 1080p"]);
        assert_eq!(ranked(SortMode::Size), vec!["B 2160p", "A 720p"]);
        // 101*3*3=909, 11*3*6=198, 51*3*4=612
        assert_eq!(ranked(SortMode::Balanced), vec!["A 720p", "C 1080p"]);
    }

    #[test]
    fn test_filtered_rows_rank_best_resolution_first() {
        fn toggles(enabled: &[&str], all: &[(&str, &[&str])]) -> std::collections::BTreeMap<String, bool> {
            all.iter()
                .map(|(label, _)| (label.to_string(), enabled.contains(label)))
                .collect()
        }
        let config = FilterConfig {
            resolutions: toggles(&["720p", "1080p"], &RESOLUTIONS),
            release_types: toggles(&["brrip", "webdl"], &RELEASE_TYPES),
            ..Default::default()
        };
        let source = html_source_with(json!({}));
        let rules = FilterRules::new(&config, MediaKind::Movie);
        let records = vec![
            record("Movie.720p.WEB", "magnet:?xt=urn:btih:AAA", "", "10"),
            record("Movie.CAM", "magnet:?xt=urn:btih:BBB", "", "10"),
            record("Movie.1080p.BluRay", "magnet:?xt=urn:btih:CCC", "", "10"),
        ];

        let results = build_results(&source, records, &rules, None, None, false);
        let ranked = rank_results(results, SortMode::Balanced, 5);

        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Movie.1080p.BluRay", "Movie.720p.WEB"]);
    }
}
