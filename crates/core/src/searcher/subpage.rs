//! Detail-page resolution.
//!
//! Some sources only list links to a detail page per result. Those pages are
//! fetched concurrently and scanned for the first usable download link.

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::definitions::{SourceDefinition, SubpageMode};
use crate::fetch::{split_headers, FetchRequest, Fetcher};

use super::types::RawRecord;

static MAGNET: Lazy<Regex> = Lazy::new(|| Regex::new(r#"magnet:\?[^'"\s<>\[\]]+"#).unwrap());
static TORRENT_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r#"http(.*?)\.torrent["']"#).unwrap());
static TOKEN_DOWNLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/download\?token=[A-Za-z0-9%]+").unwrap());
static QUOTED_DOWNLOAD: Lazy<Regex> = Lazy::new(|| Regex::new(r#""(/download/[A-Za-z0-9]+)""#).unwrap());
static ID_DOWNLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/torrents/download/\?id=[a-z0-9\-_.]+").unwrap());
static LABELED_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r": ([A-Fa-f0-9]{40})").unwrap());
static HASH_DOWNLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/download\.php\?id=([A-Za-z0-9]{40})\W").unwrap());
static PHP_DOWNLOAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(/download\.php\?id=[A-Za-z0-9]+[^\s'"]*)"#).unwrap());

/// First download link found in a detail page.
///
/// Patterns are tried in a fixed order; relative links are prefixed with
/// `root_url` and bare info-hashes become magnet links.
pub fn extract_from_page(root_url: &str, content: &str) -> Option<String> {
    if let Some(m) = MAGNET.find(content) {
        return Some(m.as_str().to_string());
    }
    if let Some(caps) = TORRENT_LINK.captures(content) {
        let link = format!("http{}.torrent", &caps[1]);
        return Some(link.replace("torcache.net", "itorrents.org"));
    }
    if let Some(m) = TOKEN_DOWNLOAD.find(content) {
        return Some(format!("{}{}", root_url, m.as_str()));
    }
    if let Some(caps) = QUOTED_DOWNLOAD.captures(content) {
        return Some(format!("{}{}", root_url, &caps[1]));
    }
    if let Some(m) = ID_DOWNLOAD.find(content) {
        return Some(format!("{}{}", root_url, m.as_str()));
    }
    if let Some(caps) = LABELED_HASH.captures(content) {
        return Some(format!("magnet:?xt=urn:btih:{}", &caps[1]));
    }
    if let Some(caps) = HASH_DOWNLOAD.captures(content) {
        return Some(format!("magnet:?xt=urn:btih:{}", &caps[1]));
    }
    if let Some(caps) = PHP_DOWNLOAD.captures(content) {
        return Some(format!("{}{}", root_url, &caps[1]));
    }
    None
}

/// Whether a record's link must be resolved through its detail page.
pub fn needs_subpage(source: &SourceDefinition, record: &RawRecord) -> bool {
    source.subpage.is_some()
        && !record.name.is_empty()
        && !record.locator.is_empty()
        && !record.locator.starts_with("magnet")
}

/// Resolve the detail pages of all records concurrently.
///
/// Records keep their order. A page without a usable link leaves an empty
/// locator, which drops the record later.
pub async fn resolve_subpages(
    source: &SourceDefinition,
    fetcher: Arc<dyn Fetcher>,
    records: Vec<RawRecord>,
) -> Vec<RawRecord> {
    if records.is_empty() {
        return records;
    }
    debug!(source = %source.id, pages = records.len(), "Resolving detail pages");
    let tasks = records
        .into_iter()
        .map(|record| resolve_one(source, fetcher.clone(), record));
    join_all(tasks).await
}

async fn resolve_one(
    source: &SourceDefinition,
    fetcher: Arc<dyn Fetcher>,
    mut record: RawRecord,
) -> RawRecord {
    if !record.locator.starts_with("http") {
        record.locator = format!("{}{}", source.root_url, record.locator);
    }
    let locator = record.locator.clone();
    let (page_url, _) = split_headers(&locator);
    let suffix = locator.split_once('|').map(|(_, h)| h.to_string());

    let mut request = FetchRequest::get(page_url).response_charset(source.response_charset.clone());
    if source.subpage == Some(SubpageMode::Xhr) {
        request = request
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Content-Language", "");
    }
    if let Some(referer) = record.referer.as_deref().filter(|r| !r.is_empty()) {
        request = request.header("Referer", referer);
    }

    let response = match fetcher.fetch(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(source = %source.id, url = %page_url, error = %e, "Detail page request failed");
            record.locator = String::new();
            return record;
        }
    };

    if response.content_type().contains("bittorrent") {
        debug!(source = %source.id, url = %page_url, "Detail link is the torrent itself");
        return record;
    }

    record.locator = match extract_from_page(&source.root_url, &response.body) {
        Some(link) if link.starts_with("magnet") => link,
        Some(link) => match &suffix {
            Some(headers) => format!("{}|{}", link, headers),
            None => link,
        },
        None => {
            debug!(source = %source.id, url = %page_url, "No download link on detail page");
            String::new()
        }
    };
    record
}
