//! Record extraction from result pages and API responses.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::definitions::{domain_of, ApiFormat, HtmlParser, SourceDefinition};
use crate::fetch::{append_headers, bare_uri, merge_headers};
use crate::markup::{api_records, parse_html, record_field, scalar_text, QueryExpr};

use super::normalize::human_size;
use super::session::SourceSession;
use super::types::RawRecord;

static WWW_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"www\d*\.").unwrap());

/// Records of an HTML result page.
///
/// Rows are searched inside the first `key` match when the parser has one,
/// otherwise in the whole document. Rows without a name or link are kept
/// here and dropped by the caller.
pub fn extract_html(source_id: &str, parser: &HtmlParser, body: &str) -> Vec<RawRecord> {
    if body.trim().is_empty() {
        debug!(source = %source_id, "Empty result page");
        return Vec::new();
    }
    let document = parse_html(body);

    let scope = match &parser.key {
        Some(key) => match key.select(&document).into_iter().next() {
            Some(node) => node,
            None => {
                debug!(source = %source_id, "Key expression matched nothing");
                return Vec::new();
            }
        },
        None => &document,
    };

    let rows = parser.rows.select(scope);
    trace!(source = %source_id, rows = rows.len(), "Matched result rows");

    let field = |expr: &Option<QueryExpr>, row| {
        expr.as_ref()
            .map(|e| e.value(row, &document))
            .unwrap_or_default()
    };

    rows.into_iter()
        .map(|row| {
            let mut locator = parser.torrent.value(row, &document);
            if let Some(pos) = locator.find("magnet:?") {
                locator = locator[pos..].to_string();
            }
            let referer = field(&parser.referer, row);
            let id = field(&parser.id, row);
            RawRecord {
                id: (!id.is_empty()).then_some(id),
                name: parser.name.value(row, &document),
                locator,
                info_hash: field(&parser.info_hash, row),
                size: field(&parser.size, row),
                seeds: field(&parser.seeds, row),
                peers: field(&parser.peers, row),
                referer: (!referer.is_empty()).then_some(referer),
            }
        })
        .collect()
}

/// Records of a JSON API response. Unparseable bodies yield nothing.
pub fn extract_api(source: &SourceDefinition, format: &ApiFormat, body: &str) -> Vec<RawRecord> {
    let data: Value = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) => {
            debug!(source = %source.id, error = %e, "API response is not JSON");
            return Vec::new();
        }
    };

    api_records(
        &data,
        &format.results,
        format.subresults.as_deref(),
        format.name.as_deref(),
    )
    .iter()
    .map(|record| api_record(source, format, record))
    .collect()
}

fn api_record(source: &SourceDefinition, format: &ApiFormat, record: &Map<String, Value>) -> RawRecord {
    let get = |key: &Option<String>| {
        key.as_deref()
            .map(|k| scalar_text(record, k))
            .unwrap_or_default()
    };

    let mut name = get(&format.name);
    let description = get(&format.description);
    if format.description.is_some() {
        if !name.is_empty() {
            name.push(' ');
        }
        name.push_str(&description);
    }
    if format.quality.is_some() {
        name = format!("{} - {}", name, get(&format.quality));
    }

    let mut locator = get(&format.torrent);
    if format.torrent.is_some() && !source.download_path.is_empty() {
        locator = format!("{}{}{}", source.base_url, source.download_path, locator);
    }

    let size = match format.size.as_deref().and_then(|k| record_field(record, k)) {
        Some(Value::Number(n)) => n.as_f64().map(human_size).unwrap_or_default(),
        Some(Value::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse::<f64>().map(human_size).unwrap_or_default()
        }
        _ => get(&format.size),
    };

    RawRecord {
        id: None,
        name,
        locator,
        info_hash: get(&format.info_hash),
        size,
        seeds: get(&format.seeds),
        peers: get(&format.peers),
        referer: None,
    }
}

/// Make a non-magnet link downloadable outside the session.
///
/// A passkey is substituted into the link. Otherwise the Authorization
/// token, or the cookies stored for the link's domain together with the
/// last request's headers, are appended as `|Header=value` pairs.
pub async fn attach_download_headers(session: &SourceSession, locator: String) -> String {
    if locator.starts_with("magnet") || locator.is_empty() {
        return locator;
    }
    let user_agent = ("User-Agent".to_string(), session.user_agent().to_string());

    if let Some(passkey) = session.passkey() {
        return locator.replace("PASSKEY", passkey);
    }
    if let Some(token) = session.auth_token() {
        let headers = vec![("Authorization".to_string(), token.to_string()), user_agent];
        return append_headers(&locator, &headers);
    }
    if session.source().is_api() {
        return locator;
    }

    let domain = domain_of(bare_uri(&locator))
        .map(|d| WWW_PREFIX.replace_all(&d, "").into_owned())
        .unwrap_or_default();
    let cookies = if domain.is_empty() {
        Vec::new()
    } else {
        session.fetcher().cookies_for(&domain).await
    };

    if cookies.is_empty() {
        return append_headers(&locator, &[user_agent]);
    }

    let mut headers = merge_headers(vec![user_agent], session.last_request_headers());
    let last_url = session.last_url();
    if !last_url.is_empty() {
        headers = merge_headers(
            headers,
            &[
                ("Referer".to_string(), last_url.to_string()),
                ("Origin".to_string(), last_url.to_string()),
            ],
        );
    }
    let cookie = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(";");
    headers = merge_headers(headers, &[("Cookie".to_string(), cookie)]);
    append_headers(&locator, &headers)
}
