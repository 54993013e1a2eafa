//! Deduplication of accepted results.

use std::collections::HashSet;
use tracing::debug;

use super::normalize::magnet_info_hash;
use super::types::CanonicalResult;
use crate::fetch::bare_uri;

/// Identity of a result within its source.
///
/// The reported info-hash when present, else the one carried by a magnet
/// link, else the MD5 of the bare link. Always upper-case and prefixed by the
/// source id, so equal torrents from different sources stay distinct.
pub fn fingerprint(result: &CanonicalResult) -> String {
    let mut hash = result.info_hash.to_uppercase();
    if hash.is_empty() {
        hash = match magnet_info_hash(&result.uri) {
            Some(hash) => hash,
            None => format!("{:x}", md5::compute(bare_uri(&result.uri).as_bytes())).to_uppercase(),
        };
    }
    format!("{}{}", result.source_id, hash)
}

/// Drop seedless (unless allowed), link-less and repeated results, then
/// order by seeds, highest first.
///
/// The first occurrence of a fingerprint wins and equal seed counts keep
/// their input order.
pub fn deduplicate_results(results: Vec<CanonicalResult>, allow_noseeds: bool) -> Vec<CanonicalResult> {
    let mut seen = HashSet::new();
    let mut kept: Vec<CanonicalResult> = Vec::with_capacity(results.len());

    for result in results {
        if result.seeds == 0 && !allow_noseeds {
            debug!(source = %result.source_id, name = %result.name, "Skipping result without seeds");
            continue;
        }
        if result.uri.is_empty() {
            debug!(source = %result.source_id, name = %result.name, "Skipping result without link");
            continue;
        }
        if seen.insert(fingerprint(&result)) {
            kept.push(result);
        }
    }

    kept.sort_by(|a, b| b.seeds.cmp(&a.seeds));
    kept
}
