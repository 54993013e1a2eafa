//! Normalization of scraped text, numbers and sizes.
//!
//! Sources report names with stray markup and sizes in every imaginable
//! format ("1,234.5 MB", "1.234,5 MiB", "6.5 GBytes", raw byte counts).
//! Everything here is total: malformed input degrades to an empty string or
//! zero instead of an error.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]*\.[0-9]+|[0-9]+)").unwrap());
static BTIH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)urn:btih:(\w+)&").unwrap());

/// Normalize a torrent name for matching.
///
/// Drops control characters, turns non-breaking spaces into spaces, decodes
/// percent-escapes, strips CDATA markers, decodes HTML entities and
/// lower-cases the result.
pub fn normalize_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter_map(|c| match c as u32 {
            0..=31 | 127..=159 => None,
            160 => Some(' '),
            _ => Some(c),
        })
        .collect();

    let decoded = match urlencoding::decode(&cleaned) {
        Ok(d) => d.into_owned(),
        Err(_) => cleaned,
    };

    let stripped = decoded.replace("<![CDATA[", "").replace("]]", "");
    html_escape::decode_html_entities(&stripped).to_lowercase()
}

/// Bring a number to `1234.5` form when both separators are present.
///
/// `1,234.5` drops the thousands commas; `1.234,5` drops the points and
/// turns the comma into the decimal separator.
pub fn clean_number(input: &str) -> String {
    match (input.find(','), input.find('.')) {
        (Some(comma), Some(point)) if comma > 0 && point > 0 => {
            if comma < point {
                input.replace(',', "")
            } else {
                input.replace('.', "").replace(',', ".")
            }
        }
        _ => input.to_string(),
    }
}

/// First number found in the text, 0.0 when there is none.
pub fn get_float(input: &str) -> f64 {
    let cleaned = clean_number(input);
    NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Integer part of [`get_float`].
pub fn get_int(input: &str) -> u64 {
    get_float(input) as u64
}

/// Parse a size string into bytes.
///
/// Plain integers are taken as bytes. Otherwise K/M/G/T scale by powers of
/// 1000; binary suffixes (`GiB`) are treated the same way.
pub fn size_to_bytes(input: &str) -> f64 {
    let trimmed = input.trim();
    if let Ok(bytes) = trimmed.parse::<u64>() {
        return bytes as f64;
    }

    let upper = trimmed.to_uppercase();
    let number: String = upper
        .chars()
        .filter(|c| !matches!(c, 'B' | 'I' | 'K' | 'M' | 'G' | 'T'))
        .collect();
    let mut size = get_float(&number);

    if upper.contains('K') {
        size *= 1e3;
    }
    if upper.contains('M') {
        size *= 1e6;
    }
    if upper.contains('G') {
        size *= 1e9;
    }
    if upper.contains('T') {
        size *= 1e12;
    }
    size
}

/// Drop anything after the last `B`, e.g. "6.5 GBytes" -> "6.5 GB".
pub fn clean_size(input: &str) -> String {
    match input.rfind('B') {
        Some(pos) if pos > 0 => format!("{}B", &input[..pos]),
        _ => input.to_string(),
    }
}

/// Human readable size with 1024-based units, e.g. "1.2 GB".
pub fn human_size(bytes: f64) -> String {
    let mut num = bytes;
    for unit in ["", "K", "M", "G", "T", "P", "E", "Z"] {
        if num.abs() < 1024.0 {
            return format!("{:.1} {}B", num, unit);
        }
        num /= 1024.0;
    }
    format!("{:.1} YB", num)
}

/// Info-hash carried by a magnet link, upper-cased.
pub fn magnet_info_hash(uri: &str) -> Option<String> {
    if !uri.starts_with("magnet:") {
        return None;
    }
    let padded = format!("{}&", uri);
    BTIH.captures(&padded)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_decodes_and_lowercases() {
        assert_eq!(
            normalize_name("The%20Movie &amp; Friends <![CDATA[1080p]]>"),
            "the movie & friends 1080p>"
        );
        assert_eq!(normalize_name("Tab\there\u{a0}Now"), "tabhere now");
    }

    #[test]
    fn test_normalize_name_keeps_invalid_percent() {
        assert_eq!(normalize_name("100% Pure"), "100% pure");
    }

    #[test]
    fn test_clean_number_separators() {
        assert_eq!(clean_number("1,234.5"), "1234.5");
        assert_eq!(clean_number("1.234,5"), "1234.5");
        assert_eq!(clean_number("1.5"), "1.5");
        assert_eq!(clean_number("1,5"), "1,5"); // only normalized when both are present
    }

    #[test]
    fn test_get_float_and_int() {
        assert_eq!(get_float("Seeds: 1,204.0"), 1204.0);
        assert_eq!(get_float("no number"), 0.0);
        assert_eq!(get_int("42 peers"), 42);
        assert_eq!(get_int(".5"), 0);
    }

    #[test]
    fn test_size_to_bytes_units() {
        assert_eq!(size_to_bytes("123456"), 123456.0);
        assert_eq!(size_to_bytes("1.5 GB"), 1.5e9);
        assert_eq!(size_to_bytes("700 MiB"), 700e6);
        assert_eq!(size_to_bytes("2 TB"), 2e12);
        assert_eq!(size_to_bytes("512 kb"), 512e3);
        assert_eq!(size_to_bytes("1.234,5 MB"), 1234.5e6);
        assert_eq!(size_to_bytes(""), 0.0);
    }

    #[test]
    fn test_clean_size() {
        assert_eq!(clean_size("6.5 GBytes"), "6.5 GB");
        assert_eq!(clean_size("6.5 GB"), "6.5 GB");
        assert_eq!(clean_size("unknown"), "unknown");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0.0), "0.0 B");
        assert_eq!(human_size(1536.0), "1.5 KB");
        assert_eq!(human_size(1_288_490_189.0), "1.2 GB");
    }

    #[test]
    fn test_magnet_info_hash() {
        assert_eq!(
            magnet_info_hash("magnet:?xt=urn:btih:abcdef0123&dn=Movie").as_deref(),
            Some("ABCDEF0123")
        );
        assert_eq!(
            magnet_info_hash("magnet:?xt=urn:btih:abcdef0123").as_deref(),
            Some("ABCDEF0123")
        );
        assert!(magnet_info_hash("http://example.org/file.torrent").is_none());
    }
}
