//! The `uri|Header=value&...` locator encoding.
//!
//! Torrent links of private sources only download with the session's
//! cookies or token, so the headers travel with the link after a `|`.

/// Append urlencoded headers to a locator.
pub fn append_headers(uri: &str, headers: &[(String, String)]) -> String {
    if headers.is_empty() {
        return uri.to_string();
    }
    let encoded: Vec<String> = headers
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("{}|{}", uri, encoded.join("&"))
}

/// Split a locator into the bare URI and its headers.
pub fn split_headers(uri: &str) -> (&str, Vec<(String, String)>) {
    let Some((base, encoded)) = uri.split_once('|') else {
        return (uri, Vec::new());
    };
    let headers = encoded
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect();
    (base, headers)
}

/// The locator without its header suffix.
pub fn bare_uri(uri: &str) -> &str {
    uri.split('|').next().unwrap_or(uri)
}

fn decode(part: &str) -> String {
    urlencoding::decode(part)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| part.to_string())
}
