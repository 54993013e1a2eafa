//! Process-wide cookie jar persisted as JSON.
//!
//! The in-memory store backs reqwest's cookie provider. The file is read
//! before and written after every fetch; those file operations are serialized
//! by an async mutex, the HTTP exchanges in between are not.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    /// Host the cookie belongs to, without a leading dot.
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Parse a `Set-Cookie` header received from `url`.
    pub fn parse(header: &str, url: &Url) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = StoredCookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: url.host_str()?.to_lowercase(),
            path: default_path(),
            expires: None,
            secure: false,
        };

        for attribute in parts {
            let (key, val) = attribute.split_once('=').unwrap_or((attribute, ""));
            let val = val.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    cookie.domain = val.trim_start_matches('.').to_lowercase();
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => {
                    if cookie.expires.is_none() {
                        cookie.expires = DateTime::parse_from_rfc2822(val)
                            .ok()
                            .map(|d| d.with_timezone(&Utc));
                    }
                }
                "max-age" => {
                    if let Ok(secs) = val.parse::<i64>() {
                        cookie.expires = Some(Utc::now() + ChronoDuration::seconds(secs));
                    }
                }
                "secure" => cookie.secure = true,
                _ => {}
            }
        }
        Some(cookie)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|e| e <= now)
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let domain_ok = host == self.domain || host.ends_with(&format!(".{}", self.domain));
        let path_ok = url.path().starts_with(&self.path);
        let scheme_ok = !self.secure || url.scheme() == "https";
        domain_ok && path_ok && scheme_ok
    }
}

/// Cookie jar shared by every source session.
#[derive(Debug)]
pub struct CookieJar {
    path: Option<PathBuf>,
    cookies: Mutex<Vec<StoredCookie>>,
    file_lock: tokio::sync::Mutex<()>,
}

impl CookieJar {
    /// Jar persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cookies: Mutex::new(Vec::new()),
            file_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Jar that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cookies: Mutex::new(Vec::new()),
            file_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Merge cookies from the file into memory. Cookies already held in
    /// memory win over the file's copy.
    pub async fn load(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.file_lock.lock().await;

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cookie jar");
                return;
            }
        };
        let stored: Vec<StoredCookie> = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed cookie jar");
                return;
            }
        };

        let now = Utc::now();
        if let Ok(mut cookies) = self.cookies.lock() {
            for cookie in stored.into_iter().filter(|c| !c.is_expired(now)) {
                if !cookies.iter().any(|c| c.same_slot(&cookie)) {
                    cookies.push(cookie);
                }
            }
        }
    }

    /// Write the unexpired cookies to the file.
    pub async fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let _guard = self.file_lock.lock().await;

        let snapshot = self.snapshot();
        let content = match serde_json::to_string_pretty(&snapshot) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cookie jar");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "Failed to create cookie jar directory");
                return;
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => debug!(path = %path.display(), cookies = snapshot.len(), "Saved cookie jar"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write cookie jar"),
        }
    }

    /// Store a cookie, replacing the one with the same name, domain and path.
    pub fn insert(&self, cookie: StoredCookie) {
        if let Ok(mut cookies) = self.cookies.lock() {
            cookies.retain(|c| !c.same_slot(&cookie));
            if !cookie.is_expired(Utc::now()) {
                cookies.push(cookie);
            }
        }
    }

    /// Unexpired cookies.
    pub fn snapshot(&self) -> Vec<StoredCookie> {
        let now = Utc::now();
        self.cookies
            .lock()
            .map(|cookies| {
                cookies
                    .iter()
                    .filter(|c| !c.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `(name, value)` of cookies whose domain contains `domain`.
    pub fn cookies_for(&self, domain: &str) -> Vec<(String, String)> {
        let domain = domain.to_lowercase();
        self.snapshot()
            .into_iter()
            .filter(|c| c.domain.contains(&domain))
            .map(|c| (c.name, c.value))
            .collect()
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Ok(text) = header.to_str() else {
                continue;
            };
            if let Some(cookie) = StoredCookie::parse(text, url) {
                self.insert(cookie);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .snapshot()
            .into_iter()
            .filter(|c| c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie = StoredCookie::parse(
            "uid=42; Domain=.tracker.example.org; Path=/; Secure; HttpOnly",
            &url("https://www.tracker.example.org/login.php"),
        )
        .unwrap();
        assert_eq!(cookie.name, "uid");
        assert_eq!(cookie.value, "42");
        assert_eq!(cookie.domain, "tracker.example.org");
        assert!(cookie.secure);
        assert!(cookie.expires.is_none());
    }

    #[test]
    fn test_parse_expiry() {
        let expired = StoredCookie::parse(
            "a=b; Expires=Wed, 21 Oct 2015 07:28:00 GMT",
            &url("https://example.org/"),
        )
        .unwrap();
        assert!(expired.is_expired(Utc::now()));

        let fresh = StoredCookie::parse("a=b; Max-Age=3600", &url("https://example.org/")).unwrap();
        assert!(!fresh.is_expired(Utc::now()));

        assert!(StoredCookie::parse("novalue", &url("https://example.org/")).is_none());
    }

    #[test]
    fn test_store_and_send_cookies() {
        let jar = CookieJar::in_memory();
        let headers = [
            HeaderValue::from_static("session=abc; Path=/"),
            HeaderValue::from_static("lang=en"),
        ];
        jar.set_cookies(&mut headers.iter(), &url("https://example.org/index.php"));

        let sent = jar.cookies(&url("https://example.org/search")).unwrap();
        assert_eq!(sent.to_str().unwrap(), "session=abc; lang=en");
        assert!(jar.cookies(&url("https://other.org/")).is_none());

        // Same slot is replaced, not duplicated.
        let update = [HeaderValue::from_static("session=def")];
        jar.set_cookies(&mut update.iter(), &url("https://example.org/"));
        assert_eq!(jar.snapshot().len(), 2);
        assert_eq!(
            jar.cookies_for("example.org"),
            vec![
                ("lang".to_string(), "en".to_string()),
                ("session".to_string(), "def".to_string())
            ]
        );
    }

    #[test]
    fn test_cookies_for_matches_substring() {
        let jar = CookieJar::in_memory();
        let headers = [HeaderValue::from_static("uid=1; Domain=.rutracker.example.org")];
        jar.set_cookies(&mut headers.iter(), &url("https://rutracker.example.org/"));
        assert_eq!(jar.cookies_for("tracker.example.org").len(), 1);
        assert!(jar.cookies_for("nothere.org").is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("common_cookies.json");

        let jar = CookieJar::new(&path);
        let headers = [HeaderValue::from_static("uid=7")];
        jar.set_cookies(&mut headers.iter(), &url("https://example.org/"));
        jar.save().await;
        assert!(path.exists());

        let other = CookieJar::new(&path);
        other.load().await;
        assert_eq!(other.cookies_for("example.org"), vec![("uid".into(), "7".into())]);
    }

    #[tokio::test]
    async fn test_load_ignores_missing_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("common_cookies.json");

        let jar = CookieJar::new(&path);
        jar.load().await;
        assert!(jar.snapshot().is_empty());

        std::fs::write(&path, "not json").unwrap();
        jar.load().await;
        assert!(jar.snapshot().is_empty());
    }
}
