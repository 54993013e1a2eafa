//! Mirror aliases: point a definition at another domain.

use serde_json::Value;
use url::Url;

/// `host[:port]` of a URL, if it has one.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `scheme://host[:port]` of a URL.
pub fn root_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    domain_of(url).map(|domain| format!("{}://{}", parsed.scheme(), domain))
}

/// Rewrite the definition's domain to the alias' domain in every string,
/// and its scheme to the alias' scheme. Returns false when either side has
/// no usable domain, leaving the definition untouched.
pub fn apply_alias(definition: &mut Value, alias: &str) -> bool {
    let old_domain = ["root_url", "base_url"]
        .iter()
        .filter_map(|k| definition.get(*k).and_then(Value::as_str))
        .find_map(domain_of);
    let new_domain = domain_of(alias);
    let scheme = Url::parse(alias).ok().map(|u| u.scheme().to_string());

    let (Some(old_domain), Some(new_domain)) = (old_domain, new_domain) else {
        return false;
    };
    rewrite_strings(definition, &|s: &str| {
        let mut out = s.replace(&old_domain, &new_domain);
        if let Some(scheme) = &scheme {
            let target = format!("{}://", scheme);
            out = out.replace("http://", &target).replace("https://", &target);
        }
        out
    });
    true
}

fn rewrite_strings(value: &mut Value, f: &dyn Fn(&str) -> String) {
    match value {
        Value::String(s) => *s = f(s),
        Value::Object(map) => map.values_mut().for_each(|v| rewrite_strings(v, f)),
        Value::Array(items) => items.iter_mut().for_each(|v| rewrite_strings(v, f)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_domain_and_root() {
        assert_eq!(domain_of("https://tracker.example.org/search?q=1").as_deref(), Some("tracker.example.org"));
        assert_eq!(domain_of("http://127.0.0.1:8080/x").as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(root_of("https://tracker.example.org/a/b").as_deref(), Some("https://tracker.example.org"));
        assert!(domain_of("not a url").is_none());
    }

    #[test]
    fn test_alias_rewrites_every_string() {
        let mut definition = json!({
            "base_url": "https://tracker.example.org/search/QUERY",
            "root_url": "https://tracker.example.org",
            "parser": {"torrent": "a[href=https://tracker.example.org/dl] | attr(href)"},
            "enabled": true
        });
        assert!(apply_alias(&mut definition, "http://mirror.example.net"));
        assert_eq!(definition["base_url"], "http://mirror.example.net/search/QUERY");
        assert_eq!(definition["root_url"], "http://mirror.example.net");
        assert_eq!(
            definition["parser"]["torrent"],
            "a[href=http://mirror.example.net/dl] | attr(href)"
        );
        assert_eq!(definition["enabled"], true);
    }

    #[test]
    fn test_alias_without_domain_is_ignored() {
        let mut definition = json!({"base_url": "https://tracker.example.org/"});
        assert!(!apply_alias(&mut definition, "mirror"));
        assert_eq!(definition["base_url"], "https://tracker.example.org/");
    }
}
