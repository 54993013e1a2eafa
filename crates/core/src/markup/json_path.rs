//! Dotted-path access into JSON API responses.

use serde_json::{Map, Value};

use super::selector::SelectorError;

/// Check a dotted path such as `data.movies`. The empty path is the root.
pub fn validate_path(path: &str) -> Result<(), SelectorError> {
    if path.is_empty() {
        return Ok(());
    }
    for segment in path.split('.') {
        if segment.is_empty()
            || !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SelectorError {
                expr: path.to_string(),
                reason: format!("bad path segment '{}'", segment),
            });
        }
    }
    Ok(())
}

/// Walk `path` from `root`. Numeric segments index into arrays.
pub fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Records of an API response.
///
/// `results` locates the record array. With `subresults`, every record is
/// replicated once per element of its nested array, the child's fields
/// overriding the parent's; the parent's display name is copied to `name`
/// first so children keep it.
pub fn api_records(
    body: &Value,
    results: &str,
    subresults: Option<&str>,
    name_key: Option<&str>,
) -> Vec<Map<String, Value>> {
    let records: Vec<Map<String, Value>> = match walk(body, results) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect(),
        _ => Vec::new(),
    };

    let Some(sub_path) = subresults.filter(|s| !s.is_empty()) else {
        return records;
    };

    let mut expanded = Vec::new();
    for mut parent in records {
        if let Some(name) = name_key.and_then(|k| record_field(&parent, k).cloned()) {
            parent.insert("name".to_string(), name);
        }
        let children = match walk(&Value::Object(parent.clone()), sub_path) {
            Some(Value::Array(children)) => children.clone(),
            _ => continue,
        };
        for child in children {
            if let Value::Object(fields) = child {
                let mut merged = parent.clone();
                merged.extend(fields);
                expanded.push(merged);
            }
        }
    }
    expanded
}

/// A record field addressed by a dotted path such as `attributes.title`.
/// A key containing the dots literally takes precedence.
pub fn record_field<'a>(record: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    let (head, rest) = path.split_once('.')?;
    walk(record.get(head)?, rest)
}

/// A scalar field rendered as text; missing and non-scalar values are empty.
pub fn scalar_text(record: &Map<String, Value>, key: &str) -> String {
    match record_field(record, key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walk_paths() {
        let body = json!({"data": {"movies": [{"title": "A"}, {"title": "B"}]}});
        assert_eq!(walk(&body, "data.movies.1.title"), Some(&json!("B")));
        assert_eq!(walk(&body, ""), Some(&body));
        assert!(walk(&body, "data.shows").is_none());
        assert!(walk(&body, "data.movies.x").is_none());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("").is_ok());
        assert!(validate_path("data.movies").is_ok());
        assert!(validate_path("data..movies").is_err());
        assert!(validate_path("data['movies']").is_err());
    }

    #[test]
    fn test_root_array_records() {
        let body = json!([{"name": "A"}, 3, {"name": "B"}]);
        let records = api_records(&body, "", None, None);
        assert_eq!(records.len(), 2);
        assert_eq!(scalar_text(&records[1], "name"), "B");
    }

    #[test]
    fn test_missing_results_path_is_empty() {
        let body = json!({"status": "error"});
        assert!(api_records(&body, "data.movies", None, None).is_empty());
    }

    #[test]
    fn test_subresults_fan_out() {
        let body = json!({"data": {"movies": [
            {"title_long": "Movie (2020)", "torrents": [
                {"quality": "720p", "hash": "AAA", "seeds": 10},
                {"quality": "1080p", "hash": "BBB", "seeds": 20}
            ]},
            {"title_long": "No Torrents"}
        ]}});
        let records = api_records(&body, "data.movies", Some("torrents"), Some("title_long"));
        assert_eq!(records.len(), 2);
        assert_eq!(scalar_text(&records[0], "name"), "Movie (2020)");
        assert_eq!(scalar_text(&records[0], "quality"), "720p");
        assert_eq!(scalar_text(&records[1], "hash"), "BBB");
        assert_eq!(scalar_text(&records[1], "seeds"), "20");
    }

    #[test]
    fn test_nested_field_paths() {
        let body = json!({"items": [
            {"attributes": {"title": "Movie 1080p", "stats": [{"seeders": 7}]}, "a.b": "literal"}
        ]});
        let records = api_records(&body, "items", None, None);
        assert_eq!(scalar_text(&records[0], "attributes.title"), "Movie 1080p");
        assert_eq!(scalar_text(&records[0], "attributes.stats.0.seeders"), "7");
        assert_eq!(scalar_text(&records[0], "a.b"), "literal");
        assert_eq!(scalar_text(&records[0], "attributes.missing"), "");
    }
}
