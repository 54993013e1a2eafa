//! Leaf-level merging of definition documents.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// Objects merge recursively key by key; any other overlay value, `null`
/// included, replaces the base value.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_nested_leaf() {
        let mut base = json!({"a": {"x": 1, "y": 2}});
        merge_values(&mut base, json!({"a": {"y": 3}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3}}));
    }

    #[test]
    fn test_merge_adds_and_replaces() {
        let mut base = json!({"name": "Old", "parser": {"row": "tr"}});
        merge_values(
            &mut base,
            json!({"name": "New", "private": true, "parser": {"name": "td:1"}}),
        );
        assert_eq!(
            base,
            json!({"name": "New", "private": true, "parser": {"row": "tr", "name": "td:1"}})
        );
    }

    #[test]
    fn test_null_overrides_leaf() {
        let mut base = json!({"season_keywords2": "{title} Season {season}"});
        merge_values(&mut base, json!({"season_keywords2": null}));
        assert_eq!(base, json!({"season_keywords2": null}));
    }

    #[test]
    fn test_object_replaces_scalar() {
        let mut base = json!({"headers": ""});
        merge_values(&mut base, json!({"headers": {"X-Api": "1"}}));
        assert_eq!(base, json!({"headers": {"X-Api": "1"}}));
    }
}
