// Field extraction from loosely-typed API payloads. Payload shapes are not
// always known exactly ahead of time, so the direct dotted path is backed
// by a bounded-depth recursive search.

use serde_json::Value;

/// Maximum nesting depth for the fallback search.
const MAX_SEARCH_DEPTH: usize = 6;

/// Look up one path segment: case-insensitive object key, numeric array
/// index, or the `*` first-item wildcard.
fn lookup_segment<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(segment) {
                return Some(v);
            }
            let lowered = segment.to_lowercase();
            map.iter()
                .find(|(k, _)| k.to_lowercase() == lowered)
                .map(|(_, v)| v)
        }
        Value::Array(items) => {
            if segment == "*" {
                return items.first();
            }
            segment.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    }
}

/// Extract a value by dotted path, e.g. `items.0.price` or `data.*.total`.
pub fn extract_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = lookup_segment(current, segment)?;
    }
    Some(current)
}

/// Depth-bounded recursive search for a field by name anywhere in the
/// payload. Arrays are descended through; the first match wins.
pub fn find_field<'a>(value: &'a Value, name: &str, depth: usize) -> Option<&'a Value> {
    if depth == 0 {
        return None;
    }
    match value {
        Value::Object(map) => {
            let lowered = name.to_lowercase();
            for (k, v) in map {
                if k.to_lowercase() == lowered {
                    return Some(v);
                }
            }
            for v in map.values() {
                if let Some(found) = find_field(v, name, depth - 1) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| find_field(item, name, depth - 1)),
        _ => None,
    }
}

/// Direct dotted-path extraction, falling back to a recursive search for
/// the path's final segment when the payload shape differs.
pub fn extract_or_find<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(found) = extract_field(value, path) {
        return Some(found);
    }
    let last = path.rsplit('.').find(|s| !s.is_empty())?;
    if last == "*" || last.parse::<usize>().is_ok() {
        return None;
    }
    find_field(value, last, MAX_SEARCH_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "data": {
                "items": [
                    {"Name": "Widget", "price": 19.99},
                    {"Name": "Gadget", "price": 5.00}
                ],
                "total": 2
            },
            "meta": {"requestId": "abc-123"}
        })
    }

    #[test]
    fn test_extract_dotted_path() {
        let v = payload();
        assert_eq!(extract_field(&v, "data.total"), Some(&json!(2)));
    }

    #[test]
    fn test_extract_numeric_index() {
        let v = payload();
        assert_eq!(extract_field(&v, "data.items.1.price"), Some(&json!(5.00)));
    }

    #[test]
    fn test_extract_first_item_wildcard() {
        let v = payload();
        assert_eq!(
            extract_field(&v, "data.items.*.price"),
            Some(&json!(19.99))
        );
    }

    #[test]
    fn test_extract_case_insensitive_keys() {
        let v = payload();
        assert_eq!(
            extract_field(&v, "data.items.0.name"),
            Some(&json!("Widget"))
        );
    }

    #[test]
    fn test_fallback_recursive_search() {
        let v = payload();
        // Wrong path shape, right field name somewhere in the payload.
        assert_eq!(extract_or_find(&v, "result.requestId"), Some(&json!("abc-123")));
    }

    #[test]
    fn test_missing_field_is_none() {
        let v = payload();
        assert!(extract_or_find(&v, "result.nonexistent").is_none());
    }

    #[test]
    fn test_search_descends_arrays() {
        let v = json!([{"deep": {"flag": true}}]);
        assert_eq!(find_field(&v, "flag", 4), Some(&json!(true)));
    }
}
