//! On-disk snapshot format: a JSON array of `[key, value]` pairs, one pair
//! per top-level field of the root object.

use crate::core::{Result, StoreError};
use serde_json::{Map, Value};

/// Serializes the top-level entries of `root` in map order.
pub fn encode_entries(root: &Value) -> Result<Vec<u8>> {
    let map = root.as_object().ok_or_else(|| {
        StoreError::ParseError("snapshot root must be an object".to_string())
    })?;
    let entries: Vec<(&String, &Value)> = map.iter().collect();
    Ok(serde_json::to_vec_pretty(&entries)?)
}

/// Parses a pair sequence back into ordered entries.
pub fn decode_entries(bytes: &[u8]) -> Result<Vec<(String, Value)>> {
    serde_json::from_slice::<Vec<(String, Value)>>(bytes)
        .map_err(|err| StoreError::ParseError(format!("Failed to parse snapshot: {}", err)))
}

/// Shallow merge: each entry wholesale replaces the field of the same name.
pub fn apply_entries(target: &mut Map<String, Value>, entries: Vec<(String, Value)>) {
    for (key, value) in entries {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_pair_sequence() {
        let bytes = encode_entries(&json!({"users": [1], "chats": {}})).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!([["chats", {}], ["users", [1]]]));

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  ["));
    }

    #[test]
    fn test_encode_rejects_non_object() {
        assert!(encode_entries(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_decode_rejects_other_shapes() {
        assert!(matches!(
            decode_entries(br#"{"chats": {}}"#),
            Err(StoreError::ParseError(_))
        ));
        assert!(matches!(
            decode_entries(br#"[["chats"]]"#),
            Err(StoreError::ParseError(_))
        ));
        assert!(decode_entries(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_apply_replaces_whole_values() {
        let mut target = json!({"chats": {"1": ["a"]}, "ownerUserId": 0})
            .as_object()
            .cloned()
            .unwrap();
        apply_entries(
            &mut target,
            vec![("chats".to_string(), json!({"2": ["b"]}))],
        );
        assert_eq!(
            Value::Object(target),
            json!({"chats": {"2": ["b"]}, "ownerUserId": 0})
        );
    }
}
