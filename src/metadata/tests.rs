use super::*;
use serde_json::json;

fn as_map(value: Value) -> Map<String, Value> {
    value
        .as_object()
        .cloned()
        .expect("test metadata should be a JSON object")
}

fn sentinel() -> MetadataValue {
    MetadataValue::from(NONE_SENTINEL)
}

#[test]
fn null_becomes_sentinel() {
    let cleaned = clean_metadata(&as_map(json!({ "caption": null })));
    assert_eq!(cleaned.get("caption"), Some(&sentinel()));
}

#[test]
fn scalars_pass_through() {
    let cleaned = clean_metadata(&as_map(json!({
        "title": "Quarterly report",
        "page": 4,
        "ratio": 0.25,
        "reviewed": true,
    })));

    assert_eq!(cleaned["title"], MetadataValue::from("Quarterly report"));
    assert_eq!(cleaned["page"], MetadataValue::from(4));
    assert_eq!(
        cleaned["ratio"],
        MetadataValue::Scalar(MetadataScalar::Float(0.25))
    );
    assert_eq!(
        cleaned["reviewed"],
        MetadataValue::Scalar(MetadataScalar::Bool(true))
    );
}

#[test]
fn empty_list_becomes_sentinel() {
    let cleaned = clean_metadata(&as_map(json!({ "tags": [] })));
    assert_eq!(cleaned["tags"], sentinel());
}

#[test]
fn non_empty_list_keeps_scalars_and_stringifies_the_rest() {
    let cleaned = clean_metadata(&as_map(json!({
        "tags": ["finance", 2024, null, {"k": "v"}, [1, 2]],
    })));

    assert_eq!(
        cleaned["tags"],
        MetadataValue::List(vec![
            MetadataScalar::Str("finance".to_string()),
            MetadataScalar::Int(2024),
            MetadataScalar::Str(NONE_SENTINEL.to_string()),
            MetadataScalar::Str(r#"{"k":"v"}"#.to_string()),
            MetadataScalar::Str("[1,2]".to_string()),
        ])
    );
}

#[test]
fn objects_are_stringified() {
    let cleaned = clean_metadata(&as_map(json!({
        "bbox": { "x": 1, "y": 2 },
    })));
    assert_eq!(cleaned["bbox"], MetadataValue::from(r#"{"x":1,"y":2}"#));
}

#[test]
fn large_unsigned_integers_become_floats() {
    let cleaned = clean_metadata(&as_map(json!({ "size": u64::MAX })));
    assert!(matches!(
        cleaned["size"],
        MetadataValue::Scalar(MetadataScalar::Float(_))
    ));
}

#[test]
fn cleaning_is_total() {
    let raw = as_map(json!({
        "a": null,
        "b": [],
        "c": [null],
        "d": {},
        "e": "",
        "f": -3,
        "g": [[], {}],
    }));
    let cleaned = clean_metadata(&raw);

    assert_eq!(cleaned.len(), raw.len());
    for key in raw.keys() {
        assert!(cleaned.contains_key(key), "missing key {key}");
    }
    for value in cleaned.values() {
        if let MetadataValue::List(items) = value {
            assert!(!items.is_empty(), "lists are never stored empty");
        }
    }
}

#[test]
fn cleaning_is_deterministic() {
    let raw = as_map(json!({
        "zeta": [3, "x", null],
        "alpha": { "nested": [1, 2, 3] },
        "mid": 1.5,
    }));

    let first = clean_metadata(&raw);
    let second = clean_metadata(&raw);
    assert_eq!(first, second);

    let first_json = serde_json::to_string(&first).expect("metadata serializes");
    let second_json = serde_json::to_string(&second).expect("metadata serializes");
    assert_eq!(first_json, second_json);
    assert!(first_json.starts_with(r#"{"alpha""#));
}

#[test]
fn stored_json_reads_back_identically() {
    let cleaned = clean_metadata(&as_map(json!({
        "doc_id": "report",
        "page": -1,
        "score": 2.0,
        "flags": [true, false],
    })));

    let stored = serde_json::to_string(&cleaned).expect("metadata serializes");
    let restored: Metadata = serde_json::from_str(&stored).expect("metadata deserializes");
    assert_eq!(cleaned, restored);
}
