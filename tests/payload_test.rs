use varflow::resolver::payload::build_request_payload_with;
use varflow::resolver::{build_request_payload, cache_key, significant_deps};
use varflow::runtime::store::VariableStore;
use varflow::variables::builder::{plain, DerivedBuilder};
use varflow::variables::PlainVariable;
use serde_json::{json, Value};

fn count_refs(value: &Value, reference: &str) -> usize {
    match value {
        Value::Object(map) => {
            if map.get("__ref").and_then(|r| r.as_str()) == Some(reference) {
                return 1;
            }
            map.values().map(|v| count_refs(v, reference)).sum()
        }
        Value::Array(items) => items.iter().map(|v| count_refs(v, reference)).sum(),
        _ => 0,
    }
}

#[test]
fn test_payload_for_nested_derived_variable() {
    let x = plain("x", 5);
    let d1 = DerivedBuilder::new("d1").dep(x).build();
    let y = plain("y", 1);
    let outer = DerivedBuilder::new("outer").dep(d1).input(y).build();

    let store = VariableStore::new();
    let payload = build_request_payload(&outer, &store).expect("payload failed");

    assert_eq!(
        serde_json::to_value(&payload).unwrap(),
        json!({
            "values": [
                {"type": "derived", "uid": "d1", "values": [{"__ref": "Variable:x"}], "force": false},
                {"__ref": "Variable:y"}
            ],
            "lookup": {"Variable:x": 5, "Variable:y": 1},
            "is_data_variable": false,
            "force": false
        })
    );
}

#[test]
fn test_lookup_deduplicates_shared_plain_variable() {
    let x = plain("x", 5);
    let left = DerivedBuilder::new("left").dep(x.clone()).build();
    let right = DerivedBuilder::new("right").dep(x.clone()).dep(left.clone()).build();
    let root = DerivedBuilder::new("root").dep(x).dep(left).dep(right).build();

    let store = VariableStore::new();
    let payload = build_request_payload(&root, &store).unwrap();

    assert_eq!(payload.lookup.len(), 1);
    assert_eq!(payload.lookup.get("Variable:x"), Some(&json!(5)));
    // root, left, right, and left again inside right
    let values = Value::Array(payload.values.clone());
    assert_eq!(count_refs(&values, "Variable:x"), 4);
}

#[test]
fn test_cache_key_is_deterministic() {
    let x = plain("x", json!({"z": 1, "a": 2}));
    let d = DerivedBuilder::new("d").dep(x).build_data(Some(json!({"value": "v", "column": "c"})));

    let store = VariableStore::new();
    let first = build_request_payload(&d, &store).unwrap().cache_key().unwrap();
    let second = build_request_payload(&d, &store).unwrap().cache_key().unwrap();
    assert_eq!(first, second);
    // keys come out sorted at every level
    assert!(first.find("\"column\"").unwrap() < first.find("\"value\":\"v\"").unwrap());
    assert!(first.find("\"a\":2").unwrap() < first.find("\"z\":1").unwrap());
}

#[test]
fn test_cache_key_tracks_values_and_filters() {
    let x = plain("x", 5);
    let filtered = |filters: Value| {
        DerivedBuilder::new("table").dep(x.clone()).build_data(Some(filters))
    };

    let store = VariableStore::new();
    let base = build_request_payload(&filtered(json!({"column": "col1", "value": "val1"})), &store).unwrap();
    let base_key = cache_key(&base).unwrap();

    let other_filters = build_request_payload(&filtered(json!({"column": "col1", "value": "val2"})), &store).unwrap();
    assert_ne!(cache_key(&other_filters).unwrap(), base_key);

    store.set("x", json!(6));
    let changed = build_request_payload(&filtered(json!({"column": "col1", "value": "val1"})), &store).unwrap();
    assert_ne!(cache_key(&changed).unwrap(), base_key);
}

#[test]
fn test_excluded_input_changes_payload_but_not_deps() {
    let x = plain("x", 5);
    let y = plain("y", 1);
    let derived = DerivedBuilder::new("d").dep(x).input(y).build();

    let store = VariableStore::new();
    let before_key = build_request_payload(&derived, &store).unwrap().cache_key().unwrap();
    let before_deps = significant_deps(&derived, &store);

    store.set("y", json!(2));
    let after = build_request_payload(&derived, &store).unwrap();
    assert_eq!(after.lookup.get("Variable:y"), Some(&json!(2)));
    assert_ne!(after.cache_key().unwrap(), before_key);
    assert_eq!(significant_deps(&derived, &store), before_deps);
}

#[test]
fn test_data_variable_payload_carries_filters() {
    let x = plain("x", 5);
    let table = DerivedBuilder::new("table")
        .dep(x)
        .build_data(Some(json!({"column": "col1", "value": "val1"})));

    let store = VariableStore::new();
    let payload = build_request_payload_with(&table, &store, true).unwrap();
    assert!(payload.is_data_variable);
    assert!(payload.force);
    assert_eq!(payload.filters, Some(json!({"column": "col1", "value": "val1"})));
    assert_eq!(payload.values, vec![json!({"__ref": "Variable:x"})]);

    // a forced request shares its cache entry with the plain one
    let plain_payload = build_request_payload(&table, &store).unwrap();
    assert_eq!(payload.cache_key().unwrap(), plain_payload.cache_key().unwrap());
}

#[test]
fn test_nested_paths_get_their_own_reference() {
    let name = PlainVariable::new("form", json!({"name": "ada", "age": 36})).nested(&["name"]);
    let age = PlainVariable::new("form", json!({"name": "ada", "age": 36})).nested(&["age"]);
    let derived = DerivedBuilder::new("card").dep(name).dep(age).build();

    let store = VariableStore::new();
    let payload = build_request_payload(&derived, &store).unwrap();
    assert_eq!(payload.lookup.get("Variable:form:name"), Some(&json!("ada")));
    assert_eq!(payload.lookup.get("Variable:form:age"), Some(&json!(36)));
}

#[test]
fn test_plain_variable_has_no_payload() {
    let store = VariableStore::new();
    assert!(build_request_payload(&plain("x", 1), &store).is_err());
}
