use varflow::error::ResolveError;
use varflow::resolver::{resolve_display, significant_deps};
use varflow::runtime::store::VariableStore;
use varflow::variables::builder::{plain, DerivedBuilder};
use varflow::variables::{DerivedVariable, Variable};
use serde_json::json;

#[test]
fn test_display_single_dependency() {
    let x = plain("x", 5);
    let d1 = DerivedBuilder::new("d1").dep(x).build();

    let store = VariableStore::new();
    let resolved = resolve_display(&d1, &store).expect("resolution failed");

    assert_eq!(
        resolved.to_json().unwrap(),
        json!({"type": "derived", "uid": "d1", "values": [5], "deps": [5]})
    );
}

#[test]
fn test_display_nested_derived_tree() {
    let single = plain("single", 5);
    let nested = DerivedBuilder::new("nested-derived").dep(single).build();
    let number = plain("single-number", 1);
    let derived = DerivedBuilder::new("derived").dep(nested).dep(number).build();

    let store = VariableStore::new();
    let resolved = resolve_display(&derived, &store).unwrap().to_json().unwrap();

    assert_eq!(
        resolved,
        json!({
            "type": "derived",
            "uid": "derived",
            "values": [
                {"type": "derived", "uid": "nested-derived", "values": [5], "deps": [5]},
                1
            ],
            // a nested derived dep compares by its own significant deps
            "deps": [[5], 1]
        })
    );
}

#[test]
fn test_display_derived_data_carries_filters() {
    let x = plain("x", 5);
    let table = DerivedBuilder::new("derived")
        .dep(x)
        .build_data(Some(json!({"column": "col1", "value": "val1"})));

    let store = VariableStore::new();
    let resolved = resolve_display(&table, &store).unwrap().to_json().unwrap();

    assert_eq!(
        resolved,
        json!({
            "type": "derived-data",
            "uid": "derived",
            "values": [5],
            "deps": [5],
            "filters": {"column": "col1", "value": "val1"}
        })
    );
}

#[test]
fn test_display_plain_uses_store_value() {
    let x = plain("x", 5);
    let store = VariableStore::new();
    assert_eq!(resolve_display(&x, &store).unwrap().to_json().unwrap(), json!(5));

    store.set("x", json!(9));
    assert_eq!(resolve_display(&x, &store).unwrap().to_json().unwrap(), json!(9));

    store.reset("x");
    assert_eq!(resolve_display(&x, &store).unwrap().to_json().unwrap(), json!(5));
}

#[test]
fn test_display_is_deterministic() {
    let x = plain("x", json!({"b": 1, "a": [1, 2]}));
    let y = plain("y", "text");
    let inner = DerivedBuilder::new("inner").dep(x.clone()).input(y.clone()).build();
    let outer = DerivedBuilder::new("outer").dep(inner).input(y).dep(x).build();

    let store = VariableStore::new();
    let first = serde_json::to_string(&resolve_display(&outer, &store).unwrap()).unwrap();
    let second = serde_json::to_string(&resolve_display(&outer, &store).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_inputs_outside_deps_are_not_significant() {
    let x = plain("x", 5);
    let y = plain("y", 1);
    let derived = DerivedBuilder::new("d").dep(x).input(y).build();

    let store = VariableStore::new();
    let before = significant_deps(&derived, &store);
    store.set("y", json!(100));
    let after = significant_deps(&derived, &store);
    assert_eq!(before, vec![json!(5)]);
    assert_eq!(before, after);

    store.set("x", json!(6));
    assert_eq!(significant_deps(&derived, &store), vec![json!(6)]);
}

#[test]
fn test_dep_missing_from_variables_is_rejected() {
    let x = plain("x", 5);
    let stray = plain("stray", 0);
    let invalid = Variable::Derived(DerivedVariable {
        uid: "bad".to_string(),
        variables: vec![x],
        deps: vec![stray],
        nested: Vec::new(),
    });

    let store = VariableStore::new();
    let err = resolve_display(&invalid, &store).unwrap_err();
    assert!(matches!(err, ResolveError::InvalidGraph(_)), "unexpected error: {err}");

    // the check reaches nested derived variables as well
    let outer = DerivedBuilder::new("outer").dep(invalid).build();
    assert!(matches!(resolve_display(&outer, &store), Err(ResolveError::InvalidGraph(_))));
}

#[test]
fn test_nested_plain_path_selects_sub_field() {
    let form = varflow::variables::PlainVariable::new("form", json!({"user": {"name": "ada"}}))
        .nested(&["user", "name"]);
    let derived = DerivedBuilder::new("greeting").dep(form).build();

    let store = VariableStore::new();
    let resolved = resolve_display(&derived, &store).unwrap().to_json().unwrap();
    assert_eq!(resolved["values"], json!(["ada"]));

    store.set("form", json!({"user": {"name": "grace"}}));
    let resolved = resolve_display(&derived, &store).unwrap().to_json().unwrap();
    assert_eq!(resolved["deps"], json!(["grace"]));
}
