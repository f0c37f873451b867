#![allow(clippy::unwrap_used)]

use exam_notifier_bot::storage::sanitize::{sanitize, sanitize_report, StateValue};
use std::collections::BTreeMap;

fn lock_handle() -> StateValue {
    StateValue::opaque(tokio::sync::Mutex::new(()))
}

#[test]
fn test_plain_values_pass_through_unchanged() {
    let value = StateValue::map([
        ("grades", StateValue::Set(vec![StateValue::text("9"), StateValue::text("11")])),
        ("wantsUpdate", StateValue::Bool(true)),
        ("days", StateValue::Int(14)),
        ("name", StateValue::text("נועה")),
        ("ratio", StateValue::Float(0.5)),
        ("pair", StateValue::Tuple(vec![StateValue::Int(1), StateValue::Null])),
    ]);

    let (clean, dropped) = sanitize_report(&value);
    assert_eq!(clean, Some(value));
    assert_eq!(dropped, 0);
}

#[test]
fn test_map_entry_with_opaque_value_loses_its_key() {
    let value = StateValue::map([("lock", lock_handle()), ("days", StateValue::Int(7))]);

    let clean = sanitize(&value).unwrap();
    assert_eq!(clean, StateValue::map([("days", StateValue::Int(7))]));
    assert!(clean.get("lock").is_none());
}

#[test]
fn test_sequence_elements_are_dropped_in_place() {
    let value = StateValue::Seq(vec![
        StateValue::Int(1),
        lock_handle(),
        StateValue::Int(2),
        StateValue::Float(f64::NAN),
    ]);

    let (clean, dropped) = sanitize_report(&value);
    assert_eq!(clean, Some(StateValue::Seq(vec![StateValue::Int(1), StateValue::Int(2)])));
    assert_eq!(dropped, 2);
}

#[test]
fn test_container_kind_is_preserved_when_emptied() {
    let tuple = StateValue::Tuple(vec![lock_handle()]);
    let set = StateValue::Set(vec![lock_handle(), lock_handle()]);

    assert_eq!(sanitize(&tuple), Some(StateValue::Tuple(vec![])));
    assert_eq!(sanitize(&set), Some(StateValue::Set(vec![])));
    assert_eq!(sanitize(&StateValue::map([("x", lock_handle())])), Some(StateValue::Map(BTreeMap::new())));
}

#[test]
fn test_nested_structures_are_cleaned_at_every_depth() {
    let value = StateValue::map([(
        "outer",
        StateValue::Seq(vec![StateValue::map([
            ("keep", StateValue::text("yes")),
            ("drop", StateValue::Tuple(vec![lock_handle(), StateValue::Bool(false)])),
        ])]),
    )]);

    let expected = StateValue::map([(
        "outer",
        StateValue::Seq(vec![StateValue::map([
            ("keep", StateValue::text("yes")),
            ("drop", StateValue::Tuple(vec![StateValue::Bool(false)])),
        ])]),
    )]);
    assert_eq!(sanitize(&value), Some(expected));
}

#[test]
fn test_bare_unpersistable_leaf_has_no_clean_form() {
    assert_eq!(sanitize(&lock_handle()), None);
    assert_eq!(sanitize(&StateValue::Float(f64::INFINITY)), None);
}

#[test]
fn test_infinite_float_inside_map_is_removed() {
    let value = StateValue::map([("a", StateValue::Float(f64::NEG_INFINITY)), ("b", StateValue::Float(1.5))]);
    assert_eq!(sanitize(&value), Some(StateValue::map([("b", StateValue::Float(1.5))])));
}

#[test]
fn test_sanitizing_twice_changes_nothing() {
    let value = StateValue::map([
        ("lock", lock_handle()),
        ("list", StateValue::Seq(vec![lock_handle(), StateValue::Int(3)])),
    ]);

    let once = sanitize(&value).unwrap();
    let twice = sanitize(&once).unwrap();
    assert_eq!(once, twice);
    assert_eq!(sanitize_report(&once).1, 0);
}

#[test]
fn test_input_is_not_mutated() {
    let value = StateValue::Seq(vec![lock_handle(), StateValue::Int(3)]);
    let before = value.clone();
    let _ = sanitize(&value);
    assert_eq!(value, before);
}
