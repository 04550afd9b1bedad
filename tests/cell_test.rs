use prodboard::cell::{CellData, CellStore, coerce_number};
use prodboard::{Period, RowKey};
use serde_json::json;

#[test]
fn unset_cells_read_as_empty_and_zero() {
    let store = CellStore::default();
    let period = Period::new(2025, 1).unwrap();
    let raw = store.get(period, "orgu", &RowKey::Day(1), "kyass");
    assert_eq!(raw, "");
    assert_eq!(coerce_number(&raw), 0.0);
}

#[test]
fn set_then_get_returns_the_value() {
    let mut store = CellStore::default();
    let period = Period::new(2025, 1).unwrap();
    let row = RowKey::Extra("1700".to_string());

    store.set(period, "orgu", &row, "kyass", "12.5");
    assert_eq!(store.get(period, "orgu", &row, "kyass"), "12.5");
    assert_eq!(store.get(Period::new(2025, 2).unwrap(), "orgu", &row, "kyass"), "");
}

#[test]
fn snapshots_are_not_affected_by_later_writes() {
    let mut store = CellStore::default();
    let period = Period::new(2025, 1).unwrap();
    let day = RowKey::Day(3);

    store.set(period, "orgu", &day, "kyass", "1");
    let before = store.snapshot();
    let after = store.set(period, "orgu", &day, "kyass", "2");

    assert_eq!(before.get(period, "orgu", &day, "kyass"), Some("1"));
    assert_eq!(after.get(period, "orgu", &day, "kyass"), Some("2"));
}

#[test]
fn blob_uses_nested_string_keys() {
    let mut data = CellData::new();
    let period = Period::new(2025, 1).unwrap();
    data.set(period, "orgu", &RowKey::Day(5), "kyass", "40");
    data.set(period, "orgu", &RowKey::Extra("9".into()), "doca", "3");

    assert_eq!(
        data.to_json(),
        json!({ "2025-1": { "orgu": { "5": { "kyass": "40" }, "x_9": { "doca": "3" } } } })
    );
}

#[test]
fn lenient_blob_parsing() {
    let blob = json!({ "2025-1": { "orgu": { "5": { "kyass": 40, "doca": null, "simliss": "7" } } } });
    let data = CellData::from_json(&blob).unwrap();
    let period = Period::new(2025, 1).unwrap();

    assert_eq!(data.get(period, "orgu", &RowKey::Day(5), "kyass"), Some("40"));
    assert_eq!(data.get(period, "orgu", &RowKey::Day(5), "doca"), None);
    assert_eq!(data.get(period, "orgu", &RowKey::Day(5), "simliss"), Some("7"));

    assert!(CellData::from_json(&json!([1, 2])).is_err());
    assert!(CellData::from_json(&json!({ "2025-1": { "orgu": { "5": { "k": [1] } } } })).is_err());
}
