use prodboard::rows::{DropSide, RowKey};
use prodboard::schema::Registry;
use prodboard::section::reference_sections;
use prodboard::storage::MemoryStore;
use prodboard::{LedgerError, Period};

fn registry() -> Registry {
    Registry::new(Box::new(MemoryStore::new()), reference_sections())
}

fn extra_labels(registry: &Registry, section: &str, period: Period) -> Vec<String> {
    registry
        .resolve_rows(section, period)
        .unwrap()
        .into_iter()
        .filter(|r| r.is_extra())
        .map(|r| r.label)
        .collect()
}

#[test]
fn day_rows_follow_the_calendar() {
    let registry = registry();

    let leap = registry.resolve_rows("orgu", Period::new(2024, 2).unwrap()).unwrap();
    assert_eq!(leap.len(), 29);
    assert_eq!(leap[0].key, RowKey::Day(1));
    assert_eq!(leap[0].label, "01.02.2024");
    assert_eq!(leap[28].label, "29.02.2024");

    let common = registry.resolve_rows("orgu", Period::new(2025, 2).unwrap()).unwrap();
    assert_eq!(common.len(), 28);

    let january = registry.resolve_rows("orgu", Period::new(2025, 1).unwrap()).unwrap();
    assert_eq!(january.len(), 31);
}

#[test]
fn extra_rows_come_after_days_and_stay_in_their_period() {
    let mut registry = registry();
    let march = Period::new(2025, 3).unwrap();
    let april = Period::new(2025, 4).unwrap();

    let row = registry.add_row("paket", march, "  Returns ").unwrap();
    assert_eq!(row.label, "Returns");

    let rows = registry.resolve_rows("paket", march).unwrap();
    assert_eq!(rows.len(), 32);
    assert_eq!(rows[31].key, RowKey::Extra(row.id.clone()));
    assert!(rows[31].is_extra());

    assert_eq!(registry.resolve_rows("paket", april).unwrap().len(), 30);
}

#[test]
fn row_ids_are_unique() {
    let mut registry = registry();
    let period = Period::new(2025, 3).unwrap();
    let a = registry.add_row("paket", period, "A").unwrap();
    let b = registry.add_row("paket", period, "B").unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn empty_row_label_is_rejected() {
    let mut registry = registry();
    let period = Period::new(2025, 3).unwrap();
    assert!(matches!(
        registry.add_row("paket", period, " "),
        Err(LedgerError::InvalidInput(_))
    ));
}

#[test]
fn delete_row_removes_only_that_row() {
    let mut registry = registry();
    let period = Period::new(2025, 3).unwrap();
    let a = registry.add_row("paket", period, "A").unwrap();
    registry.add_row("paket", period, "B").unwrap();

    registry.delete_row("paket", period, &a.id).unwrap();
    assert_eq!(extra_labels(&registry, "paket", period), ["B"]);

    assert!(matches!(
        registry.delete_row("paket", period, &a.id),
        Err(LedgerError::RowNotFound(_))
    ));
}

#[test]
fn reorder_places_row_before_or_after_target() {
    let mut registry = registry();
    let period = Period::new(2025, 3).unwrap();
    let a = registry.add_row("dikim", period, "A").unwrap();
    let b = registry.add_row("dikim", period, "B").unwrap();
    let c = registry.add_row("dikim", period, "C").unwrap();

    registry
        .reorder_row("dikim", period, &c.id, &a.id, DropSide::Before)
        .unwrap();
    assert_eq!(extra_labels(&registry, "dikim", period), ["C", "A", "B"]);

    registry
        .reorder_row("dikim", period, &c.id, &b.id, DropSide::After)
        .unwrap();
    assert_eq!(extra_labels(&registry, "dikim", period), ["A", "B", "C"]);

    registry
        .reorder_row("dikim", period, &b.id, &b.id, DropSide::After)
        .unwrap();
    assert_eq!(extra_labels(&registry, "dikim", period), ["A", "B", "C"]);
}

#[test]
fn reorder_with_unknown_row_fails() {
    let mut registry = registry();
    let period = Period::new(2025, 3).unwrap();
    let a = registry.add_row("dikim", period, "A").unwrap();
    assert!(matches!(
        registry.reorder_row("dikim", period, &a.id, "missing", DropSide::Before),
        Err(LedgerError::RowNotFound(_))
    ));
}
