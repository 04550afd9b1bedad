//! Schema registry.
//!
//! A section's columns for one period are its base columns plus that
//! period's extra columns, minus the period's deletion set, arranged by the
//! period's persisted column order. Overlays are created lazily on first read
//! and never carried over to other periods.

use std::collections::{BTreeSet, HashMap};

use crate::error::{LedgerError, Result};
use crate::period::Period;
use crate::section::{Column, Origin, Section, UnitKind};
use crate::storage::{self, KvStore};

/// Columns to create through [`Registry::add_column`].
#[derive(Debug, Clone)]
pub struct NewColumn {
    pub label: String,
    pub unit: UnitKind,
    pub company: Option<String>,
}

/// Static section catalogue plus the per-period overlays kept in a [`KvStore`].
pub struct Registry {
    pub(crate) store: Box<dyn KvStore>,
    sections: Vec<Section>,
}

impl Registry {
    pub fn new(store: Box<dyn KvStore>, sections: Vec<Section>) -> Self {
        Registry { store, sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, id: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| LedgerError::UnknownSection(id.to_string()))
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn KvStore {
        self.store.as_mut()
    }

    pub(crate) fn extra_columns(&self, section: &str, period: Period) -> Vec<Column> {
        storage::load_json(self.store(), &storage::fields_key(section, period), Vec::new())
    }

    fn deleted_columns(&self, section: &str, period: Period) -> BTreeSet<String> {
        storage::load_json(self.store(), &storage::deleted_key(section, period), BTreeSet::new())
    }

    fn stored_order(&self, section: &str, period: Period) -> Option<Vec<String>> {
        storage::load_json(self.store(), &storage::order_key(section, period), None)
    }

    /// Live columns of `section` in `period`, in display order.
    ///
    /// The first call for a period without a stored order persists the
    /// natural order (base columns, then extra columns).
    pub fn resolve_columns(&mut self, section: &str, period: Period) -> Result<Vec<Column>> {
        let base = self.section(section)?.columns.clone();
        let deleted = self.deleted_columns(section, period);

        let live: Vec<Column> = base
            .into_iter()
            .chain(self.extra_columns(section, period).into_iter().map(|mut c| {
                c.origin = Origin::Extra;
                c
            }))
            .filter(|c| !deleted.contains(&c.id))
            .collect();

        let order = match self.stored_order(section, period) {
            Some(order) => order,
            None => {
                let initial: Vec<&str> = live.iter().map(|c| c.id.as_str()).collect();
                storage::save_json(
                    self.store_mut(),
                    &storage::order_key(section, period),
                    &initial,
                );
                return Ok(dedup_by_id(live));
            }
        };

        let mut pending: Vec<Option<Column>> = live.into_iter().map(Some).collect();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, column) in pending.iter().enumerate() {
            if let Some(column) = column {
                index.entry(column.id.clone()).or_insert(i);
            }
        }

        let mut ordered = Vec::with_capacity(pending.len());
        for id in &order {
            if let Some(i) = index.remove(id) {
                if let Some(column) = pending[i].take() {
                    ordered.push(column);
                }
            }
        }
        ordered.extend(pending.into_iter().flatten());
        Ok(dedup_by_id(ordered))
    }

    /// The persisted order with every live column present, initialising or
    /// completing it first.
    fn materialized_order(&mut self, section: &str, period: Period) -> Result<Vec<String>> {
        let resolved = self.resolve_columns(section, period)?;
        let order: Vec<String> = resolved.into_iter().map(|c| c.id).collect();
        storage::save_json(self.store_mut(), &storage::order_key(section, period), &order);
        Ok(order)
    }

    /// Add an extra column to `section` for `period` only and append it to the order.
    ///
    /// # Arguments
    /// * `new` - Label (trimmed, must not be empty), unit and optional company
    ///
    /// # Returns
    /// * `Result<Column>` - The stored column with its generated `extra_{section}_{millis}` id
    pub fn add_column(&mut self, section: &str, period: Period, new: NewColumn) -> Result<Column> {
        let label = new.label.trim();
        if label.is_empty() {
            return Err(LedgerError::InvalidInput("column label is empty".to_string()));
        }
        let company = new
            .company
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut order = self.materialized_order(section, period)?;
        let mut extras = self.extra_columns(section, period);
        let deleted = self.deleted_columns(section, period);

        let taken = |id: &str| {
            order.iter().any(|o| o == id)
                || extras.iter().any(|c| c.id == id)
                || deleted.contains(id)
        };
        let mut millis = chrono::Utc::now().timestamp_millis();
        let mut id = format!("extra_{}_{}", section, millis);
        while taken(&id) {
            millis += 1;
            id = format!("extra_{}_{}", section, millis);
        }

        let column = Column {
            id: id.clone(),
            label: label.to_string(),
            unit: new.unit,
            company,
            origin: Origin::Extra,
        };

        extras.push(column.clone());
        order.push(id);
        storage::save_json(self.store_mut(), &storage::fields_key(section, period), &extras);
        storage::save_json(self.store_mut(), &storage::order_key(section, period), &order);

        Ok(column)
    }

    /// Hide `column` in `period`. Other periods are untouched.
    pub fn delete_column(&mut self, section: &str, period: Period, column: &str) -> Result<()> {
        let live = self.resolve_columns(section, period)?;
        if !live.iter().any(|c| c.id == column) {
            return Err(LedgerError::ColumnNotFound(column.to_string()));
        }

        let mut deleted = self.deleted_columns(section, period);
        deleted.insert(column.to_string());

        let mut extras = self.extra_columns(section, period);
        extras.retain(|c| c.id != column);

        let mut order = self.stored_order(section, period).unwrap_or_default();
        order.retain(|id| id != column);

        storage::save_json(self.store_mut(), &storage::deleted_key(section, period), &deleted);
        storage::save_json(self.store_mut(), &storage::fields_key(section, period), &extras);
        storage::save_json(self.store_mut(), &storage::order_key(section, period), &order);

        Ok(())
    }

    /// Move `source` to the position `target` currently occupies.
    pub fn reorder_column(
        &mut self,
        section: &str,
        period: Period,
        source: &str,
        target: &str,
    ) -> Result<()> {
        let mut order = self.materialized_order(section, period)?;
        let from = order
            .iter()
            .position(|id| id == source)
            .ok_or_else(|| LedgerError::ColumnNotFound(source.to_string()))?;
        let to = order
            .iter()
            .position(|id| id == target)
            .ok_or_else(|| LedgerError::ColumnNotFound(target.to_string()))?;

        if from == to {
            return Ok(());
        }

        let moved = order.remove(from);
        order.insert(to, moved);
        storage::save_json(self.store_mut(), &storage::order_key(section, period), &order);

        Ok(())
    }
}

/// Keep the first column for each id.
fn dedup_by_id(columns: Vec<Column>) -> Vec<Column> {
    let mut seen = BTreeSet::new();
    columns
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}
