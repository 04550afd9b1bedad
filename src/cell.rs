use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LedgerError, Result};
use crate::period::Period;
use crate::rows::RowKey;

/// column id -> raw value
pub type RowCells = BTreeMap<String, String>;
/// row key -> row
pub type SectionCells = BTreeMap<String, RowCells>;
/// section id -> section
pub type PeriodCells = BTreeMap<String, SectionCells>;

/// Every cell value ever entered, keyed `"{year}-{month}"` -> section -> row -> column.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct CellData(BTreeMap<String, PeriodCells>);

impl CellData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, period: Period, section: &str, row: &RowKey, column: &str) -> Option<&str> {
        self.0
            .get(&period.key())?
            .get(section)?
            .get(&row.to_string())?
            .get(column)
            .map(String::as_str)
    }

    pub fn section(&self, period: Period, section: &str) -> Option<&SectionCells> {
        self.0.get(&period.key())?.get(section)
    }

    pub fn set(&mut self, period: Period, section: &str, row: &RowKey, column: &str, value: &str) {
        self.0
            .entry(period.key())
            .or_default()
            .entry(section.to_string())
            .or_default()
            .entry(row.to_string())
            .or_default()
            .insert(column.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from an arbitrary JSON blob. String leaves are kept, numeric and
    /// boolean leaves are stringified, `null` leaves are dropped. Anything not
    /// shaped like a four-level object is rejected.
    pub fn from_json(blob: &Value) -> Result<Self> {
        let periods = as_object(blob, "root")?;
        let mut data = CellData::new();

        for (period_key, sections) in periods {
            let mut period_cells = PeriodCells::new();
            for (section, rows) in as_object(sections, period_key)? {
                let mut section_cells = SectionCells::new();
                for (row, columns) in as_object(rows, section)? {
                    let mut row_cells = RowCells::new();
                    for (column, value) in as_object(columns, row)? {
                        let text = match value {
                            Value::String(s) => s.clone(),
                            Value::Number(n) => n.to_string(),
                            Value::Bool(b) => b.to_string(),
                            Value::Null => continue,
                            _ => {
                                return Err(LedgerError::InvalidInput(format!(
                                    "cell {}/{}/{}/{} is not a scalar",
                                    period_key, section, row, column
                                )));
                            }
                        };
                        row_cells.insert(column.clone(), text);
                    }
                    section_cells.insert(row.clone(), row_cells);
                }
                period_cells.insert(section.clone(), section_cells);
            }
            data.0.insert(period_key.clone(), period_cells);
        }

        Ok(data)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn as_object<'a>(value: &'a Value, at: &str) -> Result<&'a serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| LedgerError::InvalidInput(format!("expected an object at {}", at)))
}

/// Copy-on-write holder of the current [`CellData`].
///
/// Snapshots handed out by [`CellStore::snapshot`] are never mutated: a
/// write while a snapshot is alive clones the data first.
#[derive(Debug, Default, Clone)]
pub struct CellStore {
    data: Arc<CellData>,
}

impl CellStore {
    pub fn new(data: CellData) -> Self {
        CellStore {
            data: Arc::new(data),
        }
    }

    pub fn snapshot(&self) -> Arc<CellData> {
        Arc::clone(&self.data)
    }

    /// Raw value of a cell, empty when unset.
    pub fn get(&self, period: Period, section: &str, row: &RowKey, column: &str) -> String {
        self.data
            .get(period, section, row, column)
            .unwrap_or("")
            .to_string()
    }

    /// Write a cell and return the new snapshot.
    pub fn set(
        &mut self,
        period: Period,
        section: &str,
        row: &RowKey,
        column: &str,
        value: &str,
    ) -> Arc<CellData> {
        Arc::make_mut(&mut self.data).set(period, section, row, column, value);
        self.snapshot()
    }

    pub fn replace(&mut self, data: CellData) {
        self.data = Arc::new(data);
    }
}

/// Numeric reading of a raw cell value. Anything that is not a finite number counts as zero.
pub fn coerce_number(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Restrict typed input to digits and decimal points, as the editing surface does.
pub fn sanitize_input(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_never_fails() {
        assert_eq!(coerce_number("12.5"), 12.5);
        assert_eq!(coerce_number(" 7 "), 7.0);
        assert_eq!(coerce_number("abc"), 0.0);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("1.2.3"), 0.0);
        assert_eq!(coerce_number("inf"), 0.0);
        assert_eq!(coerce_number("NaN"), 0.0);
    }

    #[test]
    fn sanitize_keeps_digits_and_points() {
        assert_eq!(sanitize_input("1a2.5kg"), "12.5");
        assert_eq!(sanitize_input("-40"), "40");
    }
}
