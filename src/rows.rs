//! Row registry: calendar-day rows plus user-added rows per section and period.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::period::{self, Period};
use crate::schema::Registry;
use crate::storage;

/// User-added row as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRow {
    pub id: String,
    pub label: String,
}

/// Key of a row inside a section's cell frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Day(u32),
    Extra(String),
}

impl RowKey {
    /// Parse a stored row key (`"7"` or `"x_<id>"`).
    pub fn parse(key: &str) -> Option<RowKey> {
        if let Some(id) = key.strip_prefix("x_") {
            return Some(RowKey::Extra(id.to_string()));
        }
        key.parse().ok().map(RowKey::Day)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Day(day) => write!(f, "{}", day),
            RowKey::Extra(id) => write!(f, "x_{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: RowKey,
    pub label: String,
}

impl Row {
    pub fn is_extra(&self) -> bool {
        matches!(self.key, RowKey::Extra(_))
    }
}

/// Where a dragged row lands relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropSide {
    #[default]
    Before,
    After,
}

impl Registry {
    pub fn extra_rows(&self, section: &str, period: Period) -> Vec<ExtraRow> {
        storage::load_json(self.store(), &storage::rows_key(section, period), Vec::new())
    }

    fn save_extra_rows(&mut self, section: &str, period: Period, rows: &[ExtraRow]) {
        storage::save_json(self.store_mut(), &storage::rows_key(section, period), rows);
    }

    /// Day rows `1..=days` followed by the period's extra rows in stored order.
    pub fn resolve_rows(&self, section: &str, period: Period) -> Result<Vec<Row>> {
        self.section(section)?;

        let days = (1..=period.days()).map(|day| Row {
            key: RowKey::Day(day),
            label: period::day_label(period, day),
        });
        let extras = self
            .extra_rows(section, period)
            .into_iter()
            .map(|r| Row {
                key: RowKey::Extra(r.id),
                label: r.label,
            });

        Ok(days.chain(extras).collect())
    }

    pub fn add_row(&mut self, section: &str, period: Period, label: &str) -> Result<ExtraRow> {
        self.section(section)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(LedgerError::InvalidInput("row label is empty".to_string()));
        }

        let mut rows = self.extra_rows(section, period);
        let mut millis = chrono::Utc::now().timestamp_millis();
        while rows.iter().any(|r| r.id == millis.to_string()) {
            millis += 1;
        }

        let row = ExtraRow {
            id: millis.to_string(),
            label: label.to_string(),
        };
        rows.push(row.clone());
        self.save_extra_rows(section, period, &rows);

        Ok(row)
    }

    pub fn delete_row(&mut self, section: &str, period: Period, id: &str) -> Result<()> {
        self.section(section)?;
        let mut rows = self.extra_rows(section, period);
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(LedgerError::RowNotFound(id.to_string()));
        }
        self.save_extra_rows(section, period, &rows);
        Ok(())
    }

    /// Move extra row `source` next to `target`. Day rows never move.
    pub fn reorder_row(
        &mut self,
        section: &str,
        period: Period,
        source: &str,
        target: &str,
        side: DropSide,
    ) -> Result<()> {
        self.section(section)?;
        if source == target {
            return Ok(());
        }

        let mut rows = self.extra_rows(section, period);
        let from = rows
            .iter()
            .position(|r| r.id == source)
            .ok_or_else(|| LedgerError::RowNotFound(source.to_string()))?;
        if !rows.iter().any(|r| r.id == target) {
            return Err(LedgerError::RowNotFound(target.to_string()));
        }

        let moved = rows.remove(from);
        let to = rows
            .iter()
            .position(|r| r.id == target)
            .ok_or_else(|| LedgerError::RowNotFound(target.to_string()))?;
        let insert_at = match side {
            DropSide::Before => to,
            DropSide::After => to + 1,
        };
        rows.insert(insert_at, moved);
        self.save_extra_rows(section, period, &rows);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_keys_round_trip_through_storage_form() {
        assert_eq!(RowKey::Day(7).to_string(), "7");
        assert_eq!(RowKey::Extra("1700".into()).to_string(), "x_1700");
        assert_eq!(RowKey::parse("x_1700"), Some(RowKey::Extra("1700".into())));
        assert_eq!(RowKey::parse("12"), Some(RowKey::Day(12)));
        assert_eq!(RowKey::parse("total"), None);
    }
}
