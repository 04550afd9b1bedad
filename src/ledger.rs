//! The ledger ties the registries, the cell store and the selection metadata
//! together and is the only entry point views use.
//!
//! Every mutator bumps a monotonic revision and notifies subscribers; derived
//! views (the dashboard) are memoised against that revision. Mutators take a
//! [`Privilege`], so read-only callers cannot reach them at all.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::aggregate::{
    self, ColumnTotal, CompanyFilter, FirmMonth, SectionTotal, TrendPoint,
};
use crate::cell::{CellData, CellStore};
use crate::downloader::{self, Workbook};
use crate::error::{LedgerError, Result};
use crate::login::Privilege;
use crate::meta::Metadata;
use crate::period::{Granularity, Period};
use crate::rows::{DropSide, ExtraRow, Row, RowKey};
use crate::schema::{NewColumn, Registry};
use crate::section::{Column, DASHBOARD_ID, Section, color_for};
use crate::storage::{self, KvStore};

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    CellChanged {
        period: Period,
        section: String,
        row: RowKey,
        column: String,
    },
    SchemaChanged {
        period: Period,
        section: String,
    },
    RowsChanged {
        period: Period,
        section: String,
    },
    DataReplaced,
    MetaChanged,
    ExternalChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirmSeries {
    pub firm: String,
    pub color: String,
}

/// Everything the dashboard screen renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub period: Period,
    pub granularity: Granularity,
    pub companies: Vec<String>,
    pub totals: Vec<SectionTotal>,
    pub trend: Vec<TrendPoint>,
    pub firms: Vec<FirmSeries>,
    pub firm_monthly: Vec<FirmMonth>,
}

/// Everything a section form renders for one period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub section: String,
    pub name: String,
    pub color: String,
    pub period: Period,
    pub columns: Vec<Column>,
    pub rows: Vec<ViewRow>,
    pub totals: Vec<ColumnTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    pub key: String,
    pub label: String,
    pub extra: bool,
    pub values: Vec<String>,
}

#[derive(Clone, PartialEq)]
struct DashboardKey {
    revision: u64,
    period: Period,
    granularity: Granularity,
    filter: CompanyFilter,
}

pub struct Ledger {
    registry: Registry,
    cells: CellStore,
    meta: Metadata,
    revision: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    dashboard_cache: Option<(DashboardKey, Arc<Dashboard>)>,
}

impl Ledger {
    /// Load cell data and metadata from `store`.
    pub fn open(store: Box<dyn KvStore>, sections: Vec<Section>) -> Self {
        let data: CellData = storage::load_json(store.as_ref(), &storage::data_key(), CellData::new());
        let meta = Metadata::load(store.as_ref());

        Ledger {
            registry: Registry::new(store, sections),
            cells: CellStore::new(data),
            meta,
            revision: 0,
            listeners: Vec::new(),
            next_subscription: 0,
            dashboard_cache: None,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn sections(&self) -> &[Section] {
        self.registry.sections()
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn snapshot(&self) -> Arc<CellData> {
        self.cells.snapshot()
    }

    /// The cell store as a JSON blob, as mirrored remotely.
    pub fn blob(&self) -> Value {
        self.cells.snapshot().to_json()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(sid, _)| *sid != id);
    }

    fn changed(&mut self, event: ChangeEvent) {
        self.revision += 1;
        self.dashboard_cache = None;
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }

    fn persist_cells(&mut self) {
        let snapshot = self.cells.snapshot();
        storage::save_json(self.registry.store_mut(), &storage::data_key(), snapshot.as_ref());
    }

    // ---- metadata ----

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn set_period(&mut self, period: Period) {
        if self.meta.year == period.year && self.meta.month == period.month {
            return;
        }
        self.meta.year = period.year;
        self.meta.month = period.month;
        self.meta.save(self.registry.store_mut());
        self.changed(ChangeEvent::MetaChanged);
    }

    /// Select a section, or the dashboard with [`DASHBOARD_ID`].
    pub fn set_active(&mut self, active: &str) -> Result<()> {
        if active != DASHBOARD_ID {
            self.registry.section(active)?;
        }
        if self.meta.active == active {
            return Ok(());
        }
        self.meta.active = active.to_string();
        self.meta.save(self.registry.store_mut());
        self.changed(ChangeEvent::MetaChanged);
        Ok(())
    }

    pub fn set_granularity(&mut self, granularity: Granularity) {
        if self.meta.granularity == granularity {
            return;
        }
        self.meta.granularity = granularity;
        self.meta.save(self.registry.store_mut());
        self.changed(ChangeEvent::MetaChanged);
    }

    // ---- cells ----

    pub fn get_cell(&self, period: Period, section: &str, row: &RowKey, column: &str) -> String {
        self.cells.get(period, section, row, column)
    }

    /// Write a cell and persist the whole store before returning.
    ///
    /// # Arguments
    /// * `row` - A row resolved for `period` (a day of that month or one of its extra rows)
    /// * `column` - A live column of `section` in `period`
    ///
    /// # Returns
    /// * `Result<Arc<CellData>>` - The snapshot holding the new value
    pub fn set_cell(
        &mut self,
        _privilege: &Privilege,
        period: Period,
        section: &str,
        row: &RowKey,
        column: &str,
        value: &str,
    ) -> Result<Arc<CellData>> {
        let rows = self.registry.resolve_rows(section, period)?;
        if !rows.iter().any(|r| &r.key == row) {
            return Err(LedgerError::RowNotFound(row.to_string()));
        }
        let columns = self.registry.resolve_columns(section, period)?;
        if !columns.iter().any(|c| c.id == column) {
            return Err(LedgerError::ColumnNotFound(column.to_string()));
        }

        let snapshot = self.cells.set(period, section, row, column, value);
        self.persist_cells();
        self.changed(ChangeEvent::CellChanged {
            period,
            section: section.to_string(),
            row: row.clone(),
            column: column.to_string(),
        });
        Ok(snapshot)
    }

    /// Replace the whole cell store with a fetched remote blob.
    pub fn apply_remote(&mut self, blob: &Value) -> Result<()> {
        let data = CellData::from_json(blob)?;
        self.cells.replace(data);
        self.persist_cells();
        self.changed(ChangeEvent::DataReplaced);
        Ok(())
    }

    /// Re-derive everything if another writer changed the store.
    pub fn refresh_external(&mut self) -> bool {
        if !self.registry.store_mut().poll_external_change() {
            return false;
        }
        let data = storage::load_json(self.registry.store(), &storage::data_key(), CellData::new());
        self.cells.replace(data);
        self.meta = Metadata::load(self.registry.store());
        self.changed(ChangeEvent::ExternalChange);
        true
    }

    // ---- schema ----

    pub fn columns(&mut self, section: &str, period: Period) -> Result<Vec<Column>> {
        self.registry.resolve_columns(section, period)
    }

    pub fn rows(&self, section: &str, period: Period) -> Result<Vec<Row>> {
        self.registry.resolve_rows(section, period)
    }

    pub fn add_column(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        new: NewColumn,
    ) -> Result<Column> {
        let column = self.registry.add_column(section, period, new)?;
        self.schema_changed(section, period);
        Ok(column)
    }

    pub fn delete_column(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        column: &str,
    ) -> Result<()> {
        self.registry.delete_column(section, period, column)?;
        self.schema_changed(section, period);
        Ok(())
    }

    pub fn reorder_column(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        source: &str,
        target: &str,
    ) -> Result<()> {
        self.registry.reorder_column(section, period, source, target)?;
        self.schema_changed(section, period);
        Ok(())
    }

    fn schema_changed(&mut self, section: &str, period: Period) {
        self.changed(ChangeEvent::SchemaChanged {
            period,
            section: section.to_string(),
        });
    }

    pub fn add_row(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        label: &str,
    ) -> Result<ExtraRow> {
        let row = self.registry.add_row(section, period, label)?;
        self.rows_changed(section, period);
        Ok(row)
    }

    pub fn delete_row(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        id: &str,
    ) -> Result<()> {
        self.registry.delete_row(section, period, id)?;
        self.rows_changed(section, period);
        Ok(())
    }

    pub fn reorder_row(
        &mut self,
        _privilege: &Privilege,
        section: &str,
        period: Period,
        source: &str,
        target: &str,
        side: DropSide,
    ) -> Result<()> {
        self.registry.reorder_row(section, period, source, target, side)?;
        self.rows_changed(section, period);
        Ok(())
    }

    fn rows_changed(&mut self, section: &str, period: Period) {
        self.changed(ChangeEvent::RowsChanged {
            period,
            section: section.to_string(),
        });
    }

    // ---- views ----

    pub fn section_view(&mut self, section: &str, period: Period) -> Result<SectionView> {
        let (name, color) = {
            let s = self.registry.section(section)?;
            (s.name.clone(), s.color.clone())
        };
        let columns = self.registry.resolve_columns(section, period)?;
        let rows = self.registry.resolve_rows(section, period)?;
        let data = self.cells.snapshot();
        let totals = aggregate::column_totals(&mut self.registry, &data, section, period)?;

        let rows = rows
            .into_iter()
            .map(|row| ViewRow {
                values: columns
                    .iter()
                    .map(|c| data.get(period, section, &row.key, &c.id).unwrap_or("").to_string())
                    .collect(),
                extra: row.is_extra(),
                key: row.key.to_string(),
                label: row.label,
            })
            .collect();

        Ok(SectionView {
            section: section.to_string(),
            name,
            color,
            period,
            columns,
            rows,
            totals,
        })
    }

    pub fn companies(&mut self) -> Result<Vec<String>> {
        let period = self.meta.period();
        aggregate::list_companies(&mut self.registry, period)
    }

    /// Dashboard for the selected period and granularity, recomputed only
    /// when the revision or the query changed.
    pub fn dashboard(&mut self, filter: &CompanyFilter) -> Result<Arc<Dashboard>> {
        let key = DashboardKey {
            revision: self.revision,
            period: self.meta.period(),
            granularity: self.meta.granularity,
            filter: filter.clone(),
        };
        if let Some((cached_key, dashboard)) = &self.dashboard_cache {
            if *cached_key == key {
                return Ok(Arc::clone(dashboard));
            }
        }

        let data = self.cells.snapshot();
        let period = key.period;
        let granularity = key.granularity;
        let registry = &mut self.registry;

        let companies = aggregate::list_companies(registry, period)?;
        let totals = aggregate::section_totals(registry, &data, period, granularity, filter)?;
        let trend = aggregate::trend(registry, &data, period, granularity, filter)?;
        let firms = aggregate::company_set(registry, period)?
            .into_iter()
            .map(|firm| FirmSeries {
                color: color_for(&firm).to_string(),
                firm,
            })
            .collect();
        let firm_monthly = aggregate::firm_monthly(registry, &data, period)?;

        let dashboard = Arc::new(Dashboard {
            period,
            granularity,
            companies,
            totals,
            trend,
            firms,
            firm_monthly,
        });
        self.dashboard_cache = Some((key, Arc::clone(&dashboard)));
        Ok(dashboard)
    }

    pub fn export_monthly(&mut self, period: Period, filter: &CompanyFilter) -> Result<Workbook> {
        let data = self.cells.snapshot();
        let granularity = self.meta.granularity;
        downloader::export_monthly(&mut self.registry, &data, period, granularity, filter)
    }

    pub fn export_yearly(&mut self, year: i32, filter: &CompanyFilter) -> Result<Workbook> {
        if Period::new(year, 1).is_err() {
            return Err(LedgerError::InvalidPeriod { year, month: 1 });
        }
        let data = self.cells.snapshot();
        downloader::export_yearly(&mut self.registry, &data, year, filter)
    }
}
