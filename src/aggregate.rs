//! Aggregation engine: section totals, company enumeration and trend series
//! over the cell store, for one month or a whole year.
//!
//! Every reduction walks the resolved schema of each month it covers (the
//! schema can differ month to month) and the resolved rows of that month, and
//! reads values through [`coerce_number`].

use serde::{Deserialize, Serialize};

use crate::cell::{CellData, coerce_number};
use crate::error::Result;
use crate::period::{Granularity, Period, pad2};
use crate::rows::RowKey;
use crate::schema::Registry;
use crate::section::{Column, UnitKind, is_filter_company};

/// Sentinel company selecting every column.
pub const ALL_COMPANIES: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompanyFilter {
    #[default]
    All,
    Company(String),
}

impl CompanyFilter {
    /// `None`, empty or the [`ALL_COMPANIES`] sentinel select everything.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some(ALL_COMPANIES) => CompanyFilter::All,
            Some(name) => CompanyFilter::Company(name.to_string()),
        }
    }

    pub fn matches(&self, column: &Column) -> bool {
        match self {
            CompanyFilter::All => true,
            CompanyFilter::Company(name) => column.rollup_company() == Some(name.as_str()),
        }
    }
}

/// Count and weight accumulated separately.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Amount {
    pub count: f64,
    pub weight: f64,
}

impl Amount {
    fn add(&mut self, unit: UnitKind, value: f64) {
        match unit {
            UnitKind::Count => self.count += value,
            UnitKind::Weight => self.weight += value,
        }
    }

    /// Count and weight added together, ignoring units.
    pub fn mixed(&self) -> f64 {
        self.count + self.weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTotal {
    pub id: String,
    pub name: String,
    pub color: String,
    pub count: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub label: String,
    pub count: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmAmount {
    pub firm: String,
    /// Count and weight summed together; what the stacked company chart plots.
    pub total: f64,
    pub count: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmMonth {
    pub label: String,
    pub firms: Vec<FirmAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTotal {
    pub column: String,
    pub total: f64,
}

/// Sum of `section` over its resolved rows and the resolved columns accepted by `filter`.
fn section_amount(
    registry: &mut Registry,
    data: &CellData,
    section: &str,
    period: Period,
    filter: &CompanyFilter,
) -> Result<Amount> {
    let columns = registry.resolve_columns(section, period)?;
    let rows = registry.resolve_rows(section, period)?;
    let mut amount = Amount::default();

    let frame = match data.section(period, section) {
        Some(frame) => frame,
        None => return Ok(amount),
    };

    for row in &rows {
        let cells = match frame.get(&row.key.to_string()) {
            Some(cells) => cells,
            None => continue,
        };
        for column in columns.iter().filter(|c| filter.matches(c)) {
            if let Some(raw) = cells.get(&column.id) {
                amount.add(column.unit, coerce_number(raw));
            }
        }
    }

    Ok(amount)
}

/// Per-section count and weight totals for the selected month, or for the
/// whole year when `granularity` is yearly.
pub fn section_totals(
    registry: &mut Registry,
    data: &CellData,
    period: Period,
    granularity: Granularity,
    filter: &CompanyFilter,
) -> Result<Vec<SectionTotal>> {
    let sections = registry.sections().to_vec();
    let months: Vec<Period> = match granularity {
        Granularity::Monthly => vec![period],
        Granularity::Yearly => Period::months_of(period.year).collect(),
    };

    let mut totals = Vec::with_capacity(sections.len());
    for section in &sections {
        let mut amount = Amount::default();
        for month in &months {
            let part = section_amount(registry, data, &section.id, *month, filter)?;
            amount.count += part.count;
            amount.weight += part.weight;
        }
        totals.push(SectionTotal {
            id: section.id.clone(),
            name: section.name.clone(),
            color: section.color.clone(),
            count: amount.count,
            weight: amount.weight,
        });
    }

    Ok(totals)
}

/// Distinct rollup companies of `period` across all sections, in first-seen
/// order, without the synthetic top-up company.
pub fn company_set(registry: &mut Registry, period: Period) -> Result<Vec<String>> {
    let section_ids: Vec<String> = registry.sections().iter().map(|s| s.id.clone()).collect();
    let mut companies: Vec<String> = Vec::new();

    for id in &section_ids {
        for column in registry.resolve_columns(id, period)? {
            let company = column.rollup_company();
            if is_filter_company(company) {
                if let Some(company) = company {
                    if !companies.iter().any(|c| c == company) {
                        companies.push(company.to_string());
                    }
                }
            }
        }
    }

    Ok(companies)
}

/// Company filter choices: the [`ALL_COMPANIES`] sentinel followed by [`company_set`].
pub fn list_companies(registry: &mut Registry, period: Period) -> Result<Vec<String>> {
    let mut list = vec![ALL_COMPANIES.to_string()];
    list.extend(company_set(registry, period)?);
    Ok(list)
}

/// Daily points for the selected month, or monthly points for its year.
pub fn trend(
    registry: &mut Registry,
    data: &CellData,
    period: Period,
    granularity: Granularity,
    filter: &CompanyFilter,
) -> Result<Vec<TrendPoint>> {
    let section_ids: Vec<String> = registry.sections().iter().map(|s| s.id.clone()).collect();

    match granularity {
        Granularity::Monthly => {
            let mut columns_by_section = Vec::with_capacity(section_ids.len());
            for id in &section_ids {
                columns_by_section.push((id.clone(), registry.resolve_columns(id, period)?));
            }

            let points = (1..=period.days())
                .map(|day| {
                    let key = RowKey::Day(day);
                    let mut amount = Amount::default();
                    for (id, columns) in &columns_by_section {
                        for column in columns.iter().filter(|c| filter.matches(c)) {
                            if let Some(raw) = data.get(period, id, &key, &column.id) {
                                amount.add(column.unit, coerce_number(raw));
                            }
                        }
                    }
                    TrendPoint {
                        label: day.to_string(),
                        count: amount.count,
                        weight: amount.weight,
                    }
                })
                .collect();
            Ok(points)
        }
        Granularity::Yearly => {
            let mut points = Vec::with_capacity(12);
            for month in Period::months_of(period.year) {
                let mut amount = Amount::default();
                for id in &section_ids {
                    let part = section_amount(registry, data, id, month, filter)?;
                    amount.count += part.count;
                    amount.weight += part.weight;
                }
                points.push(TrendPoint {
                    label: pad2(month.month),
                    count: amount.count,
                    weight: amount.weight,
                });
            }
            Ok(points)
        }
    }
}

/// Per-company totals for each month of `period.year`. The company set is
/// taken from `period` itself, unfiltered.
pub fn firm_monthly(
    registry: &mut Registry,
    data: &CellData,
    period: Period,
) -> Result<Vec<FirmMonth>> {
    let firms = company_set(registry, period)?;
    let section_ids: Vec<String> = registry.sections().iter().map(|s| s.id.clone()).collect();

    let mut months = Vec::with_capacity(12);
    for month in Period::months_of(period.year) {
        let mut amounts = Vec::with_capacity(firms.len());
        for firm in &firms {
            let filter = CompanyFilter::Company(firm.clone());
            let mut amount = Amount::default();
            for id in &section_ids {
                let part = section_amount(registry, data, id, month, &filter)?;
                amount.count += part.count;
                amount.weight += part.weight;
            }
            amounts.push(FirmAmount {
                firm: firm.clone(),
                total: amount.mixed(),
                count: amount.count,
                weight: amount.weight,
            });
        }
        months.push(FirmMonth {
            label: pad2(month.month),
            firms: amounts,
        });
    }

    Ok(months)
}

/// Per-column totals of one section and month over all resolved rows.
pub fn column_totals(
    registry: &mut Registry,
    data: &CellData,
    section: &str,
    period: Period,
) -> Result<Vec<ColumnTotal>> {
    let columns = registry.resolve_columns(section, period)?;
    let rows = registry.resolve_rows(section, period)?;

    Ok(columns
        .iter()
        .map(|column| ColumnTotal {
            column: column.id.clone(),
            total: rows
                .iter()
                .filter_map(|row| data.get(period, section, &row.key, &column.id))
                .map(coerce_number)
                .sum(),
        })
        .collect())
}
