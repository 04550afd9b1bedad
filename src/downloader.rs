use std::collections::BTreeMap;

use crate::aggregate::{self, CompanyFilter, SectionTotal};
use crate::cell::{CellData, coerce_number};
use crate::error::Result;
use crate::period::{Granularity, Period, pad2};
use crate::schema::Registry;
use crate::section::UnitKind;

/// Longest sheet name spreadsheet hosts accept.
pub const MAX_SHEET_NAME: usize = 31;

pub const DASHBOARD_SHEET: &str = "Dashboard";

#[derive(Debug, Clone, PartialEq)]
pub enum SheetValue {
    Text(String),
    Number(f64),
    Empty,
}

impl SheetValue {
    /// A stored cell value: numbers stay numbers, anything else is text.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            None => SheetValue::Empty,
            Some(text) if text.trim().is_empty() => SheetValue::Empty,
            Some(text) => match text.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => SheetValue::Number(v),
                _ => SheetValue::Text(text.to_string()),
            },
        }
    }

    fn text(s: impl Into<String>) -> Self {
        SheetValue::Text(s.into())
    }

    fn to_csv_field(&self) -> String {
        match self {
            SheetValue::Text(s) => s.clone(),
            SheetValue::Number(n) => n.to_string(),
            SheetValue::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<SheetValue>>,
}

/// A set of sheets plus the file name it downloads as.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub file_name: String,
    pub sheets: Vec<Sheet>,
}

/// Truncate to [`MAX_SHEET_NAME`] characters.
pub fn sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME).collect()
}

fn dashboard_sheet(totals: &[SectionTotal], heading: String) -> Sheet {
    let mut rows = vec![vec![
        SheetValue::text("Section"),
        SheetValue::Text(heading),
        SheetValue::text("Kg"),
    ]];
    for total in totals {
        rows.push(vec![
            SheetValue::text(total.name.clone()),
            SheetValue::Number(total.count),
            SheetValue::Number(total.weight),
        ]);
    }
    Sheet {
        name: DASHBOARD_SHEET.to_string(),
        rows,
    }
}

/// One sheet per section for `period` plus a dashboard sheet of the totals
/// at `granularity`.
pub fn export_monthly(
    registry: &mut Registry,
    data: &CellData,
    period: Period,
    granularity: Granularity,
    filter: &CompanyFilter,
) -> Result<Workbook> {
    let totals = aggregate::section_totals(registry, data, period, granularity, filter)?;
    let heading = match granularity {
        Granularity::Monthly => format!("Count total ({})", period),
        Granularity::Yearly => format!("Count total ({})", period.year),
    };
    let mut sheets = vec![dashboard_sheet(&totals, heading)];

    let sections = registry.sections().to_vec();
    for section in &sections {
        let columns = registry.resolve_columns(&section.id, period)?;
        let rows = registry.resolve_rows(&section.id, period)?;

        let mut header = vec![SheetValue::text("Row")];
        header.extend(columns.iter().map(|c| SheetValue::text(c.label.clone())));

        let mut table = vec![header];
        for row in &rows {
            let mut line = vec![SheetValue::text(row.label.clone())];
            line.extend(
                columns
                    .iter()
                    .map(|c| SheetValue::from_raw(data.get(period, &section.id, &row.key, &c.id))),
            );
            table.push(line);
        }

        sheets.push(Sheet {
            name: sheet_name(&section.name),
            rows: table,
        });
    }

    Ok(Workbook {
        file_name: format!("Report-{}-{}.xlsx", period.year, pad2(period.month)),
        sheets,
    })
}

/// A dashboard sheet of yearly totals, then per section one row per month
/// with per-column monthly sums over the union of that year's columns.
pub fn export_yearly(
    registry: &mut Registry,
    data: &CellData,
    year: i32,
    filter: &CompanyFilter,
) -> Result<Workbook> {
    let january = Period { year, month: 1 };
    let totals = aggregate::section_totals(registry, data, january, Granularity::Yearly, filter)?;
    let mut sheets = vec![dashboard_sheet(&totals, format!("Count total ({})", year))];

    const SUFFIX: &str = "-Year";
    let sections = registry.sections().to_vec();
    for section in &sections {
        // first-seen label and unit win
        let mut union: Vec<(String, String, UnitKind)> = Vec::new();
        for month in Period::months_of(year) {
            for column in registry.resolve_columns(&section.id, month)? {
                if !union.iter().any(|(id, _, _)| *id == column.id) {
                    union.push((column.id, column.label, column.unit));
                }
            }
        }

        let mut header = vec![SheetValue::text("Month")];
        header.extend(union.iter().map(|(_, label, _)| SheetValue::text(label.clone())));
        let mut table = vec![header];

        for month in Period::months_of(year) {
            let rows = registry.resolve_rows(&section.id, month)?;
            let mut sums: BTreeMap<&str, f64> = BTreeMap::new();
            for row in &rows {
                for (id, _, _) in &union {
                    if let Some(raw) = data.get(month, &section.id, &row.key, id) {
                        *sums.entry(id.as_str()).or_default() += coerce_number(raw);
                    }
                }
            }

            let mut line = vec![SheetValue::Text(pad2(month.month))];
            line.extend(
                union
                    .iter()
                    .map(|(id, _, _)| SheetValue::Number(sums.get(id.as_str()).copied().unwrap_or(0.0))),
            );
            table.push(line);
        }

        let prefix: String = section
            .name
            .chars()
            .take(MAX_SHEET_NAME - SUFFIX.chars().count())
            .collect();
        sheets.push(Sheet {
            name: format!("{}{}", prefix, SUFFIX),
            rows: table,
        });
    }

    Ok(Workbook {
        file_name: format!("Report-Yearly-{}.xlsx", year),
        sheets,
    })
}

/// Convert a sheet to CSV format
///
/// Values are comma-separated; fields containing commas, quotes or newlines
/// are quoted with embedded quotes doubled.
pub fn to_csv(sheet: &Sheet) -> String {
    let mut csv_content = String::new();

    for row in &sheet.rows {
        for (c, value) in row.iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }

            let value = value.to_csv_field();
            if value.contains(',') || value.contains('"') || value.contains('\n') {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(&value);
            }
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert a workbook to XLSX format
///
/// Uses the rust_xlsxwriter library; the first row of every sheet is written bold.
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
pub fn to_xlsx(book: &Workbook) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

    let mut workbook = XlsxWorkbook::new();
    let header = Format::new().set_bold();

    for sheet in &book.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.name.as_str())?;

        for (r, row) in sheet.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match (value, r == 0) {
                    (SheetValue::Text(s), true) => {
                        worksheet.write_string_with_format(r, c, s.as_str(), &header)?;
                    }
                    (SheetValue::Text(s), false) => {
                        worksheet.write_string(r, c, s.as_str())?;
                    }
                    (SheetValue::Number(n), _) => {
                        worksheet.write_number(r, c, *n)?;
                    }
                    (SheetValue::Empty, _) => {}
                }
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
