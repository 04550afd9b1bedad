use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LedgerError, Result};

lazy_static! {
    static ref IGNORED_COMPANY_REGEX: Regex = Regex::new(r"(?i)^KYASS\s*[İIiı]?LAVE$").unwrap();
}

/// Pseudo-section id the dashboard is selected under.
pub const DASHBOARD_ID: &str = "_dashboard";

/// What a column measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitKind {
    #[default]
    #[serde(rename = "adet")]
    Count,
    #[serde(rename = "kg")]
    Weight,
}

/// Where a column comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Origin {
    /// Shipped with the section.
    Base,
    /// Added by a user for one section and period.
    #[default]
    Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "key")]
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub unit: UnitKind,
    #[serde(rename = "firma", default)]
    pub company: Option<String>,
    #[serde(skip)]
    pub origin: Origin,
}

impl Column {
    pub fn base(id: &str, label: &str, unit: UnitKind, company: &str) -> Self {
        Column {
            id: id.to_string(),
            label: label.to_string(),
            unit,
            company: Some(company.to_string()),
            origin: Origin::Base,
        }
    }

    /// The company this column's values are attributed to: the explicit
    /// company when set, otherwise the label.
    pub fn rollup_company(&self) -> Option<&str> {
        let company = self.company.as_deref().map(str::trim).unwrap_or("");
        if !company.is_empty() {
            return Some(company);
        }
        let label = self.label.trim();
        if label.is_empty() { None } else { Some(label) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(rename = "fields")]
    pub columns: Vec<Column>,
}

impl Section {
    fn new(id: &str, name: &str, color: &str, columns: Vec<Column>) -> Self {
        Section {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            columns,
        }
    }
}

/// Whether `name` is the synthetic top-up company that never becomes a filter bucket.
pub fn is_ignored_company(name: &str) -> bool {
    IGNORED_COMPANY_REGEX.is_match(name.trim())
}

/// Whether `name` may appear in company filters and per-company breakdowns.
pub fn is_filter_company(name: Option<&str>) -> bool {
    match name {
        Some(name) => !name.trim().is_empty() && !is_ignored_company(name),
        None => false,
    }
}

const PALETTE: [&str; 15] = [
    "#ef4444", "#3b82f6", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#14b8a6", "#22c55e",
    "#eab308", "#6366f1", "#06b6d4", "#84cc16", "#fb7185", "#a78bfa", "#f97316",
];

/// Stable chart colour for a company name.
pub fn color_for(name: &str) -> &'static str {
    let mut h: u32 = 0;
    for unit in name.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(unit as u32);
    }
    PALETTE[(h as usize) % PALETTE.len()]
}

/// The seven production stages the dashboard ships with.
pub fn reference_sections() -> Vec<Section> {
    use UnitKind::{Count, Weight};

    vec![
        Section::new(
            "orgu",
            "Örgü Adetleri",
            "bg-blue-600",
            vec![
                Column::base("kyass", "KYASS", Count, "KYASS"),
                Column::base("simliss", "SİMLISS", Count, "SİMLISS"),
                Column::base("liberty", "LİBERTY", Count, "LİBERTY"),
                Column::base("doca", "DOCA", Count, "DOCA"),
            ],
        ),
        Section::new(
            "boyaya_cikan",
            "Boyaya Çıkan Adetler",
            "bg-amber-600",
            vec![
                Column::base("best_adet", "BEST BOYA ADET", Count, "BEST"),
                Column::base("best_kg", "BEST BOYA KG", Weight, "BEST"),
                Column::base("kyass_adet", "KYASS BOYA ADET", Count, "KYASS"),
                Column::base("kyass_kg", "KYASS BOYA KG", Weight, "KYASS"),
            ],
        ),
        Section::new(
            "boyadan_gelen",
            "Boyadan Gelen Adetler",
            "bg-emerald-600",
            vec![
                Column::base("gelen_adet", "BOYADAN GELEN ADETLER", Count, "GENEL"),
                Column::base("kaliteks_kg", "KALİTEKS BOYA KG", Weight, "KALİTEKS"),
                Column::base("kyass_g_adet", "KYASS BOYA GELEN ADET", Count, "KYASS"),
                Column::base("kyass_g_kg", "KYASS BOYA GELEN KG", Weight, "KYASS"),
            ],
        ),
        Section::new(
            "tasnif",
            "Tasnif Adetleri",
            "bg-purple-600",
            vec![
                Column::base("tasnif", "TASNİF YAPILAN", Count, "KYASS"),
                Column::base("hatali", "HATALI ÜRÜN", Count, "KYASS"),
            ],
        ),
        Section::new(
            "dikim",
            "Dikim Adetleri",
            "bg-rose-600",
            vec![
                Column::base("kyass_dikim", "KYASS", Count, "KYASS"),
                Column::base("ayteks_dikim", "AYTEKS", Count, "AYTEKS"),
            ],
        ),
        Section::new(
            "paket",
            "Paket Adetleri",
            "bg-lime-600",
            vec![
                Column::base("kyass_paket", "KYASS", Count, "KYASS"),
                Column::base("enes_paket", "ENES", Count, "ENES"),
            ],
        ),
        Section::new(
            "sevkiyat",
            "Sevk Edilenler",
            "bg-slate-700",
            vec![
                Column::base("teveo", "TEVEO", Count, "TEVEO"),
                Column::base("youngla", "YOUNGLA", Count, "YOUNGLA"),
            ],
        ),
    ]
}

/// Load a section catalogue from a JSON file in the same shape as the
/// reference catalogue. Every listed column is a base column.
pub fn load_sections(path: impl AsRef<Path>) -> Result<Vec<Section>> {
    let text = std::fs::read_to_string(path)?;
    let mut sections: Vec<Section> = serde_json::from_str(&text)?;

    for section in sections.iter_mut() {
        if section.id == DASHBOARD_ID {
            return Err(LedgerError::InvalidInput(format!(
                "section id {} is reserved",
                DASHBOARD_ID
            )));
        }
        for column in section.columns.iter_mut() {
            column.origin = Origin::Base;
        }
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_company_matches_any_case_and_spacing() {
        assert!(is_ignored_company("KYASS İLAVE"));
        assert!(is_ignored_company("kyass  ilave"));
        assert!(is_ignored_company("  Kyass Ilave "));
        assert!(is_ignored_company("KYASSİLAVE"));
        assert!(!is_ignored_company("KYASS"));
        assert!(!is_ignored_company("KYASS İLAVE 2"));
    }

    #[test]
    fn rollup_prefers_company_then_label() {
        let mut column = Column::base("x", "LABEL", UnitKind::Count, "FIRM");
        assert_eq!(column.rollup_company(), Some("FIRM"));

        column.company = Some("   ".to_string());
        assert_eq!(column.rollup_company(), Some("LABEL"));

        column.company = None;
        column.label = " ".to_string();
        assert_eq!(column.rollup_company(), None);
    }

    #[test]
    fn colours_are_stable() {
        assert_eq!(color_for("KYASS"), color_for("KYASS"));
        assert!(PALETTE.contains(&color_for("TEVEO")));
    }

    #[test]
    fn reference_catalogue_has_seven_sections() {
        let sections = reference_sections();
        assert_eq!(sections.len(), 7);
        assert!(
            sections
                .iter()
                .flat_map(|s| s.columns.iter())
                .all(|c| c.origin == Origin::Base)
        );
    }
}
