use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// One calendar month: the unit every schema overlay and cell frame is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(LedgerError::InvalidPeriod { year, month });
        }
        Ok(Period { year, month })
    }

    pub fn today() -> Self {
        let now = chrono::Local::now();
        Period {
            year: now.year(),
            month: now.month(),
        }
    }

    /// Storage key of this period's cell frame, e.g. `2025-1`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.year, self.month)
    }

    pub fn days(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    /// The twelve periods of `year`.
    pub fn months_of(year: i32) -> impl Iterator<Item = Period> {
        (1..=12).map(move |month| Period { year, month })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", pad2(self.month), self.year)
    }
}

/// Report granularity. Serialized with the labels the dashboard has always stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    #[serde(rename = "Aylık")]
    Monthly,
    #[serde(rename = "Yıllık")]
    Yearly,
}

/// Number of days in `month` of `year` (Gregorian). Returns 0 for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => date,
        None => return 0,
    };
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    match next {
        Some(next) => next.signed_duration_since(first).num_days() as u32,
        None => 31,
    }
}

pub fn pad2(n: u32) -> String {
    format!("{:02}", n)
}

/// `DD.MM.YYYY`
pub fn day_label(period: Period, day: u32) -> String {
    format!("{}.{}.{}", pad2(day), pad2(period.month), period.year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn february_follows_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
    }

    #[test]
    fn december_rolls_into_next_year() {
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
        assert_eq!(days_in_month(2025, 13), 0);
    }

    #[test]
    fn rejects_out_of_range_months() {
        assert!(Period::new(2025, 0).is_err());
        assert!(Period::new(2025, 13).is_err());
        assert_eq!(Period::new(2025, 1).unwrap().key(), "2025-1");
    }

    #[test]
    fn labels_are_zero_padded() {
        let p = Period::new(2025, 3).unwrap();
        assert_eq!(day_label(p, 7), "07.03.2025");
        assert_eq!(p.to_string(), "03.2025");
    }
}
