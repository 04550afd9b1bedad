use serde::{Deserialize, Serialize};

use crate::period::{Granularity, Period};
use crate::section::DASHBOARD_ID;
use crate::storage::{self, KvStore};

/// Process-wide selection state, persisted on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub year: i32,
    pub month: u32,
    /// Selected section id, or [`DASHBOARD_ID`].
    pub active: String,
    #[serde(rename = "period")]
    pub granularity: Granularity,
}

impl Default for Metadata {
    fn default() -> Self {
        let today = Period::today();
        Metadata {
            year: today.year,
            month: today.month,
            active: DASHBOARD_ID.to_string(),
            granularity: Granularity::Monthly,
        }
    }
}

/// On-disk form: every field optional so a partial document still loads.
#[derive(Deserialize, Default)]
struct StoredMetadata {
    year: Option<i32>,
    month: Option<u32>,
    active: Option<String>,
    period: Option<Granularity>,
}

impl Metadata {
    pub fn load(store: &dyn KvStore) -> Self {
        let stored: StoredMetadata = storage::load_json(store, &storage::meta_key(), StoredMetadata::default());
        let fallback = Metadata::default();

        let mut meta = Metadata {
            year: stored.year.unwrap_or(fallback.year),
            month: stored.month.unwrap_or(fallback.month),
            active: stored.active.unwrap_or(fallback.active.clone()),
            granularity: stored.period.unwrap_or(fallback.granularity),
        };
        if Period::new(meta.year, meta.month).is_err() {
            meta.year = fallback.year;
            meta.month = fallback.month;
        }
        meta
    }

    pub fn save(&self, store: &mut dyn KvStore) {
        storage::save_json(store, &storage::meta_key(), self);
    }

    pub fn period(&self) -> Period {
        Period::new(self.year, self.month).unwrap_or_else(|_| Period::today())
    }
}
