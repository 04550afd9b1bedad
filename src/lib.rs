/*!
# Production Ledger

A monthly production-tracking ledger for a textile workflow, with a small web
dashboard in front of it.

## Overview

Operators record daily quantities per production stage (knitting, dyeing,
sorting, sewing, packing, shipping). Each stage is a section whose columns
track a firm and a unit (pieces or kilograms). Every month carries its own
schema overlay, so columns and extra rows added in one month never leak into
another.

## Architecture

### Domain Layer
- **section**: section catalogue, column definitions, firm palette
- **schema**: per-month column overlays (add, delete, reorder)
- **rows**: day rows plus user-added rows per month
- **cell**: the copy-on-write cell store and numeric coercion
- **aggregate**: section totals, trends and per-firm rollups
- **ledger**: the facade every view goes through; revisions, change
  notifications and the memoised dashboard

### Data Persistence Layer
- **storage**: key-value store trait, in-memory and file-backed stores
- **saving**: gzip-compressed bincode snapshots
- **meta**: selected period, active section and granularity
- **remote**: best-effort mirror of the cell store with bounded retry

### Output
- **downloader**: monthly and yearly workbook exports (XLSX, CSV)

### Access
- **login**: shared-secret privileged mode and cookie sessions
- **app**: axum routes (feature `web`)

## REST API Endpoints

- `GET /api/dashboard?company=` - Totals, trend and firm rollups
- `GET /api/sections/:id?year&month` - One section's resolved form
- `POST /api/cell` - Write a cell (privileged)
- `POST|DELETE /api/sections/:id/columns` - Schema edits (privileged)
- `POST|DELETE /api/sections/:id/rows` - Extra rows (privileged)
- `GET /api/export/monthly`, `GET /api/export/yearly` - Workbook downloads
- `POST /api/saveData` - Versioned overwrite of the remote blob
*/

pub mod aggregate;
pub mod cell;
pub mod config;
pub mod downloader;
pub mod error;
pub mod ledger;
pub mod login;
pub mod meta;
pub mod period;
pub mod remote;
pub mod rows;
pub mod saving;
pub mod schema;
pub mod section;
pub mod storage;

#[cfg(feature = "web")]
pub mod app;

/// Re-export the types most callers need
pub use aggregate::CompanyFilter;
pub use cell::{CellData, coerce_number, sanitize_input};
pub use config::Config;
pub use downloader::{Sheet, SheetValue, Workbook};
pub use error::{LedgerError, Result};
pub use ledger::{ChangeEvent, Dashboard, Ledger, SectionView};
pub use login::{AdminGate, Privilege};
pub use meta::Metadata;
pub use period::{Granularity, Period};
pub use rows::{DropSide, RowKey};
pub use schema::{NewColumn, Registry};
pub use section::{Column, Section, UnitKind};
pub use storage::{FileStore, KvStore, MemoryStore};
