//! Core domain model for the OpenFiscal dataset service.
//!
//! The crate owns the record types for per-jurisdiction tax rates and
//! special-regime mappings, the normalisation rules applied to every key,
//! longest-prefix regime resolution, derived rate totals and the
//! [`DatasetStore`] contract with in-memory and SQLite implementations.
//! Nothing here performs network I/O or reads the clock.

#![forbid(unsafe_code)]

mod aggregate;
mod code;
mod record;
mod resolver;
mod search;
pub mod store;
mod view;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use aggregate::{RateTotals, TOTAL_SCALE, compute_totals, compute_totals_for};
pub use code::{Jurisdiction, ProductCode, ProductPrefix, RegimeCode};
pub use record::{
    MAX_RATE_PERCENT, Provenance, RateComponents, RateKey, RateRecord, RecordError, RegimeRecord,
};
pub use resolver::{PrefixIndex, resolve_by_scan};
pub use search::{SearchHit, SearchQuery, rank};
#[cfg(feature = "store-sqlite")]
pub use store::SqliteDatasetStore;
pub use store::{DatasetStore, MemoryDatasetStore, RateReplacement, StoreError, TableStats};
pub use view::{MergedRate, merged_rate, merged_rates};
