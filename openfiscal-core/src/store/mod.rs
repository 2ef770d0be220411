//! Dataset store contract and its implementations.
//!
//! A [`DatasetStore`] owns two logical tables: per-jurisdiction rate records
//! and special-regime records. Each table is replaced wholesale; readers see
//! either the complete previous table or the complete new one, never a mix.
//! Query methods take raw caller strings and normalise them internally so
//! every implementation agrees on key shape.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::code::Jurisdiction;
use crate::record::{RateKey, RateRecord, RecordError, RegimeRecord};
use crate::search::SearchHit;

mod memory;
#[cfg(feature = "store-sqlite")]
mod schema;
#[cfg(feature = "store-sqlite")]
mod sqlite;

pub use memory::MemoryDatasetStore;
#[cfg(feature = "store-sqlite")]
pub use schema::{SCHEMA_VERSION, SchemaError};
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteDatasetStore;

/// Replacement content for the rate table.
///
/// `fresh` becomes the new content. Rows belonging to a jurisdiction listed in
/// `carried_over` are copied from the previous table instead, which keeps the
/// last good data for jurisdictions whose refresh failed. A fresh row sharing
/// an identity with a carried row replaces it. Every other prior row is
/// discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateReplacement {
    /// Newly ingested rows.
    pub fresh: Vec<RateRecord>,
    /// Jurisdictions whose previous rows survive the replacement.
    pub carried_over: BTreeSet<Jurisdiction>,
}

impl RateReplacement {
    /// Replace the whole table with `fresh`.
    #[must_use]
    pub const fn full(fresh: Vec<RateRecord>) -> Self {
        Self {
            fresh,
            carried_over: BTreeSet::new(),
        }
    }

    /// Keep the previous rows of `jurisdictions`.
    #[must_use]
    pub fn carrying_over<I>(mut self, jurisdictions: I) -> Self
    where
        I: IntoIterator<Item = Jurisdiction>,
    {
        self.carried_over.extend(jurisdictions);
        self
    }
}

/// Row counts observed after a committed replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Rows written from the new batch.
    pub inserted: usize,
    /// Rows copied from the previous table.
    pub carried_over: usize,
    /// Total rows now visible.
    pub total: usize,
}

/// Read and replace access to the fiscal datasets.
///
/// Implementations must be safe to query concurrently with each other and
/// with an in-flight replacement.
pub trait DatasetStore: Send + Sync {
    /// Return the base rate entry for `(product_code, jurisdiction)`.
    ///
    /// The entry without an exception code is preferred; otherwise the lowest
    /// exception code wins. `None` means no record exists.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn lookup_rate(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Option<RateRecord>, StoreError>;

    /// Return every exception variant for `(product_code, jurisdiction)`,
    /// ordered by exception code.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn rates_for(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Vec<RateRecord>, StoreError>;

    /// Resolve `product_code` to the regime records with the longest matching
    /// prefix.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn resolve_regimes(&self, product_code: &str) -> Result<Vec<RegimeRecord>, StoreError>;

    /// Return every record stored under `regime_code`, ordered by prefix.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn regimes_by_code(&self, regime_code: &str) -> Result<Vec<RegimeRecord>, StoreError>;

    /// Rank rate descriptions against `text`. All terms must match.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn search_by_description(&self, text: &str, limit: usize)
    -> Result<Vec<SearchHit>, StoreError>;

    /// Snapshot of every rate record, ordered by identity.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn all_rates(&self) -> Result<Vec<RateRecord>, StoreError>;

    /// Snapshot of every regime record, ordered by regime code then prefix.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn all_regimes(&self) -> Result<Vec<RegimeRecord>, StoreError>;

    /// Number of rate records currently visible.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn rate_count(&self) -> Result<usize, StoreError>;

    /// Number of regime records currently visible.
    ///
    /// # Errors
    /// Fails only on an internal store fault.
    fn regime_count(&self) -> Result<usize, StoreError>;

    /// Atomically replace the rate table.
    ///
    /// # Errors
    /// On error the previous table remains visible and unchanged.
    fn replace_rates(&self, replacement: RateReplacement) -> Result<TableStats, StoreError>;

    /// Atomically replace the regime table.
    ///
    /// # Errors
    /// On error the previous table remains visible and unchanged.
    fn replace_regimes(&self, records: Vec<RegimeRecord>) -> Result<TableStats, StoreError>;
}

/// Errors raised by dataset stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record failed validation and the replacement was abandoned.
    #[error("rejected record {identity}: {source}")]
    InvalidRecord {
        /// Human-readable identity of the record.
        identity: String,
        /// Validation failure.
        #[source]
        source: RecordError,
    },
    /// A lock guarding the snapshot was poisoned by a panicking writer.
    #[error("dataset snapshot lock was poisoned")]
    Poisoned,
    /// Opening the SQLite database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Location of the database on disk.
        path: camino::Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating or checking the schema failed.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A SQLite statement failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to {operation}")]
    Sqlite {
        /// What the store was doing.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A persisted value could not be decoded.
    #[error("stored {column} value {value:?} is corrupt")]
    Corrupt {
        /// Column holding the bad value.
        column: &'static str,
        /// The raw stored value.
        value: String,
    },
}

pub(crate) fn validate_rates(records: &[RateRecord]) -> Result<(), StoreError> {
    records.iter().try_for_each(|record| {
        record
            .validate()
            .map_err(|source| StoreError::InvalidRecord {
                identity: format!(
                    "{}/{}/{}",
                    record.product_code, record.jurisdiction, record.exception_code
                ),
                source,
            })
    })
}

pub(crate) fn validate_regimes(records: &[RegimeRecord]) -> Result<(), StoreError> {
    records.iter().try_for_each(|record| {
        record
            .validate()
            .map_err(|source| StoreError::InvalidRecord {
                identity: format!("{}/{}", record.regime_code, record.product_prefix),
                source,
            })
    })
}

/// Collapse duplicate identities; the last occurrence wins.
pub(crate) fn dedupe_rates(records: Vec<RateRecord>) -> BTreeMap<RateKey, RateRecord> {
    records
        .into_iter()
        .map(|record| (record.key(), record))
        .collect()
}

/// Collapse duplicate `(regime code, prefix)` pairs; the first occurrence wins.
pub(crate) fn dedupe_regimes(records: Vec<RegimeRecord>) -> Vec<RegimeRecord> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert((record.regime_code.clone(), record.product_prefix.clone())))
        .collect()
}

/// Pick the base entry among exception variants already sorted by code.
pub(crate) fn base_entry(variants: &[RateRecord]) -> Option<&RateRecord> {
    variants
        .iter()
        .find(|record| record.exception_code.is_empty())
        .or_else(|| variants.first())
}
