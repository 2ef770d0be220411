//! Facade crate for the OpenFiscal dataset service.
//!
//! This crate re-exports the core domain types and query surface, and exposes
//! the SQLite store and the ingestion pipeline behind feature flags.

#![forbid(unsafe_code)]

pub use openfiscal_core::{
    DatasetStore, Jurisdiction, MemoryDatasetStore, MergedRate, PrefixIndex, ProductCode,
    ProductPrefix, Provenance, RateComponents, RateKey, RateRecord, RateReplacement, RateTotals,
    RecordError, RegimeCode, RegimeRecord, SearchHit, SearchQuery, StoreError, TableStats,
    compute_totals, merged_rate, merged_rates,
};

#[cfg(feature = "store-sqlite")]
pub use openfiscal_core::SqliteDatasetStore;

#[cfg(feature = "ingest")]
pub use openfiscal_data::{
    HttpRateTableSource, HttpRegimeSource, HttpSourceConfig, IngestionCoordinator,
    JsonMetadataStore, MetadataStore, RateTableSource, RegimeSource, RemoteMeta, RetryPolicy,
    Schedule, Scheduler, SourceOutcome, SyncError, SyncMetadata, SyncReport, export_snapshots,
};
