//! Ingestion side of the OpenFiscal dataset service.
//!
//! Two upstream sources feed the [`openfiscal_core::DatasetStore`]: a
//! directory of per-jurisdiction rate CSV files and a convention document
//! whose annex tables map regime codes to product prefixes. Each source has
//! an async retrieval trait with an HTTP implementation and a pure parser.
//! [`IngestionCoordinator`] runs fetch, parse, validate and commit for both,
//! [`Scheduler`] repeats that on timers, and [`export_snapshots`] writes
//! flattened copies of the merged view.
#![forbid(unsafe_code)]

mod coordinator;
mod detector;
mod error;
mod export;
mod http;
mod metadata;
mod rates;
mod regimes;
mod retry;
mod scheduler;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use coordinator::{IngestionCoordinator, SourceOutcome, SyncReport, SyncStage};
pub use detector::{RemoteMeta, SyncMetadata, should_sync};
pub use error::{
    ExportError, MetadataError, ParseError, SourceSetupError, SyncError, TransportError,
};
pub use export::{
    COMPACT_EXPORT_FILE, CSV_EXPORT_FILE, ExportReport, JSON_EXPORT_FILE, export_snapshots,
    render_compact_json, render_csv, render_json,
};
pub use http::{DEFAULT_USER_AGENT, HttpSourceConfig};
pub use metadata::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
pub use rates::{
    DEFAULT_RATE_DIRECTORY_URL, HttpRateTableSource, ListedFile, ParsedRateFile,
    RateTableSource, jurisdiction_from_file_name, parse_listing, parse_rate_file,
};
pub use regimes::{
    DEFAULT_REGIME_DOCUMENT_URL, HttpRegimeSource, ParsedRegimes, RegimeSource,
    parse_regime_document,
};
pub use retry::RetryPolicy;
pub use scheduler::{Schedule, Scheduler, SchedulerStats};
