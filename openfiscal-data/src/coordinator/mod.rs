//! Fetch, parse, validate and commit pipelines for both upstream sources.
//!
//! Each source runs its own state machine:
//! `Idle → Probing → Fetching → Parsing → Validating → Committing → Idle`.
//! Nothing reaches the [`DatasetStore`] before `Committing`, so a failed or
//! cancelled pipeline leaves the previously committed table authoritative.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Utc;
use log::{debug, error, info, warn};
use openfiscal_core::{DatasetStore, Jurisdiction, RateReplacement, RateRecord};
use tokio_util::sync::CancellationToken;

use crate::detector::{RemoteMeta, SyncMetadata, should_sync};
use crate::error::{ParseError, SyncError, TransportError};
use crate::metadata::MetadataStore;
use crate::rates::{RateTableSource, jurisdiction_from_file_name, parse_rate_file};
use crate::regimes::{RegimeSource, parse_regime_document};
use crate::retry::{Attempted, RetryPolicy, with_retry};

/// Position of a source pipeline in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Not running.
    Idle,
    /// Checking whether the upstream changed.
    Probing,
    /// Downloading source bodies.
    Fetching,
    /// Turning bodies into records.
    Parsing,
    /// Checking the parsed batch before commit.
    Validating,
    /// Atomically replacing the stored table.
    Committing,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// How one source pipeline ended.
#[derive(Debug)]
pub enum SourceOutcome {
    /// A new table was committed.
    Committed {
        /// Rows in the committed table.
        records: usize,
        /// Files, sections or rows skipped along the way.
        skipped_units: usize,
    },
    /// Change detection found nothing new; no fetch was made.
    Unchanged,
    /// The pipeline stopped; the previous table remains.
    Failed {
        /// Stage in which the failure happened.
        stage: SyncStage,
        /// Cause of the failure.
        error: SyncError,
    },
    /// Cancellation was requested before commit.
    Cancelled,
}

impl SourceOutcome {
    /// Report whether the pipeline failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed {
                records,
                skipped_units,
            } => write!(f, "committed {records} records ({skipped_units} skipped units)"),
            Self::Unchanged => f.write_str("unchanged"),
            Self::Failed { stage, error } => write!(f, "failed while {stage}: {error}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one full ingestion run.
#[derive(Debug)]
pub struct SyncReport {
    /// Rate-table pipeline outcome.
    pub rates: SourceOutcome,
    /// Regime-table pipeline outcome.
    pub regimes: SourceOutcome,
}

impl SyncReport {
    /// Report whether both pipelines failed.
    #[must_use]
    pub const fn all_failed(&self) -> bool {
        self.rates.is_failure() && self.regimes.is_failure()
    }
}

/// Logs transitions for one named pipeline.
#[derive(Clone, Copy)]
struct Pipeline(&'static str);

impl Pipeline {
    fn enter(self, stage: SyncStage) {
        debug!("{} pipeline: {stage}", self.0);
    }

    fn finish(self, outcome: SourceOutcome) -> SourceOutcome {
        match &outcome {
            SourceOutcome::Failed { stage, error } => {
                error!("{} pipeline failed while {stage}: {error}", self.0);
            }
            SourceOutcome::Cancelled => info!("{} pipeline cancelled", self.0),
            SourceOutcome::Committed { .. } | SourceOutcome::Unchanged => {}
        }
        self.enter(SyncStage::Idle);
        outcome
    }

    fn fail(self, stage: SyncStage, error: SyncError) -> SourceOutcome {
        self.finish(SourceOutcome::Failed { stage, error })
    }
}

const RATES: Pipeline = Pipeline("rates");
const REGIMES: Pipeline = Pipeline("regimes");

/// Progress accumulated while walking the rate files.
#[derive(Default)]
struct RateProgress {
    fresh: Vec<RateRecord>,
    refreshed: BTreeSet<Jurisdiction>,
    failed: BTreeSet<Jurisdiction>,
    skipped_units: usize,
    last_transport_error: Option<TransportError>,
}

impl RateProgress {
    fn skip(&mut self) {
        self.skipped_units = self.skipped_units.saturating_add(1);
    }

    fn into_replacement(self) -> (RateReplacement, usize) {
        let carried: Vec<Jurisdiction> = self
            .failed
            .difference(&self.refreshed)
            .cloned()
            .collect();
        if !carried.is_empty() {
            warn!(
                "Carrying over previous rates for {} jurisdictions: {}",
                carried.len(),
                carried
                    .iter()
                    .map(Jurisdiction::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        (
            RateReplacement::full(self.fresh).carrying_over(carried),
            self.skipped_units,
        )
    }
}

/// Orchestrates both source pipelines against one store.
///
/// # Examples
/// ```no_run
/// use openfiscal_core::MemoryDatasetStore;
/// use openfiscal_data::{
///     DEFAULT_RATE_DIRECTORY_URL, DEFAULT_REGIME_DOCUMENT_URL, HttpRateTableSource,
///     HttpRegimeSource, HttpSourceConfig, IngestionCoordinator, MemoryMetadataStore,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let rates = HttpRateTableSource::new(DEFAULT_RATE_DIRECTORY_URL, HttpSourceConfig::default())?;
/// let regimes = HttpRegimeSource::new(
///     DEFAULT_REGIME_DOCUMENT_URL,
///     HttpSourceConfig::default().with_accept_invalid_certs(true),
/// )?;
/// let metadata = MemoryMetadataStore::new();
/// let store = MemoryDatasetStore::new();
/// let coordinator = IngestionCoordinator::new(&rates, &regimes, &metadata, &store);
/// let report = coordinator.run(&CancellationToken::new()).await;
/// println!("rates: {}, regimes: {}", report.rates, report.regimes);
/// # Ok(())
/// # }
/// ```
pub struct IngestionCoordinator<'a> {
    rates: &'a dyn RateTableSource,
    regimes: &'a dyn RegimeSource,
    metadata: &'a dyn MetadataStore,
    store: &'a dyn DatasetStore,
    retry: RetryPolicy,
}

impl<'a> IngestionCoordinator<'a> {
    /// Wire the sources, metadata and store together with the default
    /// [`RetryPolicy`].
    #[must_use]
    pub fn new(
        rates: &'a dyn RateTableSource,
        regimes: &'a dyn RegimeSource,
        metadata: &'a dyn MetadataStore,
        store: &'a dyn DatasetStore,
    ) -> Self {
        Self {
            rates,
            regimes,
            metadata,
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run both pipelines concurrently and report each outcome.
    pub async fn run(&self, cancel: &CancellationToken) -> SyncReport {
        let (rates, regimes) = tokio::join!(self.run_rates(cancel), self.run_regimes(cancel));
        SyncReport { rates, regimes }
    }

    /// Refresh the rate table from every listed file.
    ///
    /// Files are processed one at a time. A file whose name carries no
    /// jurisdiction is skipped; a file that cannot be downloaded keeps its
    /// jurisdiction's previous rows. The table is replaced only when at least
    /// one file produced records.
    pub async fn run_rates(&self, cancel: &CancellationToken) -> SourceOutcome {
        RATES.enter(SyncStage::Fetching);
        let listing = match with_retry(self.retry, cancel, "rate directory listing", || {
            self.rates.list_files()
        })
        .await
        {
            Attempted::Done(listing) => listing,
            Attempted::Failed(source) => {
                return RATES.fail(
                    SyncStage::Fetching,
                    SyncError::UpstreamUnavailable { source },
                );
            }
            Attempted::Cancelled => return RATES.finish(SourceOutcome::Cancelled),
        };
        info!(
            "Listed {} rate files at {}",
            listing.len(),
            self.rates.directory_url()
        );

        let mut progress = RateProgress::default();
        for file in &listing {
            if cancel.is_cancelled() {
                return RATES.finish(SourceOutcome::Cancelled);
            }
            let Some(jurisdiction) = jurisdiction_from_file_name(&file.file_name) else {
                warn!("Skipping {}: no jurisdiction in file name", file.file_name);
                progress.skip();
                continue;
            };

            RATES.enter(SyncStage::Fetching);
            let body = match with_retry(self.retry, cancel, &file.file_name, || {
                self.rates.fetch_file(file)
            })
            .await
            {
                Attempted::Done(body) => body,
                Attempted::Failed(err) => {
                    warn!("Skipping {}: {err}", file.file_name);
                    progress.failed.insert(jurisdiction);
                    progress.last_transport_error = Some(err);
                    progress.skip();
                    continue;
                }
                Attempted::Cancelled => return RATES.finish(SourceOutcome::Cancelled),
            };

            RATES.enter(SyncStage::Parsing);
            let parsed = parse_rate_file(&body, &jurisdiction);
            progress.skipped_units = progress
                .skipped_units
                .saturating_add(parsed.malformed_rows);
            if parsed.records.is_empty() {
                warn!("Skipping {}: no usable rows", file.file_name);
                progress.failed.insert(jurisdiction);
                progress.skip();
                continue;
            }
            debug!(
                "Parsed {} rows for {jurisdiction} from {} ({} malformed)",
                parsed.records.len(),
                file.file_name,
                parsed.malformed_rows
            );
            progress.refreshed.insert(jurisdiction);
            progress.fresh.extend(parsed.records);
        }

        RATES.enter(SyncStage::Validating);
        if progress.refreshed.is_empty() {
            let error = match progress.last_transport_error.take() {
                Some(source) => SyncError::UpstreamUnavailable { source },
                None => SyncError::NothingParsed {
                    reason: "no listed rate file produced records",
                },
            };
            return RATES.fail(SyncStage::Validating, error);
        }
        if cancel.is_cancelled() {
            return RATES.finish(SourceOutcome::Cancelled);
        }

        RATES.enter(SyncStage::Committing);
        let (replacement, skipped_units) = progress.into_replacement();
        match self.store.replace_rates(replacement) {
            Ok(stats) => {
                info!(
                    "Committed {} rate records ({} fresh, {} carried over, {skipped_units} skipped units)",
                    stats.total, stats.inserted, stats.carried_over
                );
                RATES.finish(SourceOutcome::Committed {
                    records: stats.total,
                    skipped_units,
                })
            }
            Err(source) => RATES.fail(SyncStage::Committing, SyncError::StoreCommit { source }),
        }
    }

    /// Refresh the regime table when the document changed.
    ///
    /// A failed probe or unreadable metadata forces a full fetch, as does an
    /// empty regime table. Metadata is persisted only after a commit.
    pub async fn run_regimes(&self, cancel: &CancellationToken) -> SourceOutcome {
        if cancel.is_cancelled() {
            return REGIMES.finish(SourceOutcome::Cancelled);
        }
        REGIMES.enter(SyncStage::Probing);
        let remote = self.probe().await;
        if !self.regimes_need_sync(&remote) {
            info!(
                "Regime document at {} is unchanged; skipping download",
                self.regimes.document_url()
            );
            return REGIMES.finish(SourceOutcome::Unchanged);
        }

        REGIMES.enter(SyncStage::Fetching);
        let body = match with_retry(self.retry, cancel, "regime document", || {
            self.regimes.fetch_document()
        })
        .await
        {
            Attempted::Done(body) => body,
            Attempted::Failed(source) => {
                return REGIMES.fail(
                    SyncStage::Fetching,
                    SyncError::UpstreamUnavailable { source },
                );
            }
            Attempted::Cancelled => return REGIMES.finish(SourceOutcome::Cancelled),
        };

        REGIMES.enter(SyncStage::Parsing);
        let parsed = parse_regime_document(&String::from_utf8_lossy(&body));
        if parsed.sections == 0 {
            return REGIMES.fail(
                SyncStage::Parsing,
                SyncError::MalformedSource {
                    source: ParseError::NoAnnexSections {
                        url: self.regimes.document_url().to_string(),
                    },
                },
            );
        }

        REGIMES.enter(SyncStage::Validating);
        if parsed.records.is_empty() {
            return REGIMES.fail(
                SyncStage::Validating,
                SyncError::NothingParsed {
                    reason: "annex tables contained no regime rows",
                },
            );
        }
        if cancel.is_cancelled() {
            return REGIMES.finish(SourceOutcome::Cancelled);
        }

        REGIMES.enter(SyncStage::Committing);
        let stats = match self.store.replace_regimes(parsed.records) {
            Ok(stats) => stats,
            Err(source) => {
                return REGIMES.fail(SyncStage::Committing, SyncError::StoreCommit { source });
            }
        };
        info!(
            "Committed {} regime records from {} annex sections ({} skipped units)",
            stats.total, parsed.sections, parsed.skipped_units
        );
        if let Err(err) = self
            .metadata
            .save(&SyncMetadata::committed(remote, Utc::now()))
        {
            error!("Regime table committed but sync metadata was not saved: {err}");
        }
        REGIMES.finish(SourceOutcome::Committed {
            records: stats.total,
            skipped_units: parsed.skipped_units,
        })
    }

    async fn probe(&self) -> RemoteMeta {
        match self.regimes.probe().await {
            Ok(remote) => remote,
            Err(err) => {
                warn!("Regime probe failed, forcing a full fetch: {err}");
                RemoteMeta::default()
            }
        }
    }

    fn regimes_need_sync(&self, remote: &RemoteMeta) -> bool {
        match self.store.regime_count() {
            Ok(0) => {
                debug!("Regime table is empty; forcing a full fetch");
                return true;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Could not count stored regimes, forcing a full fetch: {err}");
                return true;
            }
        }
        let stored = self.metadata.load().unwrap_or_else(|err| {
            warn!("Ignoring unreadable sync metadata: {err}");
            None
        });
        should_sync(stored.as_ref(), remote)
    }
}
