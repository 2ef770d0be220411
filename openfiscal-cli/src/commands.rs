//! Sub-command implementations writing to caller-supplied streams.

use std::future::Future;
use std::io::Write;

use camino::Utf8Path;
use log::{info, warn};
use openfiscal_core::{DatasetStore, merged_rate};
use openfiscal_data::{
    COMPACT_EXPORT_FILE, CSV_EXPORT_FILE, HttpRateTableSource, HttpRegimeSource, IngestionCoordinator,
    JSON_EXPORT_FILE, JsonMetadataStore, RateTableSource, RegimeSource, Scheduler, SourceOutcome,
    export_snapshots,
};
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::config::{IngestConfig, open_store};
use crate::error::CliError;

/// Run both pipelines once against the configured HTTP sources.
pub(crate) fn sync(config: &IngestConfig, out: &mut impl Write) -> Result<(), CliError> {
    let rates = HttpRateTableSource::new(config.rates_url.as_str(), config.rate_http())?;
    let regimes = HttpRegimeSource::new(config.regimes_url.as_str(), config.regime_http())?;
    sync_with(config, &rates, &regimes, out)
}

/// Run both pipelines once, print one summary line per source and export
/// snapshots when something was committed.
///
/// Fails only when both sources failed.
pub(crate) fn sync_with(
    config: &IngestConfig,
    rates: &dyn RateTableSource,
    regimes: &dyn RegimeSource,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let store = open_store(&config.database)?;
    let metadata = JsonMetadataStore::new(config.metadata.clone());
    let coordinator = IngestionCoordinator::new(rates, regimes, &metadata, &store)
        .with_retry_policy(config.retry);
    let cancel = CancellationToken::new();
    let report = runtime()?.block_on(until_interrupted(&cancel, coordinator.run(&cancel)));

    writeln!(out, "rates: {}", report.rates).map_err(CliError::Output)?;
    writeln!(out, "regimes: {}", report.regimes).map_err(CliError::Output)?;
    if report.all_failed() {
        return Err(CliError::SyncFailed {
            rates: report.rates.to_string(),
            regimes: report.regimes.to_string(),
        });
    }
    let committed = [&report.rates, &report.regimes]
        .into_iter()
        .any(|outcome| matches!(outcome, SourceOutcome::Committed { .. }));
    if let Some(dir) = config.export_dir.as_deref()
        && committed
    {
        export_into(&store, dir, out)?;
    }
    Ok(())
}

/// Keep both pipelines running on their cadence until interrupted.
pub(crate) fn schedule(config: &IngestConfig, out: &mut impl Write) -> Result<(), CliError> {
    let rates = HttpRateTableSource::new(config.rates_url.as_str(), config.rate_http())?;
    let regimes = HttpRegimeSource::new(config.regimes_url.as_str(), config.regime_http())?;
    let store = open_store(&config.database)?;
    let metadata = JsonMetadataStore::new(config.metadata.clone());
    let coordinator = IngestionCoordinator::new(&rates, &regimes, &metadata, &store)
        .with_retry_policy(config.retry);
    let scheduler = Scheduler::new(coordinator, config.schedule);
    let cancel = CancellationToken::new();
    let stats = runtime()?.block_on(until_interrupted(&cancel, scheduler.run(&cancel)));
    writeln!(
        out,
        "scheduler stopped after {} rate and {} regime runs",
        stats.rate_runs, stats.regime_runs
    )
    .map_err(CliError::Output)
}

/// Print the merged view of one product in one jurisdiction, or `null`.
pub(crate) fn lookup<S>(
    store: &S,
    jurisdiction: &str,
    product: &str,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let merged = merged_rate(store, product, jurisdiction).map_err(CliError::Query)?;
    if merged.is_none() {
        not_found(diag, &format!("no rate for {product} in {jurisdiction}"))?;
    }
    write_json(out, &merged)
}

/// Print the regimes resolved for `product`.
pub(crate) fn regimes<S>(
    store: &S,
    product: &str,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let found = store.resolve_regimes(product).map_err(CliError::Query)?;
    if found.is_empty() {
        not_found(diag, &format!("no regime matches {product}"))?;
    }
    write_json(out, &found)
}

/// Print every record stored under `code`.
pub(crate) fn regime<S>(
    store: &S,
    code: &str,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let found = store.regimes_by_code(code).map_err(CliError::Query)?;
    if found.is_empty() {
        not_found(diag, &format!("no regime {code}"))?;
    }
    write_json(out, &found)
}

/// Print ranked description matches.
pub(crate) fn search<S>(
    store: &S,
    text: &str,
    limit: usize,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let hits = store
        .search_by_description(text, limit)
        .map_err(CliError::Query)?;
    if hits.is_empty() {
        not_found(diag, &format!("no description matches {text:?}"))?;
    }
    write_json(out, &hits)
}

/// Write the requested snapshots, defaulting to every standard file name in
/// the working directory when none is requested.
pub(crate) fn export<S>(
    store: &S,
    json: Option<&Utf8Path>,
    csv: Option<&Utf8Path>,
    compact: Option<&Utf8Path>,
    out: &mut impl Write,
) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let report = if json.is_none() && csv.is_none() && compact.is_none() {
        export_snapshots(
            store,
            Some(Utf8Path::new(JSON_EXPORT_FILE)),
            Some(Utf8Path::new(CSV_EXPORT_FILE)),
            Some(Utf8Path::new(COMPACT_EXPORT_FILE)),
        )?
    } else {
        export_snapshots(store, json, csv, compact)?
    };
    for path in [report.json, report.csv, report.compact]
        .into_iter()
        .flatten()
    {
        writeln!(out, "exported {} rows to {path}", report.rows).map_err(CliError::Output)?;
    }
    Ok(())
}

fn export_into<S>(store: &S, dir: &Utf8Path, out: &mut impl Write) -> Result<(), CliError>
where
    S: DatasetStore + ?Sized,
{
    let json = dir.join(JSON_EXPORT_FILE);
    let csv = dir.join(CSV_EXPORT_FILE);
    let compact = dir.join(COMPACT_EXPORT_FILE);
    export(store, Some(&json), Some(&csv), Some(&compact), out)
}

fn write_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(CliError::Serialize)?;
    writeln!(out).map_err(CliError::Output)
}

fn not_found(diag: &mut impl Write, message: &str) -> Result<(), CliError> {
    writeln!(diag, "not found: {message}").map_err(CliError::Output)
}

fn runtime() -> Result<Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Drive `work` to completion, cancelling `cancel` on Ctrl-C and then
/// letting `work` wind down.
async fn until_interrupted<F: Future>(cancel: &CancellationToken, work: F) -> F::Output {
    tokio::pin!(work);
    tokio::select! {
        output = &mut work => output,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Interrupt received; stopping after the current unit");
                    cancel.cancel();
                }
                Err(err) => warn!("Cannot listen for interrupts: {err}"),
            }
            work.await
        }
    }
}
