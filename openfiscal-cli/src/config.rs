//! Layered settings for the ingestion and query sub-commands.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use openfiscal_core::SqliteDatasetStore;
use openfiscal_data::{
    DEFAULT_RATE_DIRECTORY_URL, DEFAULT_REGIME_DOCUMENT_URL, DEFAULT_USER_AGENT, HttpSourceConfig,
    RetryPolicy, Schedule,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CliError;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_METADATA: &str = "metadata";
pub(crate) const ARG_RATES_URL: &str = "rates-url";
pub(crate) const ARG_REGIMES_URL: &str = "regimes-url";
pub(crate) const ARG_TIMEOUT_SECS: &str = "timeout-secs";
pub(crate) const ARG_RETRY_ATTEMPTS: &str = "retry-attempts";
pub(crate) const ARG_RATES_EVERY_HOURS: &str = "rates-every-hours";
pub(crate) const ARG_REGIMES_EVERY_HOURS: &str = "regimes-every-hours";

pub(crate) const DEFAULT_DATABASE: &str = "openfiscal.db";
pub(crate) const DEFAULT_METADATA: &str = "cest_metadata.json";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_RATES_EVERY_HOURS: u64 = 24 * 7;
const DEFAULT_REGIMES_EVERY_HOURS: u64 = 24;
const SECS_PER_HOUR: u64 = 60 * 60;

/// Location of the dataset store, shared by the query sub-commands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[ortho_config(prefix = "OPENFISCAL")]
pub(crate) struct StoreArgs {
    /// Path to the SQLite dataset store.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl StoreArgs {
    /// Merge configuration layers and open the store they point at.
    pub(crate) fn open(&self) -> Result<SqliteDatasetStore, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let path = merged
            .database
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE));
        open_store(&path)
    }
}

pub(crate) fn open_store(path: &Utf8Path) -> Result<SqliteDatasetStore, CliError> {
    SqliteDatasetStore::open(path).map_err(|source| CliError::OpenStore {
        path: path.to_path_buf(),
        source,
    })
}

/// CLI arguments for the `sync` and `schedule` sub-commands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Configure where datasets are fetched from and stored. Every \
                 setting can come from CLI flags, configuration files, or \
                 OPENFISCAL_* environment variables.",
    about = "Configure upstream sources and the dataset store"
)]
#[ortho_config(prefix = "OPENFISCAL")]
pub(crate) struct IngestArgs {
    /// Path to the SQLite dataset store.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Path of the JSON file holding regime change-detection metadata.
    #[arg(long = ARG_METADATA, value_name = "path")]
    #[serde(default)]
    pub(crate) metadata: Option<Utf8PathBuf>,
    /// Directory listing the per-jurisdiction rate files.
    #[arg(long = ARG_RATES_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) rates_url: Option<String>,
    /// Document holding the regime annex tables.
    #[arg(long = ARG_REGIMES_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) regimes_url: Option<String>,
    /// `User-Agent` sent with every request.
    #[arg(long, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long = ARG_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// Attempts per download before giving up.
    #[arg(long = ARG_RETRY_ATTEMPTS, value_name = "count")]
    #[serde(default)]
    pub(crate) retry_attempts: Option<u32>,
    /// Pause between attempts in milliseconds.
    #[arg(long, value_name = "ms")]
    #[serde(default)]
    pub(crate) retry_delay_ms: Option<u64>,
    /// Accept invalid TLS certificates from the regime document host.
    #[arg(long, value_name = "bool")]
    #[serde(default)]
    pub(crate) accept_invalid_certs: Option<bool>,
    /// Hours between scheduled rate-table synchronisations.
    #[arg(long = ARG_RATES_EVERY_HOURS, value_name = "hours")]
    #[serde(default)]
    pub(crate) rates_every_hours: Option<u64>,
    /// Hours between scheduled regime-table checks.
    #[arg(long = ARG_REGIMES_EVERY_HOURS, value_name = "hours")]
    #[serde(default)]
    pub(crate) regimes_every_hours: Option<u64>,
    /// Directory receiving export snapshots after a committing `sync`.
    #[arg(long, value_name = "dir")]
    #[serde(default)]
    pub(crate) export_dir: Option<Utf8PathBuf>,
}

impl IngestArgs {
    pub(crate) fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Validated ingestion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IngestConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) metadata: Utf8PathBuf,
    pub(crate) rates_url: Url,
    pub(crate) regimes_url: Url,
    pub(crate) user_agent: String,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) accept_invalid_certs: bool,
    pub(crate) schedule: Schedule,
    pub(crate) export_dir: Option<Utf8PathBuf>,
}

impl IngestConfig {
    /// HTTP settings for the rate directory.
    pub(crate) fn rate_http(&self) -> HttpSourceConfig {
        HttpSourceConfig::default()
            .with_timeout(self.timeout)
            .with_user_agent(self.user_agent.as_str())
    }

    /// HTTP settings for the regime document; only this host may skip
    /// certificate validation.
    pub(crate) fn regime_http(&self) -> HttpSourceConfig {
        self.rate_http()
            .with_accept_invalid_certs(self.accept_invalid_certs)
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let rates_url = parse_url(
            ARG_RATES_URL,
            args.rates_url.as_deref().unwrap_or(DEFAULT_RATE_DIRECTORY_URL),
        )?;
        let regimes_url = parse_url(
            ARG_REGIMES_URL,
            args.regimes_url
                .as_deref()
                .unwrap_or(DEFAULT_REGIME_DOCUMENT_URL),
        )?;
        let timeout_secs = positive(
            ARG_TIMEOUT_SECS,
            args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        )?;
        let retry_attempts = positive(
            ARG_RETRY_ATTEMPTS,
            args.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
        )?;
        let rates_every = positive(
            ARG_RATES_EVERY_HOURS,
            args.rates_every_hours.unwrap_or(DEFAULT_RATES_EVERY_HOURS),
        )?;
        let regimes_every = positive(
            ARG_REGIMES_EVERY_HOURS,
            args.regimes_every_hours
                .unwrap_or(DEFAULT_REGIMES_EVERY_HOURS),
        )?;
        let retry_delay = Duration::from_millis(args.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS));
        Ok(Self {
            database: args
                .database
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            metadata: args
                .metadata
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_METADATA)),
            rates_url,
            regimes_url,
            user_agent: args
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy::default()
                .with_max_attempts(retry_attempts)
                .with_delay(retry_delay),
            accept_invalid_certs: args.accept_invalid_certs.unwrap_or(true),
            schedule: Schedule::default()
                .with_rates_every(hours(rates_every))
                .with_regimes_every(hours(regimes_every)),
            export_dir: args.export_dir,
        })
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, CliError> {
    Url::parse(raw).map_err(|err| CliError::InvalidSetting {
        field,
        reason: format!("{raw:?} is not a valid URL ({err})"),
    })
}

fn positive<T>(field: &'static str, value: T) -> Result<T, CliError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        Err(CliError::InvalidSetting {
            field,
            reason: "must be greater than zero".to_owned(),
        })
    } else {
        Ok(value)
    }
}

const fn hours(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(SECS_PER_HOUR))
}
