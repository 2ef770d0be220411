//! Error types emitted by the OpenFiscal CLI.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use openfiscal_core::StoreError;
use openfiscal_data::{ExportError, SourceSetupError};
use thiserror::Error;

/// Errors emitted by the OpenFiscal CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A setting was present but unusable.
    #[error("invalid {field}: {reason}")]
    InvalidSetting {
        /// Flag name of the setting.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// The dataset store could not be opened.
    #[error("failed to open dataset store at {path}: {source}")]
    OpenStore {
        /// Database location.
        path: Utf8PathBuf,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// A query against the store failed.
    #[error("query failed: {0}")]
    Query(#[source] StoreError),
    /// An upstream source could not be constructed.
    #[error("failed to configure upstream source: {0}")]
    SourceSetup(#[from] SourceSetupError),
    /// The async runtime could not be started.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),
    /// Neither source could be synchronised.
    #[error("synchronisation failed (rates: {rates}; regimes: {regimes})")]
    SyncFailed {
        /// Rate pipeline summary.
        rates: String,
        /// Regime pipeline summary.
        regimes: String,
    },
    /// Writing export artefacts failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Serialising command output failed.
    #[error("failed to serialise output: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}
