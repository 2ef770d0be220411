//! Command-line interface for the OpenFiscal dataset service.
#![forbid(unsafe_code)]

use std::io::{self, Write};

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;

use config::{IngestArgs, StoreArgs};
pub use error::CliError;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_LOG_FILTER: &str = "info";

/// Run the OpenFiscal CLI with the current process arguments and environment.
///
/// # Errors
/// Returns [`CliError`] when arguments or configuration are invalid, the
/// store cannot be opened or queried, or both sources fail to synchronise.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging();
    let stdout = io::stdout();
    let stderr = io::stderr();
    execute(cli.command, &mut stdout.lock(), &mut stderr.lock())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .is_ok();
}

fn execute(command: Command, out: &mut impl Write, diag: &mut impl Write) -> Result<(), CliError> {
    match command {
        Command::Sync(args) => commands::sync(&args.into_config()?, out),
        Command::Schedule(args) => commands::schedule(&args.into_config()?, out),
        Command::Lookup(args) => {
            let store = args.store.open()?;
            commands::lookup(&store, &args.jurisdiction, &args.product, out, diag)
        }
        Command::Regimes(args) => {
            let store = args.store.open()?;
            commands::regimes(&store, &args.product, out, diag)
        }
        Command::Regime(args) => {
            let store = args.store.open()?;
            commands::regime(&store, &args.code, out, diag)
        }
        Command::Search(args) => {
            let store = args.store.open()?;
            commands::search(&store, &args.text, args.limit, out, diag)
        }
        Command::Export(args) => {
            let store = args.store.open()?;
            commands::export(
                &store,
                args.json.as_deref(),
                args.csv.as_deref(),
                args.compact.as_deref(),
                out,
            )
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "openfiscal",
    about = "Synchronise and query fiscal rate and special-regime datasets",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synchronise both datasets once.
    Sync(IngestArgs),
    /// Keep synchronising on a timer until interrupted.
    Schedule(IngestArgs),
    /// Show the merged rate of a product in a jurisdiction.
    Lookup(LookupArgs),
    /// List the regimes resolved for a product code.
    Regimes(ProductArgs),
    /// List the product prefixes of a regime code.
    Regime(RegimeArgs),
    /// Rank products by description.
    Search(SearchArgs),
    /// Write JSON, CSV and compact JSON snapshots of the merged view.
    Export(ExportArgs),
}

#[derive(Debug, Clone, Args)]
struct LookupArgs {
    /// Jurisdiction code, e.g. `SP`.
    jurisdiction: String,
    /// Product code with or without separators.
    product: String,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
struct ProductArgs {
    /// Product code with or without separators.
    product: String,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
struct RegimeArgs {
    /// Regime code with or without dots.
    code: String,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
struct SearchArgs {
    /// Words that must all appear in the description.
    text: String,
    /// Maximum number of results.
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: usize,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Debug, Clone, Args)]
struct ExportArgs {
    /// Destination of the JSON snapshot.
    #[arg(long, value_name = "path")]
    json: Option<Utf8PathBuf>,
    /// Destination of the CSV snapshot.
    #[arg(long, value_name = "path")]
    csv: Option<Utf8PathBuf>,
    /// Destination of the compact per-product JSON snapshot.
    #[arg(long, value_name = "path")]
    compact: Option<Utf8PathBuf>,
    #[command(flatten)]
    store: StoreArgs,
}

#[cfg(test)]
mod tests;
