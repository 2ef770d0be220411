//! Seeded stores and captured output for CLI tests.

use super::*;
use camino::Utf8PathBuf;
use openfiscal_core::test_support::{rate, regime};
use openfiscal_core::{DatasetStore, RateReplacement, SqliteDatasetStore};
use tempfile::TempDir;

use crate::config::open_store;

/// A SQLite store in a temporary directory.
pub(super) struct SeededStore {
    dir: TempDir,
    store: SqliteDatasetStore,
}

impl SeededStore {
    /// Beer in SP and RJ, water in SP, and two beer regimes plus one water
    /// regime.
    pub(super) fn beverages() -> Self {
        let seeded = Self::empty();
        seeded
            .store
            .replace_rates(RateReplacement::full(vec![
                rate("22030000", "SP"),
                rate("22030000", "RJ"),
                rate("22011000", "SP"),
            ]))
            .expect("seed rates");
        seeded
            .store
            .replace_regimes(vec![
                regime("03.021.00", "2203", "Cerveja"),
                regime("03.022.00", "2203", "Chope"),
                regime("03.001.00", "2201.10", "Água mineral"),
            ])
            .expect("seed regimes");
        seeded
    }

    pub(super) fn empty() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("openfiscal.db"))
            .expect("temp path should be UTF-8");
        let store = open_store(&path).expect("open store");
        Self { dir, store }
    }

    pub(super) const fn store(&self) -> &SqliteDatasetStore {
        &self.store
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).expect("temp path should be UTF-8")
    }
}

/// Output captured from one command.
#[derive(Debug, Default)]
pub(super) struct Captured {
    pub(super) out: Vec<u8>,
    pub(super) diag: Vec<u8>,
}

impl Captured {
    pub(super) fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.out).expect("stdout should hold JSON")
    }

    pub(super) fn diag_text(&self) -> String {
        String::from_utf8(self.diag.clone()).expect("stderr should be UTF-8")
    }

    pub(super) fn out_text(&self) -> String {
        String::from_utf8(self.out.clone()).expect("stdout should be UTF-8")
    }
}

/// Parse `args` as a query command and run it against `store`.
pub(super) fn run_query(store: &SqliteDatasetStore, args: &[&str]) -> Result<Captured, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("openfiscal").chain(args.iter().copied()))?;
    let mut captured = Captured::default();
    match cli.command {
        Command::Lookup(lookup) => commands::lookup(
            store,
            &lookup.jurisdiction,
            &lookup.product,
            &mut captured.out,
            &mut captured.diag,
        ),
        Command::Regimes(product) => {
            commands::regimes(store, &product.product, &mut captured.out, &mut captured.diag)
        }
        Command::Regime(regime_args) => {
            commands::regime(store, &regime_args.code, &mut captured.out, &mut captured.diag)
        }
        Command::Search(search) => commands::search(
            store,
            &search.text,
            search.limit,
            &mut captured.out,
            &mut captured.diag,
        ),
        Command::Export(export) => commands::export(
            store,
            export.json.as_deref(),
            export.csv.as_deref(),
            export.compact.as_deref(),
            &mut captured.out,
        ),
        other => panic!("not a query command: {other:?}"),
    }?;
    Ok(captured)
}
