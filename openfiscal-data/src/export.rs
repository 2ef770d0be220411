//! Flattened snapshots of the merged rate and regime view.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use openfiscal_core::{DatasetStore, MergedRate, RateComponents, RateRecord, merged_rates};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ExportError;

/// Default file name of the JSON snapshot.
pub const JSON_EXPORT_FILE: &str = "openfiscal_completo.json";
/// Default file name of the CSV snapshot.
pub const CSV_EXPORT_FILE: &str = "openfiscal_completo.csv";
/// Default file name of the compact per-product JSON snapshot.
pub const COMPACT_EXPORT_FILE: &str = "resultado_otimizado.json";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CSV_HEADER: [&str; 19] = [
    "productCode",
    "jurisdiction",
    "exceptionCode",
    "productType",
    "description",
    "national",
    "imported",
    "state",
    "municipal",
    "totalDomestic",
    "totalImported",
    "validFrom",
    "validUntil",
    "key",
    "version",
    "origin",
    "regimeCodes",
    "regimePrefixes",
    "regimeDescriptions",
];

/// Paths and row count of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Rows written to each artefact.
    pub rows: usize,
    /// JSON artefact, when requested.
    pub json: Option<Utf8PathBuf>,
    /// CSV artefact, when requested.
    pub csv: Option<Utf8PathBuf>,
    /// Compact JSON artefact, when requested.
    pub compact: Option<Utf8PathBuf>,
}

/// Write the requested snapshots of `store`, replacing existing files.
///
/// Every artefact is rendered from one read of each table.
///
/// # Errors
/// Fails when the store cannot be read or an artefact cannot be rendered or
/// written.
pub fn export_snapshots<S>(
    store: &S,
    json: Option<&Utf8Path>,
    csv: Option<&Utf8Path>,
    compact: Option<&Utf8Path>,
) -> Result<ExportReport, ExportError>
where
    S: DatasetStore + ?Sized,
{
    let rows = merged_rates(store).map_err(|source| ExportError::Store { source })?;
    if let Some(path) = json {
        write(path, &render_json(&rows)?)?;
        info!("Wrote {} merged rows to {path}", rows.len());
    }
    if let Some(path) = csv {
        write(path, &render_csv(&rows)?)?;
        info!("Wrote {} merged rows to {path}", rows.len());
    }
    if let Some(path) = compact {
        write(path, &render_compact_json(&rows)?)?;
        info!("Wrote {} merged rows to {path}", rows.len());
    }
    Ok(ExportReport {
        rows: rows.len(),
        json: json.map(Utf8Path::to_path_buf),
        csv: csv.map(Utf8Path::to_path_buf),
        compact: compact.map(Utf8Path::to_path_buf),
    })
}

/// Render merged rows as a pretty-printed JSON array.
///
/// # Errors
/// Fails when serialisation fails.
pub fn render_json(rows: &[MergedRate]) -> Result<Vec<u8>, ExportError> {
    serde_json::to_vec_pretty(rows).map_err(|source| ExportError::Json { source })
}

/// Render merged rows as UTF-8 CSV prefixed with a byte order mark.
///
/// Regime fields hold `;`-joined lists in resolution order.
///
/// # Errors
/// Fails when serialisation fails.
pub fn render_csv(rows: &[MergedRate]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    writer
        .write_record(CSV_HEADER)
        .map_err(|source| ExportError::Csv { source })?;
    for row in rows {
        writer
            .write_record(csv_fields(row))
            .map_err(|source| ExportError::Csv { source })?;
    }
    writer.into_inner().map_err(|err| ExportError::Csv {
        source: err.into_error().into(),
    })
}

fn csv_fields(row: &MergedRate) -> [String; 19] {
    let rate = &row.rate;
    let decimal = |value: Option<Decimal>| value.map(|v| v.to_string()).unwrap_or_default();
    let joined = |field: fn(&openfiscal_core::RegimeRecord) -> &str| {
        row.regimes.iter().map(field).collect::<Vec<_>>().join(";")
    };
    [
        rate.product_code.as_str().to_owned(),
        rate.jurisdiction.as_str().to_owned(),
        rate.exception_code.clone(),
        rate.product_type.clone(),
        rate.description.clone(),
        decimal(rate.rates.national),
        decimal(rate.rates.imported),
        decimal(rate.rates.state),
        decimal(rate.rates.municipal),
        row.totals.total_domestic.to_string(),
        row.totals.total_imported.to_string(),
        rate.valid_from.clone(),
        rate.valid_until.clone(),
        rate.provenance.key.clone(),
        rate.provenance.version.clone(),
        rate.provenance.origin.clone(),
        joined(|regime| regime.regime_code.as_str()),
        joined(|regime| regime.product_prefix.as_str()),
        joined(|regime| regime.description.as_str()),
    ]
}

/// Render merged rows as one compact JSON object grouped by product.
///
/// The header carries the provenance and validity of the first row. Products
/// are keyed `code-exception-type`, with an empty exception written as `0`,
/// and hold one `{n, im, es, m}` rate set per jurisdiction. Absent components
/// are written as `0`.
///
/// # Errors
/// Fails when serialisation fails.
pub fn render_compact_json(rows: &[MergedRate]) -> Result<Vec<u8>, ExportError> {
    let mut snapshot = rows
        .first()
        .map_or_else(CompactSnapshot::default, |row| CompactSnapshot::header(&row.rate));
    for rate in rows.iter().map(|row| &row.rate) {
        let exception = if rate.exception_code.is_empty() {
            "0"
        } else {
            rate.exception_code.as_str()
        };
        let key = format!(
            "{}-{exception}-{}",
            rate.product_code.as_str(),
            rate.product_type
        );
        snapshot
            .products
            .entry(key)
            .or_insert_with(|| CompactProduct {
                code: rate.product_code.as_str(),
                exception: exception.parse().ok(),
                product_type: &rate.product_type,
                description: &rate.description,
                rates: BTreeMap::new(),
            })
            .rates
            .insert(rate.jurisdiction.as_str(), CompactRates::from(&rate.rates));
    }
    serde_json::to_vec(&snapshot).map_err(|source| ExportError::Json { source })
}

#[derive(Debug, Default, Serialize)]
struct CompactSnapshot<'a> {
    #[serde(rename = "c")]
    key: &'a str,
    #[serde(rename = "v")]
    version: &'a str,
    #[serde(rename = "f")]
    origin: &'a str,
    #[serde(rename = "vI")]
    valid_from: &'a str,
    #[serde(rename = "vF")]
    valid_until: &'a str,
    #[serde(rename = "d")]
    products: BTreeMap<String, CompactProduct<'a>>,
}

impl<'a> CompactSnapshot<'a> {
    fn header(first: &'a RateRecord) -> Self {
        Self {
            key: &first.provenance.key,
            version: &first.provenance.version,
            origin: &first.provenance.origin,
            valid_from: &first.valid_from,
            valid_until: &first.valid_until,
            products: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompactProduct<'a> {
    #[serde(rename = "c")]
    code: &'a str,
    #[serde(rename = "e")]
    exception: Option<u32>,
    #[serde(rename = "t")]
    product_type: &'a str,
    #[serde(rename = "d")]
    description: &'a str,
    #[serde(rename = "i")]
    rates: BTreeMap<&'a str, CompactRates>,
}

#[derive(Debug, Serialize)]
struct CompactRates {
    #[serde(rename = "n", with = "rust_decimal::serde::float")]
    national: Decimal,
    #[serde(rename = "im", with = "rust_decimal::serde::float")]
    imported: Decimal,
    #[serde(rename = "es", with = "rust_decimal::serde::float")]
    state: Decimal,
    #[serde(rename = "m", with = "rust_decimal::serde::float")]
    municipal: Decimal,
}

impl From<&RateComponents> for CompactRates {
    fn from(rates: &RateComponents) -> Self {
        Self {
            national: rates.national.unwrap_or_default(),
            imported: rates.imported.unwrap_or_default(),
            state: rates.state.unwrap_or_default(),
            municipal: rates.municipal.unwrap_or_default(),
        }
    }
}

fn write(path: &Utf8Path, contents: &[u8]) -> Result<(), ExportError> {
    openfiscal_fs::write_atomically(path, contents).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openfiscal_core::test_support::{rate, regime};
    use openfiscal_core::{MemoryDatasetStore, RateReplacement};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn store() -> MemoryDatasetStore {
        let store = MemoryDatasetStore::new();
        store
            .replace_rates(RateReplacement::full(vec![
                rate("22030000", "SP"),
                rate("22021000", "RJ"),
            ]))
            .expect("seed rates");
        store
            .replace_regimes(vec![
                regime("03.021.00", "2203", "Cerveja"),
                regime("03.022.00", "2203", "Chope"),
            ])
            .expect("seed regimes");
        store
    }

    fn utf8(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("temp path should be UTF-8")
    }

    #[rstest]
    fn csv_starts_with_bom_and_joins_regimes(store: MemoryDatasetStore) {
        let rows = merged_rates(&store).expect("merge");
        let bytes = render_csv(&rows).expect("render");
        assert!(bytes.starts_with(UTF8_BOM));

        let mut reader = csv::Reader::from_reader(bytes.get(UTF8_BOM.len()..).expect("body"));
        let records: Vec<csv::StringRecord> = reader
            .records()
            .collect::<Result<_, _>>()
            .expect("parse export");
        let beer = records
            .iter()
            .find(|record| record.get(0) == Some("22030000"))
            .expect("beer row");
        assert_eq!(beer.get(16), Some("0302100;0302200"));
        assert_eq!(beer.get(9), Some("31.45"));
        let water = records
            .iter()
            .find(|record| record.get(0) == Some("22021000"))
            .expect("water row");
        assert_eq!(water.get(16), Some(""));
    }

    #[rstest]
    fn writes_both_artefacts(store: MemoryDatasetStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let json = utf8(&dir, "out/openfiscal_completo.json");
        let csv = utf8(&dir, "out/openfiscal_completo.csv");

        let report = export_snapshots(&store, Some(&json), Some(&csv), None).expect("export");

        assert_eq!(report.rows, 2);
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&json).expect("read json")).expect("json");
        let first = parsed.get(0).expect("first row");
        assert_eq!(first["productCode"], "22021000");
        assert!(first.get("totalDomestic").is_some());
        assert!(csv.is_file());
    }

    #[rstest]
    fn skips_artefacts_that_were_not_requested(store: MemoryDatasetStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let csv = utf8(&dir, "only.csv");

        let report = export_snapshots(&store, None, Some(&csv), None).expect("export");

        assert_eq!(report.json, None);
        assert_eq!(report.compact, None);
        assert_eq!(report.csv.as_deref(), Some(csv.as_path()));
    }

    #[rstest]
    fn compact_groups_jurisdictions_under_one_product() {
        let mut imported = rate("22030000", "RJ");
        imported.rates.imported = None;
        let mut exception = rate("22030000", "SP");
        exception.exception_code = "01".to_owned();
        let store = MemoryDatasetStore::new();
        store
            .replace_rates(RateReplacement::full(vec![
                rate("22030000", "SP"),
                imported,
                exception,
            ]))
            .expect("seed rates");
        let rows = merged_rates(&store).expect("merge");
        let first = &rows.first().expect("first row").rate;

        let bytes = render_compact_json(&rows).expect("render");
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).expect("json");

        assert_eq!(parsed["c"], first.provenance.key.as_str());
        assert_eq!(parsed["v"], first.provenance.version.as_str());
        assert_eq!(parsed["f"], first.provenance.origin.as_str());
        assert_eq!(parsed["vI"], first.valid_from.as_str());
        assert_eq!(parsed["vF"], first.valid_until.as_str());
        let products = parsed["d"].as_object().expect("product map");
        let keys: Vec<&str> = products.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["22030000-0-0", "22030000-01-0"]);

        let plain = &products["22030000-0-0"];
        assert_eq!(plain["c"], "22030000");
        assert_eq!(plain["e"], 0);
        let jurisdictions: Vec<&str> = plain["i"]
            .as_object()
            .expect("rates by jurisdiction")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(jurisdictions, vec!["RJ", "SP"]);
        assert_eq!(plain["i"]["RJ"]["im"], 0.0);
        assert_eq!(plain["i"]["RJ"]["m"], 0.0);
        let imported_rate = plain["i"]["SP"]["im"].as_f64().expect("imported rate");
        assert!((imported_rate - 15.85).abs() < 1e-9);
        assert_eq!(products["22030000-01-0"]["e"], 1);
    }

    #[rstest]
    fn compact_snapshot_of_an_empty_store_has_blank_header() {
        let bytes = render_compact_json(&[]).expect("render");
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(parsed["c"], "");
        assert_eq!(parsed["d"], serde_json::json!({}));
    }

    #[rstest]
    fn writes_the_compact_artefact(store: MemoryDatasetStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let compact = utf8(&dir, COMPACT_EXPORT_FILE);

        let report = export_snapshots(&store, None, None, Some(&compact)).expect("export");

        assert_eq!(report.compact.as_deref(), Some(compact.as_path()));
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&compact).expect("read compact")).expect("json");
        assert!(parsed["d"].get("22021000-0-0").is_some());
    }
}
