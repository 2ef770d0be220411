//! Pure parsers for the rate-table directory listing and its CSV files.

use std::str::FromStr;
use std::sync::LazyLock;

use log::warn;
use openfiscal_core::{Jurisdiction, ProductCode, Provenance, RateComponents, RateRecord};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use url::Url;

#[expect(clippy::expect_used, reason = "the pattern is a literal")]
static JURISDICTION_IN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TabelaIBPTax([A-Z]{2})").expect("valid jurisdiction pattern"));

#[expect(clippy::expect_used, reason = "the selector is a literal")]
static CSV_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href$=".csv"]"#).expect("valid link selector"));

/// Columns every data row must carry; provenance columns may be missing.
const REQUIRED_COLUMNS: usize = 10;

/// A CSV file advertised by the directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// Absolute download URL.
    pub url: String,
    /// Last path segment of the URL.
    pub file_name: String,
}

/// Rows recovered from one rate file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRateFile {
    /// Valid, normalised records.
    pub records: Vec<RateRecord>,
    /// Rows that were dropped as malformed.
    pub malformed_rows: usize,
}

/// Collect every link ending in `.csv` from a directory listing page.
///
/// Relative links are resolved against `base`. Links that cannot be resolved
/// are logged and skipped.
#[must_use]
pub fn parse_listing(html: &str, base: &Url) -> Vec<ListedFile> {
    let document = Html::parse_document(html);
    let mut files: Vec<ListedFile> = Vec::new();
    for anchor in document.select(&CSV_LINKS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = match base.join(href) {
            Ok(url) => url,
            Err(err) => {
                warn!("Skipping listing entry {href:?}: {err}");
                continue;
            }
        };
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_owned();
        if files.iter().any(|file| file.url == url.as_str()) {
            continue;
        }
        files.push(ListedFile {
            url: url.into(),
            file_name,
        });
    }
    files
}

/// Extract the jurisdiction encoded in a rate file name.
///
/// # Examples
/// ```
/// use openfiscal_data::jurisdiction_from_file_name;
///
/// let uf = jurisdiction_from_file_name("TabelaIBPTaxSP26.1.A.csv");
/// assert_eq!(uf.map(|uf| uf.into_inner()), Some("SP".to_owned()));
/// assert!(jurisdiction_from_file_name("leiame.csv").is_none());
/// ```
#[must_use]
pub fn jurisdiction_from_file_name(file_name: &str) -> Option<Jurisdiction> {
    JURISDICTION_IN_NAME
        .captures(file_name)
        .and_then(|captures| captures.get(1))
        .map(|uf| Jurisdiction::normalise(uf.as_str()))
}

/// Parse a semicolon-delimited rate file for `jurisdiction`.
///
/// The first line is a header. Fields are trimmed, decimal commas become
/// points and empty rate cells are absent. Rows that are short, carry a
/// non-numeric or negative rate, or lack a product code are counted in
/// [`ParsedRateFile::malformed_rows`] and skipped.
#[must_use]
pub fn parse_rate_file(body: &[u8], jurisdiction: &Jurisdiction) -> ParsedRateFile {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let mut parsed = ParsedRateFile::default();
    for (line, row) in reader.byte_records().enumerate() {
        let row_number = line.saturating_add(2);
        let outcome = row
            .map_err(|err| err.to_string())
            .and_then(|row| rate_from_row(&row, jurisdiction));
        match outcome {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                warn!("Skipping {jurisdiction} row {row_number}: {reason}");
                parsed.malformed_rows = parsed.malformed_rows.saturating_add(1);
            }
        }
    }
    parsed
}

fn rate_from_row(row: &csv::ByteRecord, jurisdiction: &Jurisdiction) -> Result<RateRecord, String> {
    if row.len() < REQUIRED_COLUMNS {
        return Err(format!(
            "expected at least {REQUIRED_COLUMNS} columns, found {}",
            row.len()
        ));
    }
    let field = |index: usize| {
        row.get(index)
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_owned())
            .unwrap_or_default()
    };
    let record = RateRecord {
        product_code: ProductCode::normalise(&field(0)),
        jurisdiction: jurisdiction.clone(),
        exception_code: field(1),
        product_type: field(2),
        description: field(3),
        rates: RateComponents {
            national: parse_rate("national", &field(4))?,
            imported: parse_rate("imported", &field(5))?,
            state: parse_rate("state", &field(6))?,
            municipal: parse_rate("municipal", &field(7))?,
        },
        valid_from: field(8),
        valid_until: field(9),
        provenance: Provenance {
            key: field(10),
            version: field(11),
            origin: field(12),
        },
    };
    record.validate().map_err(|err| err.to_string())?;
    Ok(record)
}

fn parse_rate(component: &str, raw: &str) -> Result<Option<Decimal>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&raw.replace(',', "."))
        .map(Some)
        .map_err(|err| format!("{component} rate {raw:?} is not a number: {err}"))
}
