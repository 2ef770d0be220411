//! Extraction of regime records from the published convention document.

use std::sync::LazyLock;

use log::{debug, warn};
use openfiscal_core::{ProductPrefix, RegimeCode, RegimeRecord};
use scraper::{ElementRef, Html, Selector};

#[expect(clippy::expect_used, reason = "the selectors are literals")]
static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.A6-1Subtitulo").expect("valid heading selector"));

#[expect(clippy::expect_used, reason = "the selectors are literals")]
static BODY_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tbody tr").expect("valid row selector"));

#[expect(clippy::expect_used, reason = "the selectors are literals")]
static CELLS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("valid cell selector"));

const ANNEX_MARKER: &str = "ANEXO ";
const MAX_HEADING_CHARS: usize = 15;
const MIN_CELLS: usize = 4;

/// Records recovered from the regime document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRegimes {
    /// One record per `(regime code, prefix)` pair, in document order.
    pub records: Vec<RegimeRecord>,
    /// Annex headings recognised in the document.
    pub sections: usize,
    /// Sections without a table plus rows that could not be read.
    pub skipped_units: usize,
}

/// Walk every annex table in `html` and emit its regime records.
///
/// An annex heading is a `p.A6-1Subtitulo` element whose trimmed text starts
/// with `ANEXO ` and is shorter than 15 characters. The first table after the
/// heading is read row by row, skipping its header row. Column 1 holds the
/// regime code, column 2 a whitespace-separated prefix list and column 3 the
/// description.
#[must_use]
pub fn parse_regime_document(html: &str) -> ParsedRegimes {
    let document = Html::parse_document(html);
    let mut parsed = ParsedRegimes::default();

    for heading in document.select(&HEADINGS) {
        let heading_text = heading.text().collect::<String>();
        let title = heading_text.trim();
        if !is_annex_title(title) {
            continue;
        }
        parsed.sections = parsed.sections.saturating_add(1);
        let Some(table) = following_table(heading) else {
            warn!("Skipping {title}: no table follows the heading");
            parsed.skipped_units = parsed.skipped_units.saturating_add(1);
            continue;
        };

        let before = parsed.records.len();
        for (index, row) in table.select(&BODY_ROWS).enumerate().skip(1) {
            match regime_rows(row) {
                Some(records) => parsed.records.extend(records),
                None => {
                    warn!("Skipping {title} row {index}: fewer than {MIN_CELLS} cells or no regime code");
                    parsed.skipped_units = parsed.skipped_units.saturating_add(1);
                }
            }
        }
        debug!(
            "Parsed {} regime records from {title}",
            parsed.records.len().saturating_sub(before)
        );
    }
    parsed
}

fn is_annex_title(title: &str) -> bool {
    title.starts_with(ANNEX_MARKER) && title.chars().count() < MAX_HEADING_CHARS
}

fn following_table(heading: ElementRef<'_>) -> Option<ElementRef<'_>> {
    heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|sibling| sibling.value().name() == "table")
}

fn regime_rows(row: ElementRef<'_>) -> Option<Vec<RegimeRecord>> {
    let cells: Vec<String> = row
        .select(&CELLS)
        .map(|cell| cell.text().collect::<String>())
        .collect();
    if cells.len() < MIN_CELLS {
        return None;
    }
    let code = RegimeCode::normalise(cells.get(1)?);
    if code.is_empty() {
        return None;
    }
    let description = collapse_whitespace(cells.get(3)?);
    Some(
        cells
            .get(2)?
            .split_whitespace()
            .filter_map(ProductPrefix::clean)
            .map(|prefix| RegimeRecord::new(code.clone(), prefix, description.clone()))
            .collect(),
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn annex(title: &str, rows: &str) -> String {
        format!(
            r#"<p class="A6-1Subtitulo">{title}</p>
            <p>texto</p>
            <table><tbody>
                <tr><td>ITEM</td><td>CEST</td><td>NCM/SH</td><td>DESCRIÇÃO</td></tr>
                {rows}
            </tbody></table>"#
        )
    }

    fn pairs(parsed: &ParsedRegimes) -> Vec<(&str, &str, &str)> {
        parsed
            .records
            .iter()
            .map(|record| {
                (
                    record.regime_code.as_str(),
                    record.product_prefix.as_str(),
                    record.description.as_str(),
                )
            })
            .collect()
    }

    #[rstest]
    fn emits_one_record_per_prefix() {
        let html = annex(
            "ANEXO III",
            "<tr><td>1.0</td><td>03.001.00</td><td>2201.10.00\n 2201.90.00</td><td>Água   mineral,\n gasosa</td></tr>",
        );
        let parsed = parse_regime_document(&html);
        assert_eq!(
            pairs(&parsed),
            vec![
                ("0300100", "22011000", "Água mineral, gasosa"),
                ("0300100", "22019000", "Água mineral, gasosa"),
            ]
        );
        assert_eq!(parsed.sections, 1);
        assert_eq!(parsed.skipped_units, 0);
    }

    #[rstest]
    fn drops_prefixes_without_digits() {
        let html = annex(
            "ANEXO IV",
            "<tr><td>1</td><td>03.002.00</td><td>2202 - Ex 01</td><td>Refrigerante</td></tr>",
        );
        let parsed = parse_regime_document(&html);
        let prefixes: Vec<&str> = parsed
            .records
            .iter()
            .map(|record| record.product_prefix.as_str())
            .collect();
        assert_eq!(prefixes, vec!["2202", "01"]);
    }

    #[rstest]
    #[case::long_title("ANEXO XXVII - COMBUSTÍVEIS")]
    #[case::wrong_marker("APÊNDICE I")]
    fn ignores_headings_that_are_not_annex_titles(#[case] title: &str) {
        let html = annex(
            title,
            "<tr><td>1</td><td>01.001.00</td><td>4016</td><td>Peças</td></tr>",
        );
        let parsed = parse_regime_document(&html);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.sections, 0);
    }

    #[rstest]
    fn counts_short_rows_and_missing_tables() {
        let mut html = annex(
            "ANEXO I",
            "<tr><td>1</td><td>01.001.00</td></tr>\
             <tr><td>2</td><td>01.002.00</td><td>4009</td><td>Tubos</td></tr>",
        );
        html.push_str(r#"<div><p class="A6-1Subtitulo">ANEXO II</p></div>"#);
        let parsed = parse_regime_document(&html);
        assert_eq!(pairs(&parsed), vec![("0100200", "4009", "Tubos")]);
        assert_eq!(parsed.sections, 2);
        assert_eq!(parsed.skipped_units, 2);
    }

    #[rstest]
    fn document_without_annexes_yields_nothing() {
        let parsed = parse_regime_document("<html><body><p>Convênio</p></body></html>");
        assert_eq!(parsed, ParsedRegimes::default());
    }
}
