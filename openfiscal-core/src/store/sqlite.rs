//! SQLite-backed store.
//!
//! Every operation opens its own connection so the store can be shared across
//! threads without a connection pool. The database runs in WAL mode; a reader
//! on another connection keeps seeing the previous table until a replacement
//! transaction commits.

use std::{str::FromStr, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use rusqlite::{Connection, Row, params, params_from_iter};
use rust_decimal::Decimal;

use crate::code::{Jurisdiction, ProductCode, ProductPrefix, RegimeCode};
use crate::record::{Provenance, RateComponents, RateRecord, RegimeRecord};
use crate::search::{SearchHit, SearchQuery, rank};

use super::schema::initialise_schema;
use super::{
    DatasetStore, RateReplacement, StoreError, TableStats, base_entry, dedupe_rates,
    dedupe_regimes, validate_rates, validate_regimes,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RATE_COLUMNS: &str = "product_code, jurisdiction, exception_code, product_type, \
     description, national, imported, state, municipal, valid_from, valid_until, \
     release_key, release_version, origin";

const REGIME_COLUMNS: &str = "regime_code, product_prefix, description";

/// [`DatasetStore`] persisted in a SQLite database file.
///
/// # Examples
/// ```
/// use openfiscal_core::{DatasetStore, SqliteDatasetStore};
///
/// let dir = tempfile::tempdir().expect("temp dir");
/// let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("fiscal.db")).expect("utf-8");
/// let store = SqliteDatasetStore::open(&path).expect("open store");
/// assert_eq!(store.rate_count().expect("count"), 0);
/// ```
#[derive(Debug, Clone)]
pub struct SqliteDatasetStore {
    path: Utf8PathBuf,
}

impl SqliteDatasetStore {
    /// Open or create the database at `path` and ensure the schema exists.
    ///
    /// # Errors
    /// Returns [`StoreError::Open`] when the file cannot be opened and
    /// [`StoreError::Schema`] when the schema cannot be created or belongs to
    /// another version.
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        let mut connection = store.connect()?;
        initialise_schema(&mut connection)?;
        debug!("dataset schema ready at {}", store.path);
        Ok(store)
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(self.path.as_std_path()).map_err(|source| {
            StoreError::Open {
                path: self.path.clone(),
                source,
            }
        })?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite("configure busy timeout"))?;
        Ok(connection)
    }

    fn count(&self, sql: &str, operation: &'static str) -> Result<usize, StoreError> {
        let connection = self.connect()?;
        let total: i64 = connection
            .query_row(sql, [], |row| row.get(0))
            .map_err(sqlite(operation))?;
        usize::try_from(total).map_err(|_| StoreError::Corrupt {
            column: "count",
            value: total.to_string(),
        })
    }

    fn query_rates<P>(
        &self,
        filter: &str,
        params: P,
        operation: &'static str,
    ) -> Result<Vec<RateRecord>, StoreError>
    where
        P: rusqlite::Params,
    {
        let connection = self.connect()?;
        let sql = format!("SELECT {RATE_COLUMNS} FROM rate_records {filter}");
        let mut statement = connection
            .prepare_cached(&sql)
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params, StoredRate::from_row)
            .map_err(sqlite(operation))?;
        rows.map(|row| row.map_err(sqlite(operation))?.into_record())
            .collect()
    }

    fn query_regimes<P>(
        &self,
        filter: &str,
        params: P,
        operation: &'static str,
    ) -> Result<Vec<RegimeRecord>, StoreError>
    where
        P: rusqlite::Params,
    {
        let connection = self.connect()?;
        let sql = format!("SELECT {REGIME_COLUMNS} FROM regime_records {filter}");
        let mut statement = connection
            .prepare_cached(&sql)
            .map_err(sqlite(operation))?;
        let rows = statement
            .query_map(params, StoredRegime::from_row)
            .map_err(sqlite(operation))?;
        rows.map(|row| row.map_err(sqlite(operation))?.into_record())
            .collect()
    }
}

impl DatasetStore for SqliteDatasetStore {
    fn lookup_rate(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Option<RateRecord>, StoreError> {
        let variants = self.rates_for(product_code, jurisdiction)?;
        Ok(base_entry(&variants).cloned())
    }

    fn rates_for(
        &self,
        product_code: &str,
        jurisdiction: &str,
    ) -> Result<Vec<RateRecord>, StoreError> {
        let code = ProductCode::normalise(product_code);
        let uf = Jurisdiction::normalise(jurisdiction);
        self.query_rates(
            "WHERE product_code = ?1 AND jurisdiction = ?2 ORDER BY exception_code",
            params![code.as_str(), uf.as_str()],
            "query rate variants",
        )
    }

    fn resolve_regimes(&self, product_code: &str) -> Result<Vec<RegimeRecord>, StoreError> {
        let code = ProductCode::normalise(product_code);
        self.query_regimes(
            "WHERE substr(?1, 1, length(product_prefix)) = product_prefix
               AND length(product_prefix) = (
                   SELECT MAX(length(product_prefix)) FROM regime_records
                   WHERE substr(?1, 1, length(product_prefix)) = product_prefix
               )
             ORDER BY regime_code, product_prefix",
            params![code.as_str()],
            "resolve regimes by prefix",
        )
    }

    fn regimes_by_code(&self, regime_code: &str) -> Result<Vec<RegimeRecord>, StoreError> {
        let code = RegimeCode::normalise(regime_code);
        self.query_regimes(
            "WHERE regime_code = ?1 ORDER BY product_prefix",
            params![code.as_str()],
            "query regimes by code",
        )
    }

    fn search_by_description(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let Some(query) = SearchQuery::parse(text) else {
            return Ok(Vec::new());
        };
        // LIKE folds ASCII case only, so non-ASCII terms are left to `rank`.
        let ascii_terms: Vec<String> = query
            .terms()
            .iter()
            .filter(|term| term.is_ascii())
            .map(|term| format!("%{term}%"))
            .collect();
        let filter: String = ascii_terms
            .iter()
            .enumerate()
            .map(|(position, _)| format!(" AND description LIKE ?{}", position + 1))
            .collect();
        let sql =
            format!("SELECT DISTINCT product_code, description FROM rate_records WHERE 1 = 1{filter}");

        let connection = self.connect()?;
        let mut statement = connection
            .prepare(&sql)
            .map_err(sqlite("search rate descriptions"))?;
        let candidates = statement
            .query_map(params_from_iter(ascii_terms.iter()), |row| {
                Ok((
                    ProductCode::normalise(&row.get::<_, String>(0)?),
                    row.get::<_, String>(1)?,
                ))
            })
            .map_err(sqlite("search rate descriptions"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite("search rate descriptions"))?;

        Ok(rank(
            &query,
            candidates
                .iter()
                .map(|(code, description)| (code, description.as_str())),
            limit,
        ))
    }

    fn all_rates(&self) -> Result<Vec<RateRecord>, StoreError> {
        self.query_rates(
            "ORDER BY product_code, jurisdiction, exception_code",
            [],
            "enumerate rates",
        )
    }

    fn all_regimes(&self) -> Result<Vec<RegimeRecord>, StoreError> {
        self.query_regimes(
            "ORDER BY regime_code, product_prefix",
            [],
            "enumerate regimes",
        )
    }

    fn rate_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) FROM rate_records", "count rates")
    }

    fn regime_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) FROM regime_records", "count regimes")
    }

    fn replace_rates(&self, replacement: RateReplacement) -> Result<TableStats, StoreError> {
        validate_rates(&replacement.fresh)?;
        let fresh = dedupe_rates(replacement.fresh);
        let carried: Vec<&str> = replacement
            .carried_over
            .iter()
            .map(Jurisdiction::as_str)
            .collect();

        let mut connection = self.connect()?;
        let transaction = connection
            .transaction()
            .map_err(sqlite("begin rate replacement"))?;

        if carried.is_empty() {
            transaction
                .execute("DELETE FROM rate_records", [])
                .map_err(sqlite("clear rate table"))?;
        } else {
            let placeholders = vec!["?"; carried.len()].join(", ");
            transaction
                .execute(
                    &format!("DELETE FROM rate_records WHERE jurisdiction NOT IN ({placeholders})"),
                    params_from_iter(carried.iter()),
                )
                .map_err(sqlite("discard refreshed jurisdictions"))?;
        }

        {
            let mut insert = transaction
                .prepare_cached(&format!(
                    "INSERT OR REPLACE INTO rate_records ({RATE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ))
                .map_err(sqlite("prepare rate insert"))?;
            for record in fresh.values() {
                let rates = &record.rates;
                insert
                    .execute(params![
                        record.product_code.as_str(),
                        record.jurisdiction.as_str(),
                        record.exception_code,
                        record.product_type,
                        record.description,
                        rates.national.map(|value| value.to_string()),
                        rates.imported.map(|value| value.to_string()),
                        rates.state.map(|value| value.to_string()),
                        rates.municipal.map(|value| value.to_string()),
                        record.valid_from,
                        record.valid_until,
                        record.provenance.key,
                        record.provenance.version,
                        record.provenance.origin,
                    ])
                    .map_err(sqlite("insert rate record"))?;
            }
        }

        let stored: i64 = transaction
            .query_row("SELECT COUNT(*) FROM rate_records", [], |row| row.get(0))
            .map_err(sqlite("count rates"))?;
        transaction
            .commit()
            .map_err(sqlite("commit rate replacement"))?;

        let total = usize::try_from(stored).unwrap_or_default();
        let inserted = fresh.len();
        Ok(TableStats {
            inserted,
            carried_over: total.saturating_sub(inserted),
            total,
        })
    }

    fn replace_regimes(&self, records: Vec<RegimeRecord>) -> Result<TableStats, StoreError> {
        validate_regimes(&records)?;
        let unique = dedupe_regimes(records);

        let mut connection = self.connect()?;
        let transaction = connection
            .transaction()
            .map_err(sqlite("begin regime replacement"))?;
        transaction
            .execute("DELETE FROM regime_records", [])
            .map_err(sqlite("clear regime table"))?;
        {
            let mut insert = transaction
                .prepare_cached(&format!(
                    "INSERT OR IGNORE INTO regime_records ({REGIME_COLUMNS}) VALUES (?1, ?2, ?3)"
                ))
                .map_err(sqlite("prepare regime insert"))?;
            for record in &unique {
                insert
                    .execute(params![
                        record.regime_code.as_str(),
                        record.product_prefix.as_str(),
                        record.description,
                    ])
                    .map_err(sqlite("insert regime record"))?;
            }
        }
        transaction
            .commit()
            .map_err(sqlite("commit regime replacement"))?;

        Ok(TableStats {
            inserted: unique.len(),
            carried_over: 0,
            total: unique.len(),
        })
    }
}

fn sqlite(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}

struct StoredRate {
    product_code: String,
    jurisdiction: String,
    exception_code: String,
    product_type: String,
    description: String,
    national: Option<String>,
    imported: Option<String>,
    state: Option<String>,
    municipal: Option<String>,
    valid_from: String,
    valid_until: String,
    key: String,
    version: String,
    origin: String,
}

impl StoredRate {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            product_code: row.get(0)?,
            jurisdiction: row.get(1)?,
            exception_code: row.get(2)?,
            product_type: row.get(3)?,
            description: row.get(4)?,
            national: row.get(5)?,
            imported: row.get(6)?,
            state: row.get(7)?,
            municipal: row.get(8)?,
            valid_from: row.get(9)?,
            valid_until: row.get(10)?,
            key: row.get(11)?,
            version: row.get(12)?,
            origin: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<RateRecord, StoreError> {
        Ok(RateRecord {
            product_code: ProductCode::normalise(&self.product_code),
            jurisdiction: Jurisdiction::normalise(&self.jurisdiction),
            exception_code: self.exception_code,
            product_type: self.product_type,
            description: self.description,
            rates: RateComponents {
                national: decode_decimal("national", self.national)?,
                state: decode_decimal("state", self.state)?,
                municipal: decode_decimal("municipal", self.municipal)?,
                imported: decode_decimal("imported", self.imported)?,
            },
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            provenance: Provenance {
                key: self.key,
                version: self.version,
                origin: self.origin,
            },
        })
    }
}

fn decode_decimal(column: &'static str, raw: Option<String>) -> Result<Option<Decimal>, StoreError> {
    raw.map(|text| {
        Decimal::from_str(&text).map_err(|_| StoreError::Corrupt {
            column,
            value: text,
        })
    })
    .transpose()
}

struct StoredRegime {
    regime_code: String,
    product_prefix: String,
    description: String,
}

impl StoredRegime {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            regime_code: row.get(0)?,
            product_prefix: row.get(1)?,
            description: row.get(2)?,
        })
    }

    fn into_record(self) -> Result<RegimeRecord, StoreError> {
        let prefix =
            ProductPrefix::clean(&self.product_prefix).ok_or_else(|| StoreError::Corrupt {
                column: "product_prefix",
                value: self.product_prefix.clone(),
            })?;
        Ok(RegimeRecord::new(
            RegimeCode::normalise(&self.regime_code),
            prefix,
            self.description,
        ))
    }
}
