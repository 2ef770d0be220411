use rusqlite::{Connection, Error as SqliteError, OptionalExtension, Transaction};
use thiserror::Error;

/// Version recorded in `schema_version` by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Create the dataset tables inside `connection` and record the schema
/// version. Existing databases must already be at [`SCHEMA_VERSION`].
pub(crate) fn initialise_schema(connection: &mut Connection) -> Result<(), SchemaError> {
    connection
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(|source| SchemaError::JournalMode { source })?;

    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_tables(&transaction)?;
    create_indexes(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create rate_records",
        "CREATE TABLE IF NOT EXISTS rate_records (
            product_code TEXT NOT NULL CHECK (length(product_code) > 0),
            jurisdiction TEXT NOT NULL CHECK (length(jurisdiction) > 0),
            exception_code TEXT NOT NULL,
            product_type TEXT NOT NULL,
            description TEXT NOT NULL,
            national TEXT,
            imported TEXT,
            state TEXT,
            municipal TEXT,
            valid_from TEXT NOT NULL,
            valid_until TEXT NOT NULL,
            release_key TEXT NOT NULL,
            release_version TEXT NOT NULL,
            origin TEXT NOT NULL,
            PRIMARY KEY (product_code, jurisdiction, exception_code)
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create regime_records",
        "CREATE TABLE IF NOT EXISTS regime_records (
            regime_code TEXT NOT NULL CHECK (length(regime_code) > 0),
            product_prefix TEXT NOT NULL CHECK (length(product_prefix) > 0),
            description TEXT NOT NULL,
            PRIMARY KEY (regime_code, product_prefix)
        ) WITHOUT ROWID",
    )
}

fn create_indexes(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "index regime_records by prefix",
        "CREATE INDEX IF NOT EXISTS idx_regime_records_prefix
            ON regime_records(product_prefix)",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing: Option<i64> = transaction
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SchemaError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| SchemaError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

/// Errors raised while preparing the dataset schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Switching the database to write-ahead logging failed.
    #[error("failed to enable SQLite write-ahead logging")]
    JournalMode {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A schema statement failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Name of the failing step.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The database was created by an incompatible build.
    #[error(
        "expected dataset schema version {expected} but found {found}; apply migrations before retrying"
    )]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
}
