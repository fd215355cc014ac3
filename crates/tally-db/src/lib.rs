//! # tally-db
//!
//! Persisted state of the oracle module.
//!
//! A single SQLite database holds every oracle entity. Secondary indexes
//! (reports by reporter, aggregates by height, rounds by revealed flag, ...)
//! are SQL indexes, so they can never drift from the primary rows.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Token amounts are stored as decimal TEXT (they exceed `i64`)
//! - Query ids are 32-byte BLOBs, addresses are bech32 TEXT
//! - Schema version stored in `PRAGMA user_version`
//!
//! Message handlers run inside [`with_savepoint`] so a failed message
//! leaves no writes behind.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tally_types::{AccAddress, QueryId};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the oracle database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing and simulation).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Run `f` inside a named savepoint.
///
/// The savepoint is released when `f` succeeds and rolled back when it
/// fails, so the caller observes all of `f`'s writes or none of them.
/// Savepoints nest; an inner failure only discards the inner writes.
///
/// # Errors
///
/// Returns whatever `f` returns, or a [`DbError`] if the savepoint itself
/// cannot be opened, released or rolled back.
pub fn with_savepoint<T, E, F>(conn: &Connection, name: &str, f: F) -> std::result::Result<T, E>
where
    F: FnOnce() -> std::result::Result<T, E>,
    E: From<DbError>,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))
        .map_err(DbError::from)?;
    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))
                .map_err(DbError::from)?;
            Ok(value)
        }
        Err(e) => {
            conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                .map_err(DbError::from)?;
            Err(e)
        }
    }
}

/// Map `QueryReturnedNoRows` to [`DbError::NotFound`].
pub(crate) fn not_found(what: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> DbError {
    let what = what.into();
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(what),
        other => DbError::Sqlite(other),
    }
}

fn conversion_error(idx: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, msg.into())
}

/// Read a decimal-TEXT amount column.
pub(crate) fn amount_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<u128> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: std::num::ParseIntError| conversion_error(idx, Type::Text, e.to_string()))
}

/// Read a bech32 address column.
pub(crate) fn address_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<AccAddress> {
    let raw: String = row.get(idx)?;
    AccAddress::parse(&raw).map_err(|e| conversion_error(idx, Type::Text, e.to_string()))
}

/// Read a 32-byte query id column.
pub(crate) fn query_id_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<QueryId> {
    let raw: Vec<u8> = row.get(idx)?;
    raw.try_into().map_err(|v: Vec<u8>| {
        conversion_error(idx, Type::Blob, format!("query id of {} bytes", v.len()))
    })
}

/// Read an `INTEGER` column as `u64`.
pub(crate) fn u64_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|e| conversion_error(idx, Type::Integer, e.to_string()))
}

/// Convert a `u64` for binding as an SQLite `INTEGER`.
pub(crate) fn to_sql_u64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::Constraint(format!("{value} exceeds INTEGER range")))
}
