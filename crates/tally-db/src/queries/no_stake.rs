//! Reports accepted without a stake check.

use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{AccAddress, NoStakeMicroReport, QueryId};

use crate::{address_col, query_id_col, to_sql_u64, u64_col, DbError, Result};

const COLUMNS: &str = "reporter, query_id, value, timestamp_ms, block_number";

fn from_row(row: &Row<'_>) -> rusqlite::Result<NoStakeMicroReport> {
    Ok(NoStakeMicroReport {
        reporter: address_col(row, 0)?,
        query_id: query_id_col(row, 1)?,
        value: row.get(2)?,
        timestamp_ms: u64_col(row, 3)?,
        block_number: u64_col(row, 4)?,
    })
}

/// Whether a report already exists for `(query_id, timestamp_ms)`.
pub fn exists(conn: &Connection, query_id: &QueryId, timestamp_ms: u64) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM no_stake_reports WHERE query_id = ?1 AND timestamp_ms = ?2",
        rusqlite::params![query_id.as_slice(), to_sql_u64(timestamp_ms)?],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Store a report and remember the query data it answers.
pub fn insert(conn: &Connection, report: &NoStakeMicroReport, query_data: &[u8]) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO no_stake_reports ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        rusqlite::params![
            report.reporter.as_str(),
            report.query_id.as_slice(),
            report.value,
            to_sql_u64(report.timestamp_ms)?,
            to_sql_u64(report.block_number)?,
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO no_stake_queries (query_id, query_data) VALUES (?1, ?2)",
        rusqlite::params![report.query_id.as_slice(), query_data],
    )?;
    Ok(())
}

fn collect(
    conn: &Connection,
    filter: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Vec<NoStakeMicroReport>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM no_stake_reports WHERE {filter} ORDER BY timestamp_ms ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map([param], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

pub fn by_reporter(conn: &Connection, reporter: &AccAddress) -> Result<Vec<NoStakeMicroReport>> {
    collect(conn, "reporter = ?1", &reporter.as_str())
}

pub fn by_query_id(conn: &Connection, query_id: &QueryId) -> Result<Vec<NoStakeMicroReport>> {
    collect(conn, "query_id = ?1", &query_id.as_slice())
}

/// The query data recorded for a no-stake query id.
pub fn query_data(conn: &Connection, query_id: &QueryId) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT query_data FROM no_stake_queries WHERE query_id = ?1",
        [query_id.as_slice()],
        |row| row.get(0),
    )
    .optional()
    .map_err(DbError::from)
}
