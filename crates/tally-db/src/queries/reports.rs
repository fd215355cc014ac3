//! Micro reports, one per reporter per round.
//!
//! Reports are immutable once stored. Reads return them in submission order
//! (SQLite rowid), which the aggregation strategies rely on for stable
//! tie-breaking.

use rusqlite::{Connection, Row};
use tally_types::{AccAddress, MicroReport, QueryId};

use crate::{address_col, query_id_col, to_sql_u64, u64_col, DbError, Result};

const COLUMNS: &str = "reporter, power, query_type, query_id, aggregate_method, value, \
                       timestamp_ms, cycle_list, block_number, meta_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<MicroReport> {
    Ok(MicroReport {
        reporter: address_col(row, 0)?,
        power: u64_col(row, 1)?,
        query_type: row.get(2)?,
        query_id: query_id_col(row, 3)?,
        aggregate_method: row.get(4)?,
        value: row.get(5)?,
        timestamp_ms: u64_col(row, 6)?,
        cycle_list: row.get(7)?,
        block_number: u64_col(row, 8)?,
        meta_id: u64_col(row, 9)?,
    })
}

/// Store a report.
///
/// # Errors
///
/// Returns [`DbError::Constraint`] if the reporter already reported for
/// this round.
pub fn insert(conn: &Connection, report: &MicroReport) -> Result<()> {
    if exists(conn, &report.query_id, &report.reporter, report.meta_id)? {
        return Err(DbError::Constraint(format!(
            "reporter {} already reported for round {}",
            report.reporter, report.meta_id
        )));
    }
    conn.execute(
        &format!(
            "INSERT INTO reports ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        rusqlite::params![
            report.reporter.as_str(),
            to_sql_u64(report.power)?,
            report.query_type,
            report.query_id.as_slice(),
            report.aggregate_method,
            report.value,
            to_sql_u64(report.timestamp_ms)?,
            report.cycle_list,
            to_sql_u64(report.block_number)?,
            to_sql_u64(report.meta_id)?,
        ],
    )?;
    Ok(())
}

/// Whether `(query_id, reporter, meta_id)` already has a report.
pub fn exists(
    conn: &Connection,
    query_id: &QueryId,
    reporter: &AccAddress,
    meta_id: u64,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reports WHERE query_id = ?1 AND reporter = ?2 AND meta_id = ?3",
        rusqlite::params![query_id.as_slice(), reporter.as_str(), to_sql_u64(meta_id)?],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn collect(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<MicroReport>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM reports WHERE {filter} ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map(params, from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Every report of one round, in submission order.
pub fn by_meta(conn: &Connection, query_id: &QueryId, meta_id: u64) -> Result<Vec<MicroReport>> {
    collect(
        conn,
        "query_id = ?1 AND meta_id = ?2",
        rusqlite::params![query_id.as_slice(), to_sql_u64(meta_id)?],
    )
}

/// Every report for a query across all rounds.
pub fn by_query_id(conn: &Connection, query_id: &QueryId) -> Result<Vec<MicroReport>> {
    collect(conn, "query_id = ?1", [query_id.as_slice()])
}

/// Every report submitted by a reporter.
pub fn by_reporter(conn: &Connection, reporter: &AccAddress) -> Result<Vec<MicroReport>> {
    collect(conn, "reporter = ?1", [reporter.as_str()])
}

/// A reporter's reports for one query.
pub fn by_reporter_and_query(
    conn: &Connection,
    reporter: &AccAddress,
    query_id: &QueryId,
) -> Result<Vec<MicroReport>> {
    collect(
        conn,
        "reporter = ?1 AND query_id = ?2",
        rusqlite::params![reporter.as_str(), query_id.as_slice()],
    )
}

/// Reports included in a block.
pub fn by_height(conn: &Connection, height: u64) -> Result<Vec<MicroReport>> {
    collect(conn, "block_number = ?1", [to_sql_u64(height)?])
}
