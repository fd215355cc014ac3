//! Open query rounds.
//!
//! At most one round is open per query id. A closed round's row is deleted;
//! its reports and aggregate stay behind, keyed by the round's meta id.

use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{QueryId, QueryMeta};

use crate::{amount_col, query_id_col, to_sql_u64, u64_col, DbError, Result};

const COLUMNS: &str = "id, round, query_id, amount, expiration, report_buffer_window, \
                       has_revealed_reports, query_data, query_type, cycle_list";

fn from_row(row: &Row<'_>) -> rusqlite::Result<QueryMeta> {
    Ok(QueryMeta {
        id: u64_col(row, 0)?,
        round: u64_col(row, 1)?,
        query_id: query_id_col(row, 2)?,
        amount: amount_col(row, 3)?,
        expiration: u64_col(row, 4)?,
        report_buffer_window: u64_col(row, 5)?,
        has_revealed_reports: row.get(6)?,
        query_data: row.get(7)?,
        query_type: row.get(8)?,
        cycle_list: row.get(9)?,
    })
}

/// Insert or overwrite the open round of a query.
pub fn set(conn: &Connection, meta: &QueryMeta) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO query_meta ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        rusqlite::params![
            to_sql_u64(meta.id)?,
            to_sql_u64(meta.round)?,
            meta.query_id.as_slice(),
            meta.amount.to_string(),
            to_sql_u64(meta.expiration)?,
            to_sql_u64(meta.report_buffer_window)?,
            meta.has_revealed_reports,
            meta.query_data,
            meta.query_type,
            meta.cycle_list,
        ],
    )?;
    Ok(())
}

/// The open round of a query, if any.
pub fn find(conn: &Connection, query_id: &QueryId) -> Result<Option<QueryMeta>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM query_meta WHERE query_id = ?1"),
        [query_id.as_slice()],
        from_row,
    )
    .optional()
    .map_err(DbError::from)
}

/// The open round of a query.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the query has no open round.
pub fn get(conn: &Connection, query_id: &QueryId) -> Result<QueryMeta> {
    find(conn, query_id)?
        .ok_or_else(|| DbError::NotFound(format!("query meta {}", hex_id(query_id))))
}

/// Close a round by removing its row.
pub fn delete(conn: &Connection, query_id: &QueryId) -> Result<()> {
    conn.execute(
        "DELETE FROM query_meta WHERE query_id = ?1",
        [query_id.as_slice()],
    )?;
    Ok(())
}

/// Rounds with revealed reports whose window ended before `height`, oldest first.
pub fn expired_with_reports(conn: &Connection, height: u64) -> Result<Vec<QueryMeta>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM query_meta
         WHERE has_revealed_reports = 1 AND expiration < ?1
         ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([to_sql_u64(height)?], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Open rounds for a query type.
pub fn by_type(conn: &Connection, query_type: &str) -> Result<Vec<QueryMeta>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM query_meta WHERE query_type = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([query_type], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Open rounds carrying a non-zero tip.
pub fn tipped(conn: &Connection) -> Result<Vec<QueryMeta>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM query_meta WHERE amount != '0' ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Advance and return the per-query round counter.
pub fn next_round(conn: &Connection, query_id: &QueryId) -> Result<u64> {
    let last: Option<i64> = conn
        .query_row(
            "SELECT last_round FROM query_rounds WHERE query_id = ?1",
            [query_id.as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    let next = last.unwrap_or(0) + 1;
    conn.execute(
        "INSERT OR REPLACE INTO query_rounds (query_id, last_round) VALUES (?1, ?2)",
        rusqlite::params![query_id.as_slice(), next],
    )?;
    u64::try_from(next).map_err(|e| DbError::Serialization(e.to_string()))
}

fn hex_id(query_id: &QueryId) -> String {
    tally_types::query_id_hex(query_id)
}
