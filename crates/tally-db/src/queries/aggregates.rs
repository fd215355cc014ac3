//! Aggregates, keyed by `(query_id, timestamp_ms)`.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use tally_types::{Aggregate, AggregateReporter, QueryId};

use crate::{address_col, query_id_col, to_sql_u64, u64_col, DbError, Result};

const COLUMNS: &str = "query_id, timestamp_ms, aggregate_value, aggregate_reporter, \
                       aggregate_power, reporter_power, standard_deviation, reporters, flagged, \
                       idx, aggregate_report_index, height, micro_height, meta_id";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Aggregate> {
    let reporters_json: String = row.get(7)?;
    let reporters: Vec<AggregateReporter> = serde_json::from_str(&reporters_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(Aggregate {
        query_id: query_id_col(row, 0)?,
        timestamp_ms: u64_col(row, 1)?,
        aggregate_value: row.get(2)?,
        aggregate_reporter: address_col(row, 3)?,
        aggregate_power: u64_col(row, 4)?,
        reporter_power: u64_col(row, 5)?,
        standard_deviation: row.get(6)?,
        reporters,
        flagged: row.get(8)?,
        index: u64_col(row, 9)?,
        aggregate_report_index: u64_col(row, 10)?,
        height: u64_col(row, 11)?,
        micro_height: u64_col(row, 12)?,
        meta_id: u64_col(row, 13)?,
    })
}

/// Store a new aggregate.
pub fn insert(conn: &Connection, aggregate: &Aggregate) -> Result<()> {
    let reporters = serde_json::to_string(&aggregate.reporters)
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        &format!(
            "INSERT INTO aggregates ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ),
        rusqlite::params![
            aggregate.query_id.as_slice(),
            to_sql_u64(aggregate.timestamp_ms)?,
            aggregate.aggregate_value,
            aggregate.aggregate_reporter.as_str(),
            to_sql_u64(aggregate.aggregate_power)?,
            to_sql_u64(aggregate.reporter_power)?,
            aggregate.standard_deviation,
            reporters,
            aggregate.flagged,
            to_sql_u64(aggregate.index)?,
            to_sql_u64(aggregate.aggregate_report_index)?,
            to_sql_u64(aggregate.height)?,
            to_sql_u64(aggregate.micro_height)?,
            to_sql_u64(aggregate.meta_id)?,
        ],
    )?;
    Ok(())
}

fn query_one(
    conn: &Connection,
    tail: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Aggregate>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM aggregates WHERE {tail} LIMIT 1"),
        params,
        from_row,
    )
    .optional()
    .map_err(DbError::from)
}

/// The aggregate for a query at an exact timestamp.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no aggregate exists at that timestamp.
pub fn get(conn: &Connection, query_id: &QueryId, timestamp_ms: u64) -> Result<Aggregate> {
    query_one(
        conn,
        "query_id = ?1 AND timestamp_ms = ?2",
        rusqlite::params![query_id.as_slice(), to_sql_u64(timestamp_ms)?],
    )?
    .ok_or_else(|| {
        DbError::NotFound(format!(
            "aggregate {} at {timestamp_ms}",
            tally_types::query_id_hex(query_id)
        ))
    })
}

/// The most recent aggregate for a query, flagged or not.
pub fn latest(conn: &Connection, query_id: &QueryId) -> Result<Option<Aggregate>> {
    query_one(
        conn,
        "query_id = ?1 ORDER BY timestamp_ms DESC",
        [query_id.as_slice()],
    )
}

/// The newest unflagged aggregate strictly before `timestamp_ms`.
pub fn before(
    conn: &Connection,
    query_id: &QueryId,
    timestamp_ms: u64,
) -> Result<Option<Aggregate>> {
    query_one(
        conn,
        "query_id = ?1 AND timestamp_ms < ?2 AND flagged = 0 ORDER BY timestamp_ms DESC",
        rusqlite::params![query_id.as_slice(), to_sql_u64(timestamp_ms)?],
    )
}

/// The oldest unflagged aggregate strictly after `timestamp_ms`.
pub fn after(
    conn: &Connection,
    query_id: &QueryId,
    timestamp_ms: u64,
) -> Result<Option<Aggregate>> {
    query_one(
        conn,
        "query_id = ?1 AND timestamp_ms > ?2 AND flagged = 0 ORDER BY timestamp_ms ASC",
        rusqlite::params![query_id.as_slice(), to_sql_u64(timestamp_ms)?],
    )
}

fn collect(conn: &Connection, column: &str, value: u64) -> Result<Vec<Aggregate>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM aggregates WHERE {column} = ?1 ORDER BY rowid ASC"
    ))?;
    let rows = stmt.query_map([to_sql_u64(value)?], from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Aggregates created in a block.
pub fn by_height(conn: &Connection, height: u64) -> Result<Vec<Aggregate>> {
    collect(conn, "height", height)
}

/// Aggregates whose newest report landed in a block.
pub fn by_micro_height(conn: &Connection, micro_height: u64) -> Result<Vec<Aggregate>> {
    collect(conn, "micro_height", micro_height)
}

/// Number of aggregates stored for a query.
pub fn count(conn: &Connection, query_id: &QueryId) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM aggregates WHERE query_id = ?1",
        [query_id.as_slice()],
        |row| row.get(0),
    )?;
    u64::try_from(n).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Mark an aggregate as disputed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the aggregate does not exist.
pub fn set_flagged(conn: &Connection, query_id: &QueryId, timestamp_ms: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE aggregates SET flagged = 1 WHERE query_id = ?1 AND timestamp_ms = ?2",
        rusqlite::params![query_id.as_slice(), to_sql_u64(timestamp_ms)?],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!(
            "aggregate {} at {timestamp_ms}",
            tally_types::query_id_hex(query_id)
        )));
    }
    Ok(())
}
