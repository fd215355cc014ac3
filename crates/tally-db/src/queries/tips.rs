//! Cumulative tip bookkeeping.

use rusqlite::{Connection, OptionalExtension};
use tally_types::{AccAddress, QueryId};

use crate::{amount_col, queries::state, DbError, Result};

fn checked_add(current: u128, amount: u128) -> Result<u128> {
    current
        .checked_add(amount)
        .ok_or_else(|| DbError::Constraint("tip total overflow".into()))
}

/// Cumulative amount `tipper` has tipped on `query_id`.
pub fn get(conn: &Connection, query_id: &QueryId, tipper: &AccAddress) -> Result<u128> {
    conn.query_row(
        "SELECT amount FROM tips WHERE query_id = ?1 AND tipper = ?2",
        rusqlite::params![query_id.as_slice(), tipper.as_str()],
        |row| amount_col(row, 0),
    )
    .optional()
    .map(|v| v.unwrap_or(0))
    .map_err(DbError::from)
}

/// Cumulative amount `tipper` has tipped across all queries.
pub fn tipper_total(conn: &Connection, tipper: &AccAddress) -> Result<u128> {
    conn.query_row(
        "SELECT amount FROM tipper_totals WHERE tipper = ?1",
        [tipper.as_str()],
        |row| amount_col(row, 0),
    )
    .optional()
    .map(|v| v.unwrap_or(0))
    .map_err(DbError::from)
}

/// Net tips received since genesis.
pub fn total(conn: &Connection) -> Result<u128> {
    state::get_u128(conn, state::TOTAL_TIPS)
}

/// Record a net tip in the per-query, per-tipper and global totals.
pub fn record(
    conn: &Connection,
    query_id: &QueryId,
    tipper: &AccAddress,
    amount: u128,
) -> Result<()> {
    let per_query = checked_add(get(conn, query_id, tipper)?, amount)?;
    conn.execute(
        "INSERT OR REPLACE INTO tips (query_id, tipper, amount) VALUES (?1, ?2, ?3)",
        rusqlite::params![query_id.as_slice(), tipper.as_str(), per_query.to_string()],
    )?;

    let per_tipper = checked_add(tipper_total(conn, tipper)?, amount)?;
    conn.execute(
        "INSERT OR REPLACE INTO tipper_totals (tipper, amount) VALUES (?1, ?2)",
        rusqlite::params![tipper.as_str(), per_tipper.to_string()],
    )?;

    let global = checked_add(total(conn)?, amount)?;
    state::set_u128(conn, state::TOTAL_TIPS, global)
}
