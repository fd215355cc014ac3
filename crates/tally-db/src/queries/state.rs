//! Module-level key/value state: sequences, counters and dust.

use rusqlite::Connection;

use crate::{DbError, Result};

/// Global round id sequence.
pub const QUERY_SEQUENCER: &str = "query_sequencer";
/// Position of the in-turn query in the cycle list.
pub const CYCLE_INDEX: &str = "cycle_index";
/// Monotonic count of cycle-list wraps.
pub const CYCLE_COUNT: &str = "cycle_count";
/// Liveness rounding remainder carried between periods.
pub const DUST: &str = "dust";
/// Aggregates produced since genesis.
pub const TOTAL_AGGREGATES: &str = "total_aggregates";
/// Net tips received since genesis.
pub const TOTAL_TIPS: &str = "total_tips";
/// Cycle-list rounds aggregated in the current liveness period.
pub const TOTAL_QUERIES_IN_PERIOD: &str = "total_queries_in_period";
/// Block time of the last time-based reward mint.
pub const LAST_MINT_TIME_MS: &str = "last_mint_time_ms";

/// Get a value by key.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT value FROM state_kv WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .map_err(crate::not_found(format!("state '{key}'")))
}

/// Set a value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO state_kv (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Get a counter, treating a missing key as zero.
pub fn get_u64(conn: &Connection, key: &str) -> Result<u64> {
    match get(conn, key) {
        Ok(v) => v
            .parse()
            .map_err(|e: std::num::ParseIntError| DbError::Serialization(e.to_string())),
        Err(DbError::NotFound(_)) => Ok(0),
        Err(e) => Err(e),
    }
}

pub fn set_u64(conn: &Connection, key: &str, value: u64) -> Result<()> {
    set(conn, key, &value.to_string())
}

/// Get an amount, treating a missing key as zero.
pub fn get_u128(conn: &Connection, key: &str) -> Result<u128> {
    match get(conn, key) {
        Ok(v) => v
            .parse()
            .map_err(|e: std::num::ParseIntError| DbError::Serialization(e.to_string())),
        Err(DbError::NotFound(_)) => Ok(0),
        Err(e) => Err(e),
    }
}

pub fn set_u128(conn: &Connection, key: &str, value: u128) -> Result<()> {
    set(conn, key, &value.to_string())
}

/// Increment a counter and return the new value.
pub fn increment(conn: &Connection, key: &str) -> Result<u64> {
    let next = get_u64(conn, key)?
        .checked_add(1)
        .ok_or_else(|| DbError::Constraint(format!("counter '{key}' overflow")))?;
    set_u64(conn, key, next)?;
    Ok(next)
}

/// Return the current value of a sequence and advance it.
pub fn next_sequence(conn: &Connection, key: &str) -> Result<u64> {
    let current = get_u64(conn, key)?;
    let next = current
        .checked_add(1)
        .ok_or_else(|| DbError::Constraint(format!("sequence '{key}' overflow")))?;
    set_u64(conn, key, next)?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_missing_counter_is_zero() {
        let conn = test_db();
        assert_eq!(get_u64(&conn, "unset").expect("get"), 0);
        assert_eq!(get_u128(&conn, "unset").expect("get"), 0);
    }

    #[test]
    fn test_sequence_returns_then_advances() {
        let conn = test_db();
        assert_eq!(next_sequence(&conn, QUERY_SEQUENCER).expect("seq"), 0);
        assert_eq!(next_sequence(&conn, QUERY_SEQUENCER).expect("seq"), 1);
        assert_eq!(get_u64(&conn, QUERY_SEQUENCER).expect("get"), 2);
    }

    #[test]
    fn test_increment() {
        let conn = test_db();
        assert_eq!(increment(&conn, CYCLE_COUNT).expect("inc"), 1);
        assert_eq!(increment(&conn, CYCLE_COUNT).expect("inc"), 2);
    }

    #[test]
    fn test_u128_round_trip() {
        let conn = test_db();
        set_u128(&conn, DUST, u128::MAX).expect("set");
        assert_eq!(get_u128(&conn, DUST).expect("get"), u128::MAX);
    }

    #[test]
    fn test_corrupt_value_is_serialization_error() {
        let conn = test_db();
        set(&conn, DUST, "not-a-number").expect("set");
        assert!(matches!(
            get_u128(&conn, DUST),
            Err(DbError::Serialization(_))
        ));
    }
}
