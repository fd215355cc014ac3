//! Liveness-period bookkeeping and lifetime reporter statistics.
//!
//! Period tables (`liveness_records`, `query_opportunities`,
//! `reporter_queries_in_period`) are cleared by [`reset_period`]. Reporter
//! statistics and dust survive resets.

use rusqlite::{Connection, OptionalExtension};
use tally_types::{AccAddress, LivenessRecord, QueryId};

use crate::{
    address_col, amount_col, queries::state, query_id_col, to_sql_u64, u64_col, DbError, Result,
};

/// Count one more in-turn opportunity for a query.
pub fn increment_opportunities(conn: &Connection, query_id: &QueryId) -> Result<()> {
    conn.execute(
        "INSERT INTO query_opportunities (query_id, count) VALUES (?1, 1)
         ON CONFLICT(query_id) DO UPDATE SET count = count + 1",
        [query_id.as_slice()],
    )?;
    Ok(())
}

/// In-turn opportunities a query had this period.
pub fn opportunities(conn: &Connection, query_id: &QueryId) -> Result<u64> {
    conn.query_row(
        "SELECT count FROM query_opportunities WHERE query_id = ?1",
        [query_id.as_slice()],
        |row| u64_col(row, 0),
    )
    .optional()
    .map(|v| v.unwrap_or(0))
    .map_err(DbError::from)
}

/// Mark that a reporter answered a query this period, counting answers.
pub fn track_reporter_query(
    conn: &Connection,
    reporter: &AccAddress,
    query_id: &QueryId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO reporter_queries_in_period (reporter, query_id, count) VALUES (?1, ?2, 1)
         ON CONFLICT(reporter, query_id) DO UPDATE SET count = count + 1",
        rusqlite::params![reporter.as_str(), query_id.as_slice()],
    )?;
    Ok(())
}

/// Queries a reporter answered this period with their answer counts, ordered by query id.
pub fn reporter_queries(conn: &Connection, reporter: &AccAddress) -> Result<Vec<(QueryId, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT query_id, count FROM reporter_queries_in_period
         WHERE reporter = ?1 ORDER BY query_id ASC",
    )?;
    let rows = stmt.query_map([reporter.as_str()], |row| {
        Ok((query_id_col(row, 0)?, u64_col(row, 1)?))
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Add one report of `power` to a reporter's period record.
pub fn update_record(conn: &Connection, reporter: &AccAddress, power: u64) -> Result<()> {
    let mut record = record(conn, reporter)?.unwrap_or_default();
    record.queries_reported = record
        .queries_reported
        .checked_add(1)
        .ok_or_else(|| DbError::Constraint("queries_reported overflow".into()))?;
    record.accumulated_power = record
        .accumulated_power
        .checked_add(u128::from(power))
        .ok_or_else(|| DbError::Constraint("accumulated_power overflow".into()))?;
    conn.execute(
        "INSERT OR REPLACE INTO liveness_records (reporter, queries_reported, accumulated_power)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![
            reporter.as_str(),
            to_sql_u64(record.queries_reported)?,
            record.accumulated_power.to_string()
        ],
    )?;
    Ok(())
}

/// A reporter's record for the current period.
pub fn record(conn: &Connection, reporter: &AccAddress) -> Result<Option<LivenessRecord>> {
    conn.query_row(
        "SELECT queries_reported, accumulated_power FROM liveness_records WHERE reporter = ?1",
        [reporter.as_str()],
        |row| {
            Ok(LivenessRecord {
                queries_reported: u64_col(row, 0)?,
                accumulated_power: amount_col(row, 1)?,
            })
        },
    )
    .optional()
    .map_err(DbError::from)
}

/// Every record in the current period, ordered by reporter address.
pub fn records(conn: &Connection) -> Result<Vec<(AccAddress, LivenessRecord)>> {
    let mut stmt = conn.prepare(
        "SELECT reporter, queries_reported, accumulated_power FROM liveness_records
         ORDER BY reporter ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            address_col(row, 0)?,
            LivenessRecord {
                queries_reported: u64_col(row, 1)?,
                accumulated_power: amount_col(row, 2)?,
            },
        ))
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Clear every period-scoped table. Dust is untouched.
pub fn reset_period(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM liveness_records;
         DELETE FROM query_opportunities;
         DELETE FROM reporter_queries_in_period;",
    )?;
    state::set_u64(conn, state::TOTAL_QUERIES_IN_PERIOD, 0)
}

/// Count a report in the reporter's lifetime statistics.
pub fn record_report(conn: &Connection, reporter: &AccAddress, timestamp_ms: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO reporter_stats (reporter, reports, last_report_time_ms) VALUES (?1, 1, ?2)
         ON CONFLICT(reporter) DO UPDATE SET reports = reports + 1, last_report_time_ms = ?2",
        rusqlite::params![reporter.as_str(), to_sql_u64(timestamp_ms)?],
    )?;
    Ok(())
}

/// Lifetime `(reports, last_report_time_ms)` of a reporter.
pub fn reporter_stats(conn: &Connection, reporter: &AccAddress) -> Result<Option<(u64, u64)>> {
    conn.query_row(
        "SELECT reports, last_report_time_ms FROM reporter_stats WHERE reporter = ?1",
        [reporter.as_str()],
        |row| Ok((u64_col(row, 0)?, u64_col(row, 1)?)),
    )
    .optional()
    .map_err(DbError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> AccAddress {
        AccAddress::from_bytes("tally", &[n; 20]).expect("addr")
    }

    #[test]
    fn test_opportunities_and_tracking() {
        let conn = crate::open_memory().expect("open");
        increment_opportunities(&conn, &[1u8; 32]).expect("inc");
        increment_opportunities(&conn, &[1u8; 32]).expect("inc");
        assert_eq!(opportunities(&conn, &[1u8; 32]).expect("get"), 2);
        assert_eq!(opportunities(&conn, &[2u8; 32]).expect("get"), 0);

        track_reporter_query(&conn, &addr(1), &[1u8; 32]).expect("track");
        track_reporter_query(&conn, &addr(1), &[1u8; 32]).expect("track");
        track_reporter_query(&conn, &addr(1), &[2u8; 32]).expect("track");
        assert_eq!(
            reporter_queries(&conn, &addr(1)).expect("get"),
            vec![([1u8; 32], 2), ([2u8; 32], 1)]
        );
    }

    #[test]
    fn test_records_accumulate_and_reset() {
        let conn = crate::open_memory().expect("open");
        update_record(&conn, &addr(2), 10).expect("update");
        update_record(&conn, &addr(2), 5).expect("update");
        update_record(&conn, &addr(1), 7).expect("update");
        state::set_u128(&conn, state::DUST, 3).expect("dust");

        let all = records(&conn).expect("records");
        assert_eq!(all.len(), 2);
        let two = record(&conn, &addr(2)).expect("get").expect("present");
        assert_eq!(two.queries_reported, 2);
        assert_eq!(two.accumulated_power, 15);

        reset_period(&conn).expect("reset");
        assert!(records(&conn).expect("records").is_empty());
        assert_eq!(state::get_u128(&conn, state::DUST).expect("dust"), 3);
    }

    #[test]
    fn test_records_sorted_by_address() {
        let conn = crate::open_memory().expect("open");
        for n in [9u8, 3, 5] {
            update_record(&conn, &addr(n), 1).expect("update");
        }
        let order: Vec<_> = records(&conn)
            .expect("records")
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_reporter_stats_survive_reset() {
        let conn = crate::open_memory().expect("open");
        record_report(&conn, &addr(1), 100).expect("record");
        record_report(&conn, &addr(1), 200).expect("record");
        reset_period(&conn).expect("reset");
        assert_eq!(reporter_stats(&conn, &addr(1)).expect("get"), Some((2, 200)));
        assert!(reporter_stats(&conn, &addr(2)).expect("get").is_none());
    }
}
