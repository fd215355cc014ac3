//! The ordered cycle list of always-on queries.

use rusqlite::{Connection, OptionalExtension};

use crate::{to_sql_u64, DbError, Result};

/// Replace the whole list.
pub fn replace(conn: &Connection, queries: &[Vec<u8>]) -> Result<()> {
    conn.execute("DELETE FROM cyclelist", [])?;
    let mut stmt = conn.prepare("INSERT INTO cyclelist (position, query_data) VALUES (?1, ?2)")?;
    for (position, query_data) in queries.iter().enumerate() {
        let position = i64::try_from(position).map_err(|e| DbError::Constraint(e.to_string()))?;
        stmt.execute(rusqlite::params![position, query_data])?;
    }
    Ok(())
}

/// The whole list in order.
pub fn all(conn: &Connection) -> Result<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare("SELECT query_data FROM cyclelist ORDER BY position ASC")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(DbError::from)
}

/// Number of entries.
pub fn len(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM cyclelist", [], |row| row.get(0))?;
    u64::try_from(n).map_err(|e| DbError::Serialization(e.to_string()))
}

/// The entry at `position`, if any.
pub fn at(conn: &Connection, position: u64) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT query_data FROM cyclelist WHERE position = ?1",
        [to_sql_u64(position)?],
        |row| row.get(0),
    )
    .optional()
    .map_err(DbError::from)
}
