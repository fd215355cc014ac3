//! Commit-reveal commitments, keyed by `(reporter, meta_id)`.

use rusqlite::{Connection, OptionalExtension};
use tally_types::{AccAddress, Commitment};

use crate::{address_col, query_id_col, to_sql_u64, u64_col, DbError, Result};

/// Store a commitment, replacing an earlier one for the same round.
pub fn set(conn: &Connection, commit: &Commitment) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO commits (reporter, meta_id, query_id, hash, block_number, cycle_list)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            commit.reporter.as_str(),
            to_sql_u64(commit.meta_id)?,
            commit.query_id.as_slice(),
            commit.hash,
            to_sql_u64(commit.block_number)?,
            commit.cycle_list,
        ],
    )?;
    Ok(())
}

/// The commitment a reporter made for a round.
pub fn get(conn: &Connection, reporter: &AccAddress, meta_id: u64) -> Result<Option<Commitment>> {
    conn.query_row(
        "SELECT reporter, meta_id, query_id, hash, block_number, cycle_list
         FROM commits WHERE reporter = ?1 AND meta_id = ?2",
        rusqlite::params![reporter.as_str(), to_sql_u64(meta_id)?],
        |row| {
            Ok(Commitment {
                reporter: address_col(row, 0)?,
                meta_id: u64_col(row, 1)?,
                query_id: query_id_col(row, 2)?,
                hash: row.get(3)?,
                block_number: u64_col(row, 4)?,
                cycle_list: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(DbError::from)
}

/// Remove a commitment once revealed.
pub fn delete(conn: &Connection, reporter: &AccAddress, meta_id: u64) -> Result<()> {
    conn.execute(
        "DELETE FROM commits WHERE reporter = ?1 AND meta_id = ?2",
        rusqlite::params![reporter.as_str(), to_sql_u64(meta_id)?],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let conn = crate::open_memory().expect("open");
        let reporter = AccAddress::from_bytes("tally", &[1u8; 20]).expect("addr");
        let commit = Commitment {
            reporter: reporter.clone(),
            query_id: [4u8; 32],
            meta_id: 3,
            hash: "ab".into(),
            block_number: 8,
            cycle_list: true,
        };
        set(&conn, &commit).expect("set");
        assert_eq!(get(&conn, &reporter, 3).expect("get"), Some(commit));
        assert!(get(&conn, &reporter, 4).expect("get").is_none());
        delete(&conn, &reporter, 3).expect("delete");
        assert!(get(&conn, &reporter, 3).expect("get").is_none());
    }
}
