//! Database migration system.
//!
//! Schema version stored in `PRAGMA user_version`. Migrations are forward-only;
//! rollback requires replaying the chain from genesis.

use rusqlite::Connection;
use tally_types::Params;

use crate::{queries, schema, DbError, Result, SCHEMA_VERSION};

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
    let current_version: u32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(DbError::Sqlite)?;

    if current_version == 0 {
        tracing::info!("Initializing oracle schema v{SCHEMA_VERSION}");
        conn.execute_batch(schema::SCHEMA_V1)
            .map_err(DbError::Sqlite)?;

        insert_default_state(conn)?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(DbError::Sqlite)?;
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            tracing::info!("Running migration to v{version}");
            run_migration(conn, version)?;
            conn.pragma_update(None, "user_version", version)
                .map_err(DbError::Sqlite)?;
        }
    } else if current_version > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {current_version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

/// Seed default params and zeroed counters.
fn insert_default_state(conn: &Connection) -> Result<()> {
    queries::params::set(conn, &Params::default())?;

    let counters = [
        queries::state::QUERY_SEQUENCER,
        queries::state::CYCLE_INDEX,
        queries::state::CYCLE_COUNT,
        queries::state::DUST,
        queries::state::TOTAL_AGGREGATES,
        queries::state::TOTAL_TIPS,
        queries::state::TOTAL_QUERIES_IN_PERIOD,
    ];
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO state_kv (key, value) VALUES (?1, '0')")
        .map_err(DbError::Sqlite)?;
    for key in &counters {
        stmt.execute([key]).map_err(DbError::Sqlite)?;
    }

    Ok(())
}

fn run_migration(_conn: &Connection, version: u32) -> Result<()> {
    Err(DbError::Migration(format!(
        "Unknown migration version: {version}"
    )))
}
