//! Persisted module parameters.

use rusqlite::Connection;
use tally_types::Params;

use crate::{queries::state, DbError, Result};

const PARAMS_KEY: &str = "params";

/// Load the module params, falling back to defaults if none are stored.
pub fn get(conn: &Connection) -> Result<Params> {
    match state::get(conn, PARAMS_KEY) {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| DbError::Serialization(e.to_string()))
        }
        Err(DbError::NotFound(_)) => Ok(Params::default()),
        Err(e) => Err(e),
    }
}

/// Validate and store the module params.
pub fn set(conn: &Connection, params: &Params) -> Result<()> {
    params
        .validate()
        .map_err(|e| DbError::Constraint(e.to_string()))?;
    let json = serde_json::to_string(params).map_err(|e| DbError::Serialization(e.to_string()))?;
    state::set(conn, PARAMS_KEY, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let conn = crate::open_memory().expect("open");
        let params = Params {
            max_batch_size: 5,
            ..Params::default()
        };
        set(&conn, &params).expect("set");
        assert_eq!(get(&conn).expect("get").max_batch_size, 5);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let conn = crate::open_memory().expect("open");
        let params = Params {
            liveness_cycles: 0,
            ..Params::default()
        };
        assert!(matches!(set(&conn, &params), Err(DbError::Constraint(_))));
        assert_eq!(get(&conn).expect("get"), Params::default());
    }
}
