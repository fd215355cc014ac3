//! Database query functions organized by domain.

pub mod aggregates;
pub mod commits;
pub mod cyclelist;
pub mod liveness;
pub mod no_stake;
pub mod params;
pub mod query_meta;
pub mod reports;
pub mod state;
pub mod tips;
