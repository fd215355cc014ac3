//! Integration test crate for the tally oracle.
//!
//! This crate has no library code. Its tests drive whole block sequences
//! through the keeper's public entry points (`begin_block`, `deliver`,
//! `end_block`) against the in-memory collaborators.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```
