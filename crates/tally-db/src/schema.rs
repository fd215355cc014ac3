//! SQL schema definitions.

/// Complete schema for the v1 oracle database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Module state: sequences, counters, params, dust
-- ============================================================

CREATE TABLE IF NOT EXISTS state_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- ============================================================
-- Query lifecycle
-- ============================================================

CREATE TABLE IF NOT EXISTS query_meta (
    query_id BLOB PRIMARY KEY,
    id INTEGER NOT NULL UNIQUE,
    round INTEGER NOT NULL,
    amount TEXT NOT NULL,
    expiration INTEGER NOT NULL,
    report_buffer_window INTEGER NOT NULL,
    has_revealed_reports INTEGER NOT NULL DEFAULT 0,
    query_data BLOB NOT NULL,
    query_type TEXT NOT NULL,
    cycle_list INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_query_meta_revealed
    ON query_meta(has_revealed_reports, expiration);
CREATE INDEX IF NOT EXISTS idx_query_meta_type ON query_meta(query_type);

CREATE TABLE IF NOT EXISTS query_rounds (
    query_id BLOB PRIMARY KEY,
    last_round INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cyclelist (
    position INTEGER PRIMARY KEY,
    query_data BLOB NOT NULL
);

-- ============================================================
-- Reports
-- ============================================================

CREATE TABLE IF NOT EXISTS reports (
    query_id BLOB NOT NULL,
    reporter TEXT NOT NULL,
    meta_id INTEGER NOT NULL,
    power INTEGER NOT NULL,
    query_type TEXT NOT NULL,
    aggregate_method TEXT NOT NULL,
    value TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    cycle_list INTEGER NOT NULL,
    block_number INTEGER NOT NULL,
    PRIMARY KEY (query_id, reporter, meta_id)
);

CREATE INDEX IF NOT EXISTS idx_reports_meta ON reports(query_id, meta_id);
CREATE INDEX IF NOT EXISTS idx_reports_reporter ON reports(reporter, query_id);
CREATE INDEX IF NOT EXISTS idx_reports_height ON reports(block_number);

CREATE TABLE IF NOT EXISTS commits (
    reporter TEXT NOT NULL,
    meta_id INTEGER NOT NULL,
    query_id BLOB NOT NULL,
    hash TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    cycle_list INTEGER NOT NULL,
    PRIMARY KEY (reporter, meta_id)
);

CREATE TABLE IF NOT EXISTS no_stake_reports (
    query_id BLOB NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    reporter TEXT NOT NULL,
    value TEXT NOT NULL,
    block_number INTEGER NOT NULL,
    PRIMARY KEY (query_id, timestamp_ms)
);

CREATE INDEX IF NOT EXISTS idx_no_stake_reporter ON no_stake_reports(reporter);

CREATE TABLE IF NOT EXISTS no_stake_queries (
    query_id BLOB PRIMARY KEY,
    query_data BLOB NOT NULL
);

-- ============================================================
-- Aggregates
-- ============================================================

CREATE TABLE IF NOT EXISTS aggregates (
    query_id BLOB NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    aggregate_value TEXT NOT NULL,
    aggregate_reporter TEXT NOT NULL,
    aggregate_power INTEGER NOT NULL,
    reporter_power INTEGER NOT NULL,
    standard_deviation REAL NOT NULL,
    reporters TEXT NOT NULL,
    flagged INTEGER NOT NULL DEFAULT 0,
    idx INTEGER NOT NULL,
    aggregate_report_index INTEGER NOT NULL,
    height INTEGER NOT NULL,
    micro_height INTEGER NOT NULL,
    meta_id INTEGER NOT NULL,
    PRIMARY KEY (query_id, timestamp_ms)
);

CREATE INDEX IF NOT EXISTS idx_aggregates_height ON aggregates(height);
CREATE INDEX IF NOT EXISTS idx_aggregates_micro_height ON aggregates(micro_height);

-- ============================================================
-- Tips
-- ============================================================

CREATE TABLE IF NOT EXISTS tips (
    query_id BLOB NOT NULL,
    tipper TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (query_id, tipper)
);

CREATE TABLE IF NOT EXISTS tipper_totals (
    tipper TEXT PRIMARY KEY,
    amount TEXT NOT NULL
);

-- ============================================================
-- Liveness
-- ============================================================

CREATE TABLE IF NOT EXISTS liveness_records (
    reporter TEXT PRIMARY KEY,
    queries_reported INTEGER NOT NULL,
    accumulated_power TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS query_opportunities (
    query_id BLOB PRIMARY KEY,
    count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reporter_queries_in_period (
    reporter TEXT NOT NULL,
    query_id BLOB NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (reporter, query_id)
);

CREATE TABLE IF NOT EXISTS reporter_stats (
    reporter TEXT PRIMARY KEY,
    reports INTEGER NOT NULL,
    last_report_time_ms INTEGER NOT NULL
);
"#;
