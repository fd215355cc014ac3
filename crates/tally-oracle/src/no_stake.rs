//! Permissionless reports.
//!
//! Anyone may post a value for any query without stake. These reports are
//! stored for reference only: they carry no power, never join a round and
//! are never aggregated or rewarded. At most one report per query is kept
//! per block time.

use tally_db::queries::no_stake;
use tally_types::{query_data, query_id_hex, strip_hex_prefix, NoStakeMicroReport, OracleEvent};

use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

impl Keeper {
    /// Store an unweighted report at the block time.
    ///
    /// # Errors
    ///
    /// Validation errors for the address, query data and value, and
    /// [`OracleError::NoStakeReportExists`] if the query already has a
    /// report at this block time.
    pub fn no_stake_report(
        &self,
        ctx: &BlockContext,
        creator: &str,
        data: &[u8],
        value: &str,
    ) -> Result<NoStakeMicroReport> {
        let reporter = self.parse_address(creator)?;
        let params = self.params()?;
        self.check_query_data(data, &params)?;
        let value = strip_hex_prefix(value.trim()).to_lowercase();
        if value.is_empty() {
            return Err(OracleError::EmptyValue);
        }

        let query_id = query_data::query_id(data);
        if no_stake::exists(&self.conn, &query_id, ctx.time_ms)? {
            return Err(OracleError::NoStakeReportExists);
        }
        let report = NoStakeMicroReport {
            reporter,
            query_id,
            value,
            timestamp_ms: ctx.time_ms,
            block_number: ctx.height,
        };
        no_stake::insert(&self.conn, &report, data)?;

        tracing::debug!(
            reporter = %report.reporter,
            query_id = %query_id_hex(&query_id),
            timestamp_ms = report.timestamp_ms,
            "no-stake report stored"
        );
        self.emit(OracleEvent::NoStakeReport {
            reporter: report.reporter.to_string(),
            query_id: query_id_hex(&query_id),
            value: report.value.clone(),
            timestamp_ms: report.timestamp_ms,
        });
        Ok(report)
    }
}
