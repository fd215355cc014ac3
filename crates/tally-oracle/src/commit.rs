//! Commit-reveal reporting.
//!
//! A reporter first commits `keccak256(value || salt)` for the open round,
//! then reveals value and salt through `SubmitValue`. The reveal is checked
//! against the commitment and must land by `expiration + reveal_offset`.

use alloy_primitives::keccak256;
use tally_db::queries::commits;
use tally_types::registry::decode_hex_value;
use tally_types::{
    query_data, query_id_hex, strip_hex_prefix, Commitment, MicroReport, OracleEvent, Params,
};

use crate::keeper::{BlockContext, Keeper};
use crate::submit::EligibleReporter;
use crate::{OracleError, Result};

/// Hex commitment of a hex value and a hex salt.
///
/// # Errors
///
/// [`OracleError::InvalidValue`] if either input is not hex.
pub fn commitment_hash(value: &str, salt: &str) -> Result<String> {
    let mut preimage = decode_hex_value(value)?;
    preimage.extend(decode_hex_value(salt)?);
    Ok(hex::encode(keccak256(&preimage)))
}

impl Keeper {
    /// Commit to a value for the open round of a query.
    ///
    /// # Errors
    ///
    /// Stake and jail checks as for submission, plus
    /// [`OracleError::NoTipsNotInCycle`] without an open round,
    /// [`OracleError::SubmissionWindowExpired`] once the round expired and
    /// [`OracleError::AlreadyReported`] for a second commitment.
    pub fn commit_report(
        &self,
        ctx: &BlockContext,
        creator: &str,
        data: &[u8],
        hash: &str,
    ) -> Result<Commitment> {
        let address = self.parse_address(creator)?;
        let params = self.params()?;
        let reporter = self.eligible_reporter(address, &params)?;
        if self.reporters.is_jailed(&reporter.address)? {
            return Err(OracleError::ReporterJailed(reporter.address.to_string()));
        }
        self.check_query_data(data, &params)?;
        let hash = strip_hex_prefix(hash.trim()).to_lowercase();
        if hash.is_empty() {
            return Err(OracleError::EmptyValue);
        }

        let deposit = self.bridge_deposit(data)?;
        let meta = match self.current_query(&query_data::query_id(data))? {
            Some(meta) => meta,
            None if deposit => {
                let meta = self.token_bridge_deposit_query(ctx, data, &params)?;
                self.save_query(&meta)?;
                meta
            }
            None => return Err(OracleError::NoTipsNotInCycle),
        };
        if meta.is_expired(ctx.height) {
            return Err(if meta.amount == 0 {
                OracleError::NoTipsNotInCycle
            } else {
                OracleError::SubmissionWindowExpired
            });
        }
        if commits::get(&self.conn, &reporter.address, meta.id)?.is_some() {
            return Err(OracleError::AlreadyReported {
                reporter: reporter.address.to_string(),
                meta_id: meta.id,
            });
        }

        let commit = Commitment {
            reporter: reporter.address.clone(),
            query_id: meta.query_id,
            meta_id: meta.id,
            hash,
            block_number: ctx.height,
            cycle_list: self.is_in_turn(data)? || meta.amount == 0,
        };
        commits::set(&self.conn, &commit)?;

        tracing::debug!(
            reporter = %commit.reporter,
            query_id = %query_id_hex(&commit.query_id),
            meta_id = commit.meta_id,
            "commitment stored"
        );
        self.emit(OracleEvent::CommitReport {
            reporter: commit.reporter.to_string(),
            query_id: query_id_hex(&commit.query_id),
            meta_id: commit.meta_id,
        });
        Ok(commit)
    }

    /// Reveal a committed value into the round it was committed for.
    pub(crate) fn reveal_commitment(
        &self,
        ctx: &BlockContext,
        reporter: &EligibleReporter,
        data: &[u8],
        value: &str,
        salt: &str,
        params: &Params,
    ) -> Result<MicroReport> {
        self.check_query_data(data, params)?;
        if strip_hex_prefix(value.trim()).is_empty() {
            return Err(OracleError::EmptyValue);
        }
        let query_id = query_data::query_id(data);
        let meta = self.current_query(&query_id)?.ok_or_else(|| {
            OracleError::NotFound(format!("open round for query {}", query_id_hex(&query_id)))
        })?;
        let commit = commits::get(&self.conn, &reporter.address, meta.id)?.ok_or_else(|| {
            OracleError::NoCommitment {
                reporter: reporter.address.to_string(),
                meta_id: meta.id,
            }
        })?;

        let deadline = meta
            .expiration
            .checked_add(params.reveal_offset)
            .ok_or(OracleError::Overflow)?;
        if ctx.height > deadline {
            return Err(OracleError::MissedRevealWindow {
                height: ctx.height,
                deadline,
            });
        }
        if commitment_hash(value, salt)? != commit.hash {
            return Err(OracleError::CommitmentMismatch);
        }

        commits::delete(&self.conn, &reporter.address, meta.id)?;
        self.set_value(ctx, &reporter.address, meta, value, reporter.power, commit.cycle_list)
    }
}
