//! Message handlers.
//!
//! [`Keeper::deliver`] is the single entry point for transactions. Each
//! message runs inside its own savepoint, so a rejected message leaves no
//! writes and no events behind.

use serde::{Deserialize, Serialize};
use tally_types::{query_data, OracleEvent, Params};

use crate::keeper::{BlockContext, Keeper};
use crate::submit::BatchItem;
use crate::{OracleError, Result};

/// Inbound oracle messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleMsg {
    /// Direct report, or the reveal of a commitment when `salt` is set.
    SubmitValue {
        creator: String,
        query_data: Vec<u8>,
        value: String,
        salt: Option<String>,
    },
    BatchSubmitValue {
        creator: String,
        values: Vec<BatchItem>,
    },
    Tip {
        tipper: String,
        query_data: Vec<u8>,
        amount: u128,
    },
    CommitReport {
        creator: String,
        query_data: Vec<u8>,
        hash: String,
    },
    NoStakeReport {
        creator: String,
        query_data: Vec<u8>,
        value: String,
    },
    UpdateCyclelist {
        authority: String,
        cyclelist: Vec<Vec<u8>>,
    },
    UpdateQueryDataLimit {
        authority: String,
        limit: u64,
    },
    UpdateMaxBatchSize {
        authority: String,
        max_batch_size: u32,
    },
}

impl OracleMsg {
    /// Message name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitValue { .. } => "submit_value",
            Self::BatchSubmitValue { .. } => "batch_submit_value",
            Self::Tip { .. } => "tip",
            Self::CommitReport { .. } => "commit_report",
            Self::NoStakeReport { .. } => "no_stake_report",
            Self::UpdateCyclelist { .. } => "update_cyclelist",
            Self::UpdateQueryDataLimit { .. } => "update_query_data_limit",
            Self::UpdateMaxBatchSize { .. } => "update_max_batch_size",
        }
    }
}

/// Handler result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleMsgResponse {
    Empty,
    BatchSubmitValue { failed_indices: Vec<u32> },
}

impl Keeper {
    /// Execute one message, all or nothing.
    ///
    /// # Errors
    ///
    /// Whatever the handler rejects the message with. Nothing the message
    /// wrote is kept in that case.
    pub fn deliver(&self, ctx: &BlockContext, msg: &OracleMsg) -> Result<OracleMsgResponse> {
        let result = self.atomic("msg", || self.dispatch(ctx, msg));
        if let Err(e) = &result {
            tracing::debug!(msg = msg.name(), error = %e, "message rejected");
        }
        result
    }

    fn dispatch(&self, ctx: &BlockContext, msg: &OracleMsg) -> Result<OracleMsgResponse> {
        match msg {
            OracleMsg::SubmitValue {
                creator,
                query_data,
                value,
                salt,
            } => {
                self.submit_value(ctx, creator, query_data, value, salt.as_deref())?;
            }
            OracleMsg::BatchSubmitValue { creator, values } => {
                let failed_indices = self.batch_submit_value(ctx, creator, values)?;
                return Ok(OracleMsgResponse::BatchSubmitValue { failed_indices });
            }
            OracleMsg::Tip {
                tipper,
                query_data,
                amount,
            } => {
                self.tip(ctx, tipper, query_data, *amount)?;
            }
            OracleMsg::CommitReport {
                creator,
                query_data,
                hash,
            } => {
                self.commit_report(ctx, creator, query_data, hash)?;
            }
            OracleMsg::NoStakeReport {
                creator,
                query_data,
                value,
            } => {
                self.no_stake_report(ctx, creator, query_data, value)?;
            }
            OracleMsg::UpdateCyclelist {
                authority,
                cyclelist,
            } => self.update_cyclelist(authority, cyclelist)?,
            OracleMsg::UpdateQueryDataLimit { authority, limit } => {
                self.update_params(authority, "query_data_limit", limit.to_string(), |p| {
                    p.query_data_limit = *limit;
                })?;
            }
            OracleMsg::UpdateMaxBatchSize {
                authority,
                max_batch_size,
            } => {
                self.update_params(authority, "max_batch_size", max_batch_size.to_string(), |p| {
                    p.max_batch_size = *max_batch_size;
                })?;
            }
        }
        Ok(OracleMsgResponse::Empty)
    }

    fn check_authority(&self, signer: &str) -> Result<()> {
        if signer != self.config.authority.as_str() {
            return Err(OracleError::InvalidSigner {
                expected: self.config.authority.to_string(),
                got: signer.to_string(),
            });
        }
        Ok(())
    }

    /// Replace the cycle list after checking every entry decodes under its spec.
    fn update_cyclelist(&self, authority: &str, queries: &[Vec<u8>]) -> Result<()> {
        self.check_authority(authority)?;
        if queries.is_empty() {
            return Err(OracleError::EmptyCyclelist);
        }
        for data in queries {
            let (_, params) = query_data::decode(data)?;
            let (_, spec) = self.data_spec(data)?;
            spec.decode_params(&params)?;
        }
        self.set_cyclelist(queries)
    }

    fn update_params(
        &self,
        authority: &str,
        field: &str,
        value: String,
        apply: impl FnOnce(&mut Params),
    ) -> Result<()> {
        self.check_authority(authority)?;
        let mut params = self.params()?;
        apply(&mut params);
        params.validate()?;
        tally_db::queries::params::set(&self.conn, &params)?;
        tracing::info!(field, value = %value, "params updated");
        self.emit(OracleEvent::ParamsUpdated {
            field: field.to_string(),
            value,
        });
        Ok(())
    }
}
