//! Token-bridge deposit rounds.
//!
//! Deposits into this chain are reported like any other query but never
//! need a tip: the first report on an unclaimed deposit opens a round on
//! the fly. Withdrawal queries are refused so reporters cannot front-run
//! withdrawal proofs.

use tally_types::query_data::{self, BridgeQuery};
use tally_types::{Params, QueryMeta};

use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

impl Keeper {
    /// Classify query data for the bridge rules.
    ///
    /// Returns `true` for a reportable deposit and `false` for any other
    /// query type.
    ///
    /// # Errors
    ///
    /// [`OracleError::BridgeWithdrawalReport`] for a withdrawal,
    /// [`OracleError::DepositAlreadyClaimed`] for a claimed deposit and
    /// [`OracleError::InvalidQueryData`] if the data does not decode.
    pub(crate) fn bridge_deposit(&self, data: &[u8]) -> Result<bool> {
        let Some(BridgeQuery {
            to_layer,
            deposit_id,
        }) = query_data::decode_bridge(data)?
        else {
            return Ok(false);
        };
        if !to_layer {
            return Err(OracleError::BridgeWithdrawalReport);
        }
        if self.bridge.deposit_claimed(deposit_id)? {
            return Err(OracleError::DepositAlreadyClaimed(deposit_id.to_string()));
        }
        Ok(true)
    }

    /// A new, unsaved round for a bridge deposit.
    ///
    /// Deposit rounds carry no tip, stay open for `bridge_deposit_window`
    /// blocks and count as cycle-list rounds for liveness.
    pub(crate) fn token_bridge_deposit_query(
        &self,
        ctx: &BlockContext,
        data: &[u8],
        params: &Params,
    ) -> Result<QueryMeta> {
        let mut meta = self.initialize_query(ctx, data, params.bridge_deposit_window)?;
        meta.cycle_list = true;
        tracing::debug!(
            meta_id = meta.id,
            expiration = meta.expiration,
            "bridge deposit round opened"
        );
        Ok(meta)
    }
}
