//! Tipping.
//!
//! A tip funds the open round of a query, opening one when needed. The
//! tipper pays the oracle module, `tip_burn_percent` of the tip is burned
//! and the net amount is paid out to the round's reporters when the round
//! is aggregated.

use tally_db::queries::tips;
use tally_types::{query_data, query_id_hex, OracleEvent, QueryMeta, ORACLE_MODULE};

use crate::keeper::{BlockContext, Keeper};
use crate::{OracleError, Result};

/// Split a tip into `(burned, net)`.
///
/// # Errors
///
/// [`OracleError::Overflow`] if the burn share does not fit.
pub fn split_tip(amount: u128, burn_percent: u8) -> Result<(u128, u128)> {
    let burned = amount
        .checked_mul(u128::from(burn_percent))
        .ok_or(OracleError::Overflow)?
        / 100;
    Ok((burned, amount - burned))
}

impl Keeper {
    /// Add a tip to the open round of `data`.
    ///
    /// Returns the round after the tip was applied.
    ///
    /// # Errors
    ///
    /// [`OracleError::ZeroTip`], query-data validation errors,
    /// [`OracleError::DataSpecNotFound`] for an unregistered query type and
    /// [`OracleError::InsufficientFunds`] if the tipper cannot pay.
    pub fn tip(
        &self,
        ctx: &BlockContext,
        tipper: &str,
        data: &[u8],
        amount: u128,
    ) -> Result<QueryMeta> {
        self.atomic("tip", || self.tip_inner(ctx, tipper, data, amount))
    }

    fn tip_inner(
        &self,
        ctx: &BlockContext,
        tipper: &str,
        data: &[u8],
        amount: u128,
    ) -> Result<QueryMeta> {
        if amount == 0 {
            return Err(OracleError::ZeroTip);
        }
        let tipper = self.parse_address(tipper)?;
        let params = self.params()?;
        self.check_query_data(data, &params)?;
        let (_, spec) = self.data_spec(data)?;

        self.send_from_account(&tipper, ORACLE_MODULE, amount)?;
        let (burned, net) = split_tip(amount, params.tip_burn_percent)?;
        if burned > 0 {
            self.burn(ORACLE_MODULE, burned)?;
        }

        let query_id = query_data::query_id(data);
        let mut meta = match self.current_query(&query_id)? {
            None => self.initialize_query(ctx, data, spec.report_block_window)?,
            Some(meta) if meta.is_expired(ctx.height) && meta.has_revealed_reports => {
                self.close_round(ctx, &meta)?;
                self.initialize_query(ctx, data, spec.report_block_window)?
            }
            Some(mut meta) if meta.is_expired(ctx.height) => {
                if meta.amount == 0 {
                    self.renew_round(ctx, &mut meta)?;
                    meta.cycle_list = false;
                } else {
                    meta.expiration = ctx
                        .height
                        .checked_add(meta.report_buffer_window)
                        .ok_or(OracleError::Overflow)?;
                }
                meta
            }
            Some(meta) => meta,
        };
        meta.amount = meta.amount.checked_add(net).ok_or(OracleError::Overflow)?;
        self.save_query(&meta)?;
        tips::record(&self.conn, &query_id, &tipper, net)?;

        tracing::info!(
            tipper = %tipper,
            query_id = %query_id_hex(&query_id),
            meta_id = meta.id,
            net,
            burned,
            "tip added"
        );
        self.emit(OracleEvent::TipAdded {
            tipper: tipper.to_string(),
            query_id: query_id_hex(&query_id),
            amount: net.to_string(),
            burned: burned.to_string(),
        });
        Ok(meta)
    }
}
