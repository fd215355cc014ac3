//! The oracle keeper.
//!
//! [`Keeper`] owns the module store and the collaborator handles. Operations
//! are spread across the crate's modules as further `impl Keeper` blocks;
//! this module holds construction, the event buffer and the round
//! lifecycle helpers they share. Units of work and the queue of
//! collaborator writes live in `pending`.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tally_db::queries::{params as params_q, query_meta, state};
use tally_types::address::DEFAULT_PREFIX;
use tally_types::{query_data, AccAddress, DataSpec, OracleEvent, Params, QueryId, QueryMeta};

use crate::aggregate::StrategyTable;
use crate::expected_keepers::{BankKeeper, BridgeKeeper, RegistryKeeper, ReporterKeeper};
use crate::pending::Effect;
use crate::{OracleError, Result};

/// Height and time of the block being executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockContext {
    pub height: u64,
    /// Block time in Unix milliseconds.
    pub time_ms: u64,
}

impl BlockContext {
    pub fn new(height: u64, time_ms: u64) -> Self {
        Self { height, time_ms }
    }
}

/// Static keeper configuration.
#[derive(Clone, Debug)]
pub struct KeeperConfig {
    /// Address allowed to send governance messages.
    pub authority: AccAddress,
    /// Required bech32 prefix of every address.
    pub bech32_prefix: String,
}

impl KeeperConfig {
    pub fn new(authority: AccAddress) -> Self {
        Self {
            authority,
            bech32_prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Collaborator handles passed to [`Keeper::new`].
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn RegistryKeeper>,
    pub reporters: Arc<dyn ReporterKeeper>,
    pub bank: Arc<dyn BankKeeper>,
    pub bridge: Arc<dyn BridgeKeeper>,
}

/// Oracle module keeper.
pub struct Keeper {
    pub(crate) conn: Connection,
    pub(crate) config: KeeperConfig,
    pub(crate) registry: Arc<dyn RegistryKeeper>,
    pub(crate) reporters: Arc<dyn ReporterKeeper>,
    pub(crate) bank: Arc<dyn BankKeeper>,
    pub(crate) bridge: Arc<dyn BridgeKeeper>,
    pub(crate) strategies: StrategyTable,
    pub(crate) events: Mutex<Vec<OracleEvent>>,
    pub(crate) effects: Mutex<Vec<Effect>>,
    /// Nesting depth of running units.
    pub(crate) depth: Mutex<usize>,
}

impl Keeper {
    /// Create a keeper over an opened store.
    pub fn new(conn: Connection, config: KeeperConfig, collaborators: Collaborators) -> Self {
        Self {
            conn,
            config,
            registry: collaborators.registry,
            reporters: collaborators.reporters,
            bank: collaborators.bank,
            bridge: collaborators.bridge,
            strategies: StrategyTable::default(),
            events: Mutex::new(Vec::new()),
            effects: Mutex::new(Vec::new()),
            depth: Mutex::new(0),
        }
    }

    /// The underlying store.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Current module params.
    pub fn params(&self) -> Result<Params> {
        Ok(params_q::get(&self.conn)?)
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&self) -> Vec<OracleEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub(crate) fn emit(&self, event: OracleEvent) {
        tracing::trace!(kind = event.kind(), "event");
        self.events.lock().push(event);
    }

    /// Parse an address and check its prefix.
    pub(crate) fn parse_address(&self, addr: &str) -> Result<AccAddress> {
        Ok(AccAddress::parse_with_prefix(addr, &self.config.bech32_prefix)?)
    }

    /// Reject empty or oversized query data.
    pub(crate) fn check_query_data(&self, data: &[u8], params: &Params) -> Result<()> {
        if data.is_empty() {
            return Err(OracleError::EmptyQueryData);
        }
        let size = data.len() as u64;
        if size > params.query_data_limit {
            return Err(OracleError::QueryDataTooLarge {
                size,
                limit: params.query_data_limit,
            });
        }
        Ok(())
    }

    /// Resolve the query type and data spec of raw query data.
    pub(crate) fn data_spec(&self, data: &[u8]) -> Result<(String, DataSpec)> {
        let query_type = query_data::query_type(data)?;
        let spec = self.registry.get_spec(&query_type)?;
        Ok((query_type, spec))
    }

    /// The open round of a query, if any.
    pub fn current_query(&self, query_id: &QueryId) -> Result<Option<QueryMeta>> {
        Ok(query_meta::find(&self.conn, query_id)?)
    }

    /// Build a fresh round for `data` with a new meta id and round number.
    ///
    /// The round is not persisted; callers adjust and store it.
    pub(crate) fn initialize_query(
        &self,
        ctx: &BlockContext,
        data: &[u8],
        window: u64,
    ) -> Result<QueryMeta> {
        let query_type = query_data::query_type(data)?;
        let query_id = query_data::query_id(data);
        let id = state::next_sequence(&self.conn, state::QUERY_SEQUENCER)?;
        let round = query_meta::next_round(&self.conn, &query_id)?;
        let expiration = ctx.height.checked_add(window).ok_or(OracleError::Overflow)?;
        tracing::debug!(
            query_id = %tally_types::query_id_hex(&query_id),
            meta_id = id,
            round,
            expiration,
            "round opened"
        );
        Ok(QueryMeta {
            id,
            round,
            query_id,
            amount: 0,
            expiration,
            report_buffer_window: window,
            has_revealed_reports: false,
            query_data: data.to_vec(),
            query_type,
            cycle_list: false,
        })
    }

    /// Move an unreported, expired round to a new meta id and window.
    pub(crate) fn renew_round(&self, ctx: &BlockContext, meta: &mut QueryMeta) -> Result<()> {
        meta.id = state::next_sequence(&self.conn, state::QUERY_SEQUENCER)?;
        meta.round = query_meta::next_round(&self.conn, &meta.query_id)?;
        meta.expiration = ctx
            .height
            .checked_add(meta.report_buffer_window)
            .ok_or(OracleError::Overflow)?;
        Ok(())
    }

    pub(crate) fn save_query(&self, meta: &QueryMeta) -> Result<()> {
        Ok(query_meta::set(&self.conn, meta)?)
    }
}
