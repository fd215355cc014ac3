//! Query-data encoding and query ids.
//!
//! Query data is the ABI encoding of `(string queryType, bytes params)` and
//! a query's id is `keccak256(queryData)`. Bridge deposits use the
//! `TRBBridge` query type with params `(bool toLayer, uint256 depositId)`.

use alloy_primitives::{keccak256, U256};

use crate::abi::{self, AbiToken, AbiType};
use crate::{QueryId, Result, TypesError};

/// Query type used for token-bridge deposits and withdrawals.
pub const TRB_BRIDGE_QUERY_TYPE: &str = "TRBBridge";

/// Compute the query id of raw query data.
pub fn query_id(query_data: &[u8]) -> QueryId {
    keccak256(query_data).0
}

/// Encode a query type and its ABI encoded params.
pub fn encode(query_type: &str, params: &[u8]) -> Vec<u8> {
    abi::encode(&[
        AbiToken::String(query_type.to_string()),
        AbiToken::Bytes(params.to_vec()),
    ])
}

/// Decode query data into `(query_type, params)`.
///
/// # Errors
///
/// Returns [`TypesError::InvalidQueryData`] if the data is not an ABI
/// `(string, bytes)` tuple or the query type is empty.
pub fn decode(query_data: &[u8]) -> Result<(String, Vec<u8>)> {
    let mut tokens = abi::decode(&[AbiType::String, AbiType::Bytes], query_data)
        .map_err(|e| TypesError::InvalidQueryData(e.to_string()))?
        .into_iter();
    let query_type = tokens
        .next()
        .and_then(AbiToken::into_string)
        .ok_or_else(|| TypesError::InvalidQueryData("missing query type".into()))?;
    let params = tokens
        .next()
        .and_then(AbiToken::into_bytes)
        .ok_or_else(|| TypesError::InvalidQueryData("missing params".into()))?;
    if query_type.is_empty() {
        return Err(TypesError::InvalidQueryData("empty query type".into()));
    }
    Ok((query_type, params))
}

/// Decode only the query type.
///
/// # Errors
///
/// See [`decode`].
pub fn query_type(query_data: &[u8]) -> Result<String> {
    decode(query_data).map(|(query_type, _)| query_type)
}

/// Decoded `TRBBridge` parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeQuery {
    /// `true` for a deposit into this chain, `false` for a withdrawal.
    pub to_layer: bool,
    pub deposit_id: U256,
}

/// Build query data for a bridge query.
pub fn encode_bridge(to_layer: bool, deposit_id: u64) -> Vec<u8> {
    let params = abi::encode(&[
        AbiToken::Bool(to_layer),
        AbiToken::Uint(U256::from(deposit_id)),
    ]);
    encode(TRB_BRIDGE_QUERY_TYPE, &params)
}

/// Decode query data as a bridge query. `Ok(None)` if it is another type.
///
/// # Errors
///
/// Returns [`TypesError::InvalidQueryData`] if the data is malformed, or is
/// a `TRBBridge` query whose params do not decode.
pub fn decode_bridge(query_data: &[u8]) -> Result<Option<BridgeQuery>> {
    let (query_type, params) = decode(query_data)?;
    if query_type != TRB_BRIDGE_QUERY_TYPE {
        return Ok(None);
    }
    let tokens = abi::decode(&[AbiType::Bool, AbiType::Uint(256)], &params)
        .map_err(|e| TypesError::InvalidQueryData(format!("bridge params: {e}")))?;
    match (tokens.first().and_then(AbiToken::as_bool), tokens.get(1).and_then(AbiToken::as_uint)) {
        (Some(to_layer), Some(deposit_id)) => Ok(Some(BridgeQuery { to_layer, deposit_id })),
        _ => Err(TypesError::InvalidQueryData("bridge params".into())),
    }
}
