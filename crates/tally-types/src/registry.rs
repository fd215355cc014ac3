//! Data specs and value validation.
//!
//! A data spec is registered per query type by the registry module. The
//! oracle only consumes it: the value type a report must decode under, the
//! aggregation method, the ABI layout of the query params, and the number
//! of blocks a round stays open.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::abi::{self, AbiToken, AbiType};
use crate::{strip_hex_prefix, Result, TypesError};

/// Aggregation methods understood by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationMethod {
    WeightedMedian,
    WeightedMode,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedMedian => "weighted-median",
            Self::WeightedMode => "weighted-mode",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weighted-median" => Ok(Self::WeightedMedian),
            "weighted-mode" => Ok(Self::WeightedMode),
            other => Err(TypesError::InvalidValue(format!(
                "unknown aggregation method {other}"
            ))),
        }
    }
}

/// One named member of a query's params tuple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiComponent {
    pub name: String,
    pub field_type: String,
}

impl AbiComponent {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
        }
    }
}

/// Registered description of a query type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSpec {
    pub query_type: String,
    /// ABI type list a reported value must decode under, e.g. `uint256`.
    pub response_value_type: String,
    /// Layout of the query params.
    pub abi_components: Vec<AbiComponent>,
    /// Method name, resolved through the engine's strategy table.
    pub aggregation_method: String,
    /// Blocks a round stays open for reports.
    pub report_block_window: u64,
}

impl DataSpec {
    /// Check that `value` (hex, optional `0x`) decodes under
    /// [`DataSpec::response_value_type`].
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidValue`] if the value is not hex or does
    /// not decode, and [`TypesError::UnsupportedAbiType`] if the data spec's own
    /// type list is unsupported.
    pub fn validate_value(&self, value: &str) -> Result<()> {
        let types = AbiType::parse_list(&self.response_value_type)?;
        let bytes = decode_hex_value(value)?;
        abi::decode(&types, &bytes).map(|_| ())
    }

    /// Decode query params against [`DataSpec::abi_components`].
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidQueryData`] if the params do not decode.
    pub fn decode_params(&self, params: &[u8]) -> Result<Vec<AbiToken>> {
        let types = self
            .abi_components
            .iter()
            .map(|c| AbiType::parse(&c.field_type))
            .collect::<Result<Vec<_>>>()?;
        abi::decode(&types, params).map_err(|e| {
            TypesError::InvalidQueryData(format!("{} params: {e}", self.query_type))
        })
    }
}

/// Hex decode a reported value, tolerating a `0x` prefix and odd length.
///
/// # Errors
///
/// Returns [`TypesError::InvalidValue`] if the string is empty or not hex.
pub fn decode_hex_value(value: &str) -> Result<Vec<u8>> {
    let stripped = strip_hex_prefix(value.trim());
    if stripped.is_empty() {
        return Err(TypesError::InvalidValue("empty value".into()));
    }
    let normalized = if stripped.len() % 2 == 1 {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    };
    hex::decode(normalized).map_err(|e| TypesError::InvalidValue(e.to_string()))
}
