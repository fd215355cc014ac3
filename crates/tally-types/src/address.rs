//! Bech32 account addresses.
//!
//! Reporters, tippers and the governance authority are all identified by a
//! bech32 string (`tally1...`). The canonical form is lowercase; ordering is
//! by that canonical string so that every iteration over addresses is
//! identical on every node.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// Default human-readable prefix for account addresses.
pub const DEFAULT_PREFIX: &str = "tally";

/// Maximum payload length accepted for an address.
pub const MAX_ADDRESS_LEN: usize = 255;

/// A validated bech32 account address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccAddress(String);

impl AccAddress {
    /// Parse and validate a bech32 address under any prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidAddress`] if the checksum is wrong, the
    /// payload is empty or longer than [`MAX_ADDRESS_LEN`].
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(TypesError::InvalidAddress("empty address string".into()));
        }
        let (hrp, data) =
            bech32::decode(s).map_err(|e| TypesError::InvalidAddress(format!("{s}: {e}")))?;
        if data.is_empty() || data.len() > MAX_ADDRESS_LEN {
            return Err(TypesError::InvalidAddress(format!(
                "{s}: payload length {} out of range",
                data.len()
            )));
        }
        Self::encode(&hrp, &data)
    }

    /// Parse an address and require a specific human-readable prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidAddress`] on any decoding failure or when
    /// the prefix differs from `prefix`.
    pub fn parse_with_prefix(s: &str, prefix: &str) -> Result<Self> {
        let addr = Self::parse(s)?;
        if addr.prefix() != prefix {
            return Err(TypesError::InvalidAddress(format!(
                "{s}: expected prefix {prefix}"
            )));
        }
        Ok(addr)
    }

    /// Build an address from raw payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidAddress`] if the prefix is not a valid
    /// human-readable part or the payload is empty.
    pub fn from_bytes(prefix: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_ADDRESS_LEN {
            return Err(TypesError::InvalidAddress(format!(
                "payload length {} out of range",
                bytes.len()
            )));
        }
        let hrp = Hrp::parse(prefix).map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
        Self::encode(&hrp, bytes)
    }

    fn encode(hrp: &Hrp, data: &[u8]) -> Result<Self> {
        let s = bech32::encode::<Bech32>(*hrp, data)
            .map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
        Ok(Self(s.to_lowercase()))
    }

    /// The canonical lowercase bech32 string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The human-readable prefix.
    pub fn prefix(&self) -> &str {
        self.0.rsplit_once('1').map_or("", |(hrp, _)| hrp)
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccAddress {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<AccAddress> for String {
    fn from(addr: AccAddress) -> Self {
        addr.0
    }
}
