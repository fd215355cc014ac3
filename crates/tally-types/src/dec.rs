//! Fixed-point decimal arithmetic.
//!
//! Every reward and liveness computation runs on [`Dec`], an unsigned
//! decimal with 18 fractional digits backed by a 256-bit integer. Rounding
//! follows the chain's legacy decimal rules: `mul`/`quo` round half to even
//! on the removed digits, the `_truncate` variants chop.
//!
//! Floating point is never used on these paths.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::TypesError;

/// Number of fractional decimal digits.
pub const PRECISION: usize = 18;

const PRECISION_U64: u64 = 1_000_000_000_000_000_000;

fn precision() -> U256 {
    U256::from(PRECISION_U64)
}

/// Unsigned 18-decimal fixed-point number.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay,
    DeserializeFromStr,
)]
pub struct Dec(U256);

impl Dec {
    /// Zero.
    pub fn zero() -> Self {
        Self(U256::ZERO)
    }

    /// One.
    pub fn one() -> Self {
        Self(precision())
    }

    /// An integer value.
    pub fn from_int(n: u128) -> Self {
        // 2^128 * 10^18 < 2^256, cannot overflow.
        Self(U256::from(n) * precision())
    }

    /// `num / den`, rounded half to even. `None` if `den` is zero.
    pub fn from_ratio(num: u128, den: u128) -> Option<Self> {
        Self::from_int(num).checked_quo(Self::from_int(den))
    }

    /// Whether the value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether the value is strictly positive.
    pub fn is_positive(&self) -> bool {
        !self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiplication, rounding half to even.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_mul(rhs.0)
            .map(|product| Self(chop_precision_and_round(product)))
    }

    /// Multiplication, truncating the removed digits.
    pub fn checked_mul_truncate(self, rhs: Self) -> Option<Self> {
        self.0
            .checked_mul(rhs.0)
            .map(|product| Self(product / precision()))
    }

    /// Multiplication by an integer. Exact.
    pub fn checked_mul_int(self, rhs: u128) -> Option<Self> {
        self.0.checked_mul(U256::from(rhs)).map(Self)
    }

    /// Division, rounding half to even. `None` on division by zero.
    pub fn checked_quo(self, rhs: Self) -> Option<Self> {
        if rhs.0.is_zero() {
            return None;
        }
        let scaled = self.0.checked_mul(precision())?.checked_mul(precision())?;
        Some(Self(chop_precision_and_round(scaled / rhs.0)))
    }

    /// Division, truncating. `None` on division by zero.
    pub fn checked_quo_truncate(self, rhs: Self) -> Option<Self> {
        if rhs.0.is_zero() {
            return None;
        }
        let scaled = self.0.checked_mul(precision())?;
        Some(Self(scaled / rhs.0))
    }

    /// Integer part, dropping the fraction. `None` if it exceeds `u128`.
    pub fn truncate_int(self) -> Option<u128> {
        u128::try_from(self.0 / precision()).ok()
    }

    /// Nearest integer, ties to even. `None` if it exceeds `u128`.
    pub fn round_int(self) -> Option<u128> {
        u128::try_from(chop_precision_and_round(self.0)).ok()
    }
}

/// Remove [`PRECISION`] digits from `d`, rounding half to even.
fn chop_precision_and_round(d: U256) -> U256 {
    let p = precision();
    let quo = d / p;
    let rem = d % p;
    if rem.is_zero() {
        return quo;
    }
    let half = p / U256::from(2u8);
    match rem.cmp(&half) {
        std::cmp::Ordering::Less => quo,
        std::cmp::Ordering::Greater => quo + U256::from(1u8),
        std::cmp::Ordering::Equal => {
            if quo.bit(0) {
                quo + U256::from(1u8)
            } else {
                quo
            }
        }
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = precision();
        let int = self.0 / p;
        let frac = self.0 % p;
        write!(f, "{int}.{:0>width$}", frac.to_string(), width = PRECISION)
    }
}

impl FromStr for Dec {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TypesError::InvalidDecimal(s.to_string());
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() || frac_part.len() > PRECISION {
            return Err(bad());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let int = U256::from_str_radix(int_part, 10).map_err(|_| bad())?;
        let frac = if frac_part.is_empty() {
            U256::ZERO
        } else {
            let padded = format!("{frac_part:0<width$}", width = PRECISION);
            U256::from_str_radix(&padded, 10).map_err(|_| bad())?
        };
        int.checked_mul(precision())
            .and_then(|v| v.checked_add(frac))
            .map(Self)
            .ok_or_else(bad)
    }
}
