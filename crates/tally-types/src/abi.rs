//! Minimal Solidity ABI tuple codec.
//!
//! Query data, bridge parameters and reported values are ABI encoded. Only
//! the subset the oracle needs is supported: `uintN`, `intN`, `bool`,
//! `address`, `bytesN`, `bytes` and `string`, as the members of a flat
//! tuple.
//!
//! ```text
//! head: one 32-byte word per member (value, or offset for dynamic types)
//! tail: for each dynamic member, a length word followed by padded data
//! ```

use alloy_primitives::U256;

use crate::{Result, TypesError};

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// A supported ABI member type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbiType {
    /// Unsigned integer with the given bit width.
    Uint(usize),
    /// Signed integer with the given bit width.
    Int(usize),
    Bool,
    Address,
    /// Fixed-size byte array.
    FixedBytes(usize),
    Bytes,
    String,
}

impl AbiType {
    /// Parse a Solidity type name such as `uint256` or `bytes32`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::UnsupportedAbiType`] for arrays, nested tuples
    /// and malformed widths.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let unsupported = || TypesError::UnsupportedAbiType(name.to_string());
        let width = |digits: &str, max: usize, step: usize| -> Result<usize> {
            if digits.is_empty() {
                return Ok(max);
            }
            let n: usize = digits.parse().map_err(|_| unsupported())?;
            if n == 0 || n > max || n % step != 0 {
                return Err(unsupported());
            }
            Ok(n)
        };
        match name {
            "bool" => Ok(Self::Bool),
            "address" => Ok(Self::Address),
            "bytes" => Ok(Self::Bytes),
            "string" => Ok(Self::String),
            _ => {
                if let Some(bits) = name.strip_prefix("uint") {
                    Ok(Self::Uint(width(bits, 256, 8)?))
                } else if let Some(bits) = name.strip_prefix("int") {
                    Ok(Self::Int(width(bits, 256, 8)?))
                } else if let Some(len) = name.strip_prefix("bytes") {
                    if len.is_empty() {
                        return Err(unsupported());
                    }
                    Ok(Self::FixedBytes(width(len, 32, 1)?))
                } else {
                    Err(unsupported())
                }
            }
        }
    }

    /// Parse a comma separated member list, optionally wrapped in parens:
    /// `uint256`, `uint256,bool`, `(string,bytes)`.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::UnsupportedAbiType`] if any member is unsupported
    /// or the list is empty.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        let trimmed = list.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);
        if inner.trim().is_empty() {
            return Err(TypesError::UnsupportedAbiType(list.to_string()));
        }
        inner.split(',').map(Self::parse).collect()
    }
}

/// A decoded ABI value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiToken {
    Uint(U256),
    /// Two's-complement word.
    Int(U256),
    Bool(bool),
    Address([u8; 20]),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
}

impl AbiToken {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn push_padded(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
}

fn word_of(value: U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

/// Encode tokens as a flat ABI tuple.
pub fn encode(tokens: &[AbiToken]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        match token {
            AbiToken::Uint(v) | AbiToken::Int(v) => head.extend_from_slice(&word_of(*v)),
            AbiToken::Bool(b) => head.extend_from_slice(&word_of(U256::from(u8::from(*b)))),
            AbiToken::Address(a) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(a);
            }
            AbiToken::FixedBytes(b) => push_padded(&mut head, b),
            AbiToken::Bytes(b) => {
                head.extend_from_slice(&word_of(U256::from(head_len + tail.len())));
                tail.extend_from_slice(&word_of(U256::from(b.len())));
                push_padded(&mut tail, b);
            }
            AbiToken::String(s) => {
                head.extend_from_slice(&word_of(U256::from(head_len + tail.len())));
                tail.extend_from_slice(&word_of(U256::from(s.len())));
                push_padded(&mut tail, s.as_bytes());
            }
        }
    }
    head.extend_from_slice(&tail);
    head
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| TypesError::InvalidValue(format!("word at {offset} out of bounds")))
}

fn word_to_usize(word: &[u8]) -> Result<usize> {
    u64::try_from(U256::from_be_slice(word))
        .ok()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| TypesError::InvalidValue("offset does not fit".into()))
}

fn read_dynamic(data: &[u8], offset: usize) -> Result<&[u8]> {
    let len = word_to_usize(read_word(data, offset)?)?;
    let start = offset + WORD;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| TypesError::InvalidValue(format!("dynamic data at {offset} out of bounds")))
}

/// Decode a flat ABI tuple of the given member types.
///
/// # Errors
///
/// Returns [`TypesError::InvalidValue`] if the data is too short, an offset
/// points outside the buffer, or a word is out of range for its type.
pub fn decode(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiToken>> {
    let mut tokens = Vec::with_capacity(types.len());
    for (i, ty) in types.iter().enumerate() {
        let word = read_word(data, i * WORD)?;
        let token = match ty {
            AbiType::Uint(bits) => {
                let v = U256::from_be_slice(word);
                if *bits < 256 && v.bit_len() > *bits {
                    return Err(TypesError::InvalidValue(format!("uint{bits} overflow")));
                }
                AbiToken::Uint(v)
            }
            AbiType::Int(_) => AbiToken::Int(U256::from_be_slice(word)),
            AbiType::Bool => match U256::from_be_slice(word) {
                v if v.is_zero() => AbiToken::Bool(false),
                v if v == U256::from(1u8) => AbiToken::Bool(true),
                _ => return Err(TypesError::InvalidValue("bool word not 0 or 1".into())),
            },
            AbiType::Address => {
                if word[..12].iter().any(|b| *b != 0) {
                    return Err(TypesError::InvalidValue("address has dirty high bytes".into()));
                }
                let mut addr = [0u8; 20];
                addr.copy_from_slice(&word[12..]);
                AbiToken::Address(addr)
            }
            AbiType::FixedBytes(len) => AbiToken::FixedBytes(word[..*len].to_vec()),
            AbiType::Bytes | AbiType::String => {
                let offset = word_to_usize(word)?;
                let raw = read_dynamic(data, offset)?.to_vec();
                if *ty == AbiType::String {
                    let s = String::from_utf8(raw)
                        .map_err(|e| TypesError::InvalidValue(e.to_string()))?;
                    AbiToken::String(s)
                } else {
                    AbiToken::Bytes(raw)
                }
            }
        };
        tokens.push(token);
    }
    Ok(tokens)
}
