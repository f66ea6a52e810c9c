//! EVM account addresses and transfer references.
//!
//! Both serialize as `0x`-prefixed lowercase hex strings so that JSON-RPC
//! payloads and database rows read the same way a block explorer shows them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, TypesError};

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

/// A 32-byte transaction hash identifying a submitted transfer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxHash(pub [u8; 32]);

impl Address {
    /// The all-zero address. Never a valid transfer recipient.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Parse and validate an address for use as a transfer recipient.
    ///
    /// # Errors
    ///
    /// - [`TypesError::InvalidAddress`] if the string is malformed or the
    ///   zero address
    pub fn parse_recipient(s: &str) -> Result<Self> {
        let addr: Address = s.parse()?;
        if addr.is_zero() {
            return Err(TypesError::InvalidAddress(s.to_string()));
        }
        Ok(addr)
    }

    /// Whether this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

fn decode_prefixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    let hex_part = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex_part.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(hex_part, &mut out).ok()?;
    Some(out)
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        decode_prefixed::<20>(s.trim())
            .map(Address)
            .ok_or_else(|| TypesError::InvalidAddress(s.to_string()))
    }
}

impl FromStr for TxHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        decode_prefixed::<32>(s.trim())
            .map(TxHash)
            .ok_or_else(|| TypesError::InvalidTxHash(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(Address);
string_serde!(TxHash);
