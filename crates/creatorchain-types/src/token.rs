//! Assets a distribution can be paid in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Address, TypesError, NATIVE_DECIMALS, USDC_DECIMALS};

/// USDC contract on Base mainnet.
pub const BASE_USDC_ADDRESS: Address = Address([
    0x83, 0x35, 0x89, 0xfc, 0xd6, 0xed, 0xb6, 0xe0, 0x8f, 0x4c, 0x7c, 0x32, 0xd4, 0xf7, 0x1b, 0x54,
    0xbd, 0xa0, 0x29, 0x13,
]);

/// The asset moved by a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Token {
    /// The chain's native currency. Network fees are paid in it.
    Native,
    /// An ERC-20 token.
    Erc20 {
        /// Token contract.
        contract: Address,
        /// Decimal places of the smallest unit.
        decimals: u8,
    },
}

impl Token {
    /// USDC on Base.
    pub const fn usdc() -> Self {
        Token::Erc20 {
            contract: BASE_USDC_ADDRESS,
            decimals: USDC_DECIMALS,
        }
    }

    /// Decimal places of the smallest unit.
    pub fn decimals(&self) -> u8 {
        match self {
            Token::Native => NATIVE_DECIMALS,
            Token::Erc20 { decimals, .. } => *decimals,
        }
    }

    /// Whether network fees are paid from the same balance as the transfer.
    pub fn is_native(&self) -> bool {
        matches!(self, Token::Native)
    }
}

/// Storage form: `native` or `erc20:<contract>:<decimals>`.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Native => f.write_str("native"),
            Token::Erc20 { contract, decimals } => write!(f, "erc20:{contract}:{decimals}"),
        }
    }
}

impl FromStr for Token {
    type Err = TypesError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let unknown = || TypesError::UnknownVariant {
            kind: "token",
            value: s.to_string(),
        };
        if s == "native" {
            return Ok(Token::Native);
        }
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("erc20"), Some(contract), Some(decimals)) => Ok(Token::Erc20 {
                contract: contract.parse()?,
                decimals: decimals.parse().map_err(|_| unknown())?,
            }),
            _ => Err(unknown()),
        }
    }
}
