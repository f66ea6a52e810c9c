//! # creatorchain-types
//!
//! Shared domain types used across the CreatorChain workspace: identifiers,
//! on-chain addresses and references, share percentages, and the
//! project / contributor / pool / payout records the settlement engine
//! reads and writes.

#[macro_use]
mod macros;

pub mod address;
pub mod allocation;
pub mod events;
pub mod pool;
pub mod project;
pub mod share;
pub mod token;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use address::{Address, TxHash};
pub use allocation::{AllocationEntry, AllocationTable};
pub use events::DistributionEvent;
pub use pool::{Payout, PayoutStatus, PoolStatus, RevenuePool, RevenueSource};
pub use project::{Contributor, ContributorStatus, Project, ProjectStatus};
pub use share::ShareBps;
pub use token::Token;

/// Basis points in 100% (1 bp = 0.01%).
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Default platform fee in basis points (2%).
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 200;

/// Tolerance applied to share tables, in basis points (0.01%).
pub const SHARE_TOLERANCE_BPS: u32 = 1;

/// USDC decimals.
pub const USDC_DECIMALS: u8 = 6;

/// Native ETH decimals.
pub const NATIVE_DECIMALS: u8 = 18;

/// Base mainnet chain id.
pub const BASE_CHAIN_ID: u64 = 8453;

/// Errors raised while parsing or validating shared types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// Address is not `0x` followed by 40 hex digits.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Transaction hash is not `0x` followed by 64 hex digits.
    #[error("invalid transaction hash: {0}")]
    InvalidTxHash(String),

    /// Share is outside `1..=10000` basis points.
    #[error("share out of range: {0} bps")]
    ShareOutOfRange(u32),

    /// Unknown status / tag string read from storage or the wire.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// The enum being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Convenience result type for type parsing.
pub type Result<T> = std::result::Result<T, TypesError>;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Project row id.
    ProjectId
);
row_id!(
    /// Contributor row id. Row order is creation order.
    ContributorId
);
row_id!(
    /// Revenue pool row id.
    PoolId
);
row_id!(
    /// Payout row id.
    PayoutId
);

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparent() {
        let json = serde_json::to_string(&PoolId(42)).expect("serialize");
        assert_eq!(json, "42");
        let back: ContributorId = serde_json::from_str("7").expect("parse");
        assert_eq!(back, ContributorId(7));
    }

    #[test]
    fn test_constants() {
        assert_eq!(BPS_DENOMINATOR, 10_000);
        assert_eq!(DEFAULT_PLATFORM_FEE_BPS, 200);
        assert_eq!(SHARE_TOLERANCE_BPS, 1);
    }

    #[test]
    #[ignore] // Run manually to generate bindings
    fn export_ts_bindings() {
        use ts_rs::TS;
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bindings");
        std::fs::create_dir_all(&dir).expect("create bindings dir");
        crate::allocation::AllocationTable::export_all_to(&dir).expect("export allocation table");
    }
}
