//! # creatorchain-revenue
//!
//! Revenue split calculation.
//!
//! A pool amount is reduced by the platform fee and the remainder is divided
//! among confirmed contributors by their agreed shares. The calculation is
//! pure and deterministic: identical input always produces identical output.
//!
//! ## Modules
//!
//! - [`fee`] — Platform fee policy
//! - [`splits`] — Share-table validation and per-contributor amounts

pub mod fee;
pub mod splits;

pub use fee::FeePolicy;
pub use splits::{calculate, preview_split, validate_shares, ShareEntry};

/// Error types for revenue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevenueError {
    /// Share percentages do not sum to 100% within tolerance.
    #[error("share table must sum to 10000 bps (±1), got {total_bps}")]
    InvalidShareTable {
        /// The actual total in basis points.
        total_bps: u32,
    },

    /// The share table has no entries.
    #[error("share table is empty")]
    EmptyShareTable,

    /// A contributor appears more than once.
    #[error("contributor {0} appears more than once in the share table")]
    DuplicateContributor(i64),

    /// Pool amount is zero.
    #[error("pool amount must be greater than zero")]
    InvalidAmount,

    /// Fee rate above 100%.
    #[error("fee rate {0} bps exceeds 10000")]
    InvalidFee(u32),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in revenue calculation")]
    Overflow,
}

/// Convenience result type for revenue operations.
pub type Result<T> = std::result::Result<T, RevenueError>;
