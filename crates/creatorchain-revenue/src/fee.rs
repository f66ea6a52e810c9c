//! Platform fee policy.
//!
//! The fee is a single configured rate injected when a run starts. The
//! distributable amount is truncated; the platform fee absorbs the dust so
//! that `distributable + fee == total` always holds.

use creatorchain_types::{BPS_DENOMINATOR, DEFAULT_PLATFORM_FEE_BPS};
use serde::{Deserialize, Serialize};

use crate::{Result, RevenueError};

/// Platform fee rate in basis points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    fee_bps: u32,
}

impl FeePolicy {
    /// Create a fee policy.
    ///
    /// # Errors
    ///
    /// - [`RevenueError::InvalidFee`] if `fee_bps` exceeds 10000
    pub fn new(fee_bps: u32) -> Result<Self> {
        if fee_bps > BPS_DENOMINATOR {
            return Err(RevenueError::InvalidFee(fee_bps));
        }
        Ok(Self { fee_bps })
    }

    /// Fee rate in basis points.
    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// Split a pool amount into `(distributable, platform_fee)`.
    ///
    /// # Errors
    ///
    /// - [`RevenueError::InvalidAmount`] if `total` is zero
    pub fn apply(&self, total: u64) -> Result<(u64, u64)> {
        if total == 0 {
            return Err(RevenueError::InvalidAmount);
        }
        let keep = u128::from(BPS_DENOMINATOR - self.fee_bps);
        let distributable = u64::try_from(u128::from(total) * keep / u128::from(BPS_DENOMINATOR))
            .map_err(|_| RevenueError::Overflow)?;
        Ok((distributable, total - distributable))
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            fee_bps: DEFAULT_PLATFORM_FEE_BPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_two_percent() {
        let policy = FeePolicy::default();
        assert_eq!(policy.fee_bps(), 200);
        let (distributable, fee) = policy.apply(100_000_000).expect("apply");
        assert_eq!(distributable, 98_000_000);
        assert_eq!(fee, 2_000_000);
    }

    #[test]
    fn test_fee_absorbs_dust() {
        let (distributable, fee) = FeePolicy::default().apply(33).expect("apply");
        // 33 * 0.98 = 32.34, truncated
        assert_eq!(distributable, 32);
        assert_eq!(fee, 1);
    }

    #[test]
    fn test_zero_and_full_fee() {
        let (d, f) = FeePolicy::new(0).expect("policy").apply(500).expect("apply");
        assert_eq!((d, f), (500, 0));
        let (d, f) = FeePolicy::new(10_000).expect("policy").apply(500).expect("apply");
        assert_eq!((d, f), (0, 500));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(FeePolicy::new(10_001), Err(RevenueError::InvalidFee(10_001)));
        assert_eq!(FeePolicy::default().apply(0), Err(RevenueError::InvalidAmount));
    }

    #[test]
    fn test_large_amount_no_overflow() {
        let (d, f) = FeePolicy::default().apply(u64::MAX).expect("apply");
        assert_eq!(d + f, u64::MAX);
    }
}
