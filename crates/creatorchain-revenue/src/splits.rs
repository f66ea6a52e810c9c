//! Share-table validation and per-contributor split calculation.
//!
//! Every contributor except the last in allocation order receives
//! `truncate(distributable * share / 10000)`. The last contributor receives
//! whatever remains, so the payouts always sum to the distributable amount
//! exactly and no rounding dust is left behind.
//!
//! Allocation order is the order of the input slice. Callers pass
//! contributors in creation order so reruns are reproducible.

use std::collections::HashSet;

use creatorchain_types::{
    AllocationEntry, AllocationTable, Contributor, ContributorId, ShareBps, BPS_DENOMINATOR,
    SHARE_TOLERANCE_BPS,
};
use serde::{Deserialize, Serialize};

use crate::{FeePolicy, Result, RevenueError};

/// One row of the share table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub contributor_id: ContributorId,
    pub wallet: String,
    pub share: ShareBps,
}

impl From<&Contributor> for ShareEntry {
    fn from(contributor: &Contributor) -> Self {
        Self {
            contributor_id: contributor.id,
            wallet: contributor.wallet.clone(),
            share: contributor.share,
        }
    }
}

/// Validate a share table.
///
/// Returns the total in basis points.
///
/// # Errors
///
/// - [`RevenueError::EmptyShareTable`] if there are no entries
/// - [`RevenueError::DuplicateContributor`] if a contributor repeats
/// - [`RevenueError::InvalidShareTable`] if the total is not 10000 ± 1 bps
pub fn validate_shares(shares: &[ShareEntry]) -> Result<u32> {
    if shares.is_empty() {
        return Err(RevenueError::EmptyShareTable);
    }

    let mut seen = HashSet::with_capacity(shares.len());
    for entry in shares {
        if !seen.insert(entry.contributor_id) {
            return Err(RevenueError::DuplicateContributor(entry.contributor_id.0));
        }
    }

    let total_bps: u32 = shares.iter().map(|e| e.share.bps()).sum();
    if total_bps.abs_diff(BPS_DENOMINATOR) > SHARE_TOLERANCE_BPS {
        return Err(RevenueError::InvalidShareTable { total_bps });
    }
    Ok(total_bps)
}

/// Compute the allocation table for a pool.
///
/// # Errors
///
/// - [`RevenueError::InvalidAmount`] if `total_amount` is zero
/// - any error from [`validate_shares`]
/// - [`RevenueError::Overflow`] on arithmetic overflow
pub fn calculate(
    total_amount: u64,
    fee: &FeePolicy,
    shares: &[ShareEntry],
) -> Result<AllocationTable> {
    if total_amount == 0 {
        return Err(RevenueError::InvalidAmount);
    }
    validate_shares(shares)?;

    let (distributable, platform_fee) = fee.apply(total_amount)?;

    let mut entries = Vec::with_capacity(shares.len());
    let mut allocated: u64 = 0;
    let last = shares.len() - 1;

    for (index, entry) in shares.iter().enumerate() {
        let amount = if index == last {
            distributable
                .checked_sub(allocated)
                .ok_or(RevenueError::Overflow)?
        } else {
            let share =
                u128::from(distributable) * u128::from(entry.share.bps()) / u128::from(BPS_DENOMINATOR);
            u64::try_from(share).map_err(|_| RevenueError::Overflow)?
        };
        allocated = allocated.checked_add(amount).ok_or(RevenueError::Overflow)?;

        entries.push(AllocationEntry {
            contributor_id: entry.contributor_id,
            wallet: entry.wallet.clone(),
            share_bps: entry.share.bps(),
            amount,
        });
    }

    tracing::debug!(
        total_amount,
        distributable,
        platform_fee,
        contributors = entries.len(),
        "split calculated"
    );

    Ok(AllocationTable {
        total_amount,
        fee_bps: fee.fee_bps(),
        platform_fee,
        distributable,
        entries,
    })
}

/// Side-effect-free split preview for display.
///
/// Identical to [`calculate`]; exposed under its own name for UI callers.
pub fn preview_split(
    total_amount: u64,
    fee: &FeePolicy,
    shares: &[ShareEntry],
) -> Result<AllocationTable> {
    calculate(total_amount, fee, shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1.00 USDC in base units.
    const USDC: u64 = 1_000_000;

    fn table(shares: &[u32]) -> Vec<ShareEntry> {
        shares
            .iter()
            .enumerate()
            .map(|(i, bps)| ShareEntry {
                contributor_id: ContributorId(i as i64 + 1),
                wallet: format!("0x{:040x}", i + 1),
                share: ShareBps::new(*bps).expect("share"),
            })
            .collect()
    }

    #[test]
    fn test_sixty_forty() {
        let alloc = calculate(100 * USDC, &FeePolicy::default(), &table(&[6000, 4000]))
            .expect("calculate");
        assert_eq!(alloc.distributable, 98 * USDC);
        assert_eq!(alloc.platform_fee, 2 * USDC);
        assert_eq!(alloc.entries[0].amount, 58_800_000);
        assert_eq!(alloc.entries[1].amount, 39_200_000);
        assert_eq!(alloc.allocated(), alloc.distributable);
    }

    #[test]
    fn test_thirds_remainder_to_last() {
        let alloc = calculate(10 * USDC, &FeePolicy::default(), &table(&[3333, 3333, 3334]))
            .expect("calculate");
        assert_eq!(alloc.distributable, 9_800_000);
        // 9.80 * 33.33% = 3.266340, truncated
        assert_eq!(alloc.entries[0].amount, 3_266_340);
        assert_eq!(alloc.entries[1].amount, 3_266_340);
        assert_eq!(alloc.entries[2].amount, 9_800_000 - 2 * 3_266_340);
        assert_eq!(alloc.allocated(), 9_800_000);
    }

    #[test]
    fn test_single_contributor_gets_everything() {
        let alloc = calculate(12_345, &FeePolicy::default(), &table(&[10_000])).expect("calculate");
        assert_eq!(alloc.entries.len(), 1);
        assert_eq!(alloc.entries[0].amount, alloc.distributable);
        assert_eq!(alloc.distributable + alloc.platform_fee, 12_345);
    }

    #[test]
    fn test_conservation_many_contributors() {
        // Seven contributors, awkward shares, prime amounts.
        let shares = table(&[1429, 1429, 1428, 1428, 1429, 1428, 1429]);
        for total in [1u64, 7, 97, 1_000_003, 999_999_937, u64::MAX / 3] {
            let alloc = calculate(total, &FeePolicy::default(), &shares).expect("calculate");
            assert_eq!(alloc.allocated(), alloc.distributable, "total {total}");
            assert_eq!(alloc.distributable + alloc.platform_fee, total);
        }
    }

    #[test]
    fn test_tolerance() {
        assert!(validate_shares(&table(&[3333, 3333, 3333])).is_ok()); // 9999
        assert!(validate_shares(&table(&[5000, 5001])).is_ok()); // 10001
        assert_eq!(
            validate_shares(&table(&[5000, 4998])),
            Err(RevenueError::InvalidShareTable { total_bps: 9998 })
        );
        assert_eq!(
            validate_shares(&table(&[6000, 6000])),
            Err(RevenueError::InvalidShareTable { total_bps: 12_000 })
        );
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert_eq!(validate_shares(&[]), Err(RevenueError::EmptyShareTable));
        let mut shares = table(&[5000, 5000]);
        shares[1].contributor_id = shares[0].contributor_id;
        assert_eq!(
            validate_shares(&shares),
            Err(RevenueError::DuplicateContributor(1))
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert_eq!(
            calculate(0, &FeePolicy::default(), &table(&[10_000])),
            Err(RevenueError::InvalidAmount)
        );
    }

    #[test]
    fn test_preview_is_deterministic() {
        let shares = table(&[2500, 2500, 3333, 1667]);
        let first = preview_split(777_777, &FeePolicy::default(), &shares).expect("preview");
        let second = preview_split(777_777, &FeePolicy::default(), &shares).expect("preview");
        assert_eq!(first, second);
    }

    #[test]
    fn test_fee_is_injected() {
        let shares = table(&[10_000]);
        let alloc = calculate(1000, &FeePolicy::new(500).expect("fee"), &shares).expect("calculate");
        assert_eq!(alloc.fee_bps, 500);
        assert_eq!(alloc.distributable, 950);
    }

    #[test]
    fn test_order_is_preserved() {
        let shares = table(&[1000, 9000]);
        let alloc = calculate(10_000, &FeePolicy::new(0).expect("fee"), &shares).expect("calculate");
        let ids: Vec<_> = alloc.entries.iter().map(|e| e.contributor_id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(alloc.entries[0].amount, 1000);
        assert_eq!(alloc.entries[1].amount, 9000);
    }
}
