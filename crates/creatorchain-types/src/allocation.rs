//! Allocation tables produced by the split calculator.
//!
//! These are also returned verbatim by `preview_split`, so they are exported
//! as TypeScript bindings for UI consumers.

use serde::{Deserialize, Serialize};

use crate::ContributorId;

/// One contributor's computed payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct AllocationEntry {
    #[ts(type = "number")]
    pub contributor_id: ContributorId,
    pub wallet: String,
    /// Share in basis points.
    pub share_bps: u32,
    /// Amount in the token's smallest unit.
    #[ts(type = "number")]
    pub amount: u64,
}

/// Per-contributor amounts for one pool, in allocation order.
///
/// Invariant: `entries` amounts sum to `distributable`, and
/// `distributable + platform_fee == total_amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct AllocationTable {
    #[ts(type = "number")]
    pub total_amount: u64,
    pub fee_bps: u32,
    #[ts(type = "number")]
    pub platform_fee: u64,
    #[ts(type = "number")]
    pub distributable: u64,
    pub entries: Vec<AllocationEntry>,
}

impl AllocationTable {
    /// Sum of all entry amounts.
    pub fn allocated(&self) -> u64 {
        self.entries.iter().map(|e| e.amount).sum()
    }

    /// Look up the entry for a contributor.
    pub fn entry(&self, contributor_id: ContributorId) -> Option<&AllocationEntry> {
        self.entries
            .iter()
            .find(|e| e.contributor_id == contributor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_and_lookup() {
        let table = AllocationTable {
            total_amount: 100,
            fee_bps: 200,
            platform_fee: 2,
            distributable: 98,
            entries: vec![
                AllocationEntry {
                    contributor_id: ContributorId(1),
                    wallet: "0x01".to_string(),
                    share_bps: 6000,
                    amount: 58,
                },
                AllocationEntry {
                    contributor_id: ContributorId(2),
                    wallet: "0x02".to_string(),
                    share_bps: 4000,
                    amount: 40,
                },
            ],
        };
        assert_eq!(table.allocated(), 98);
        assert_eq!(
            table.entry(ContributorId(2)).map(|e| e.amount),
            Some(40)
        );
        assert!(table.entry(ContributorId(3)).is_none());
    }
}
