//! Revenue pools and the payouts drawn from them.

use serde::{Deserialize, Serialize};

use crate::{ContributorId, PayoutId, PoolId, ProjectId, Token, TxHash};

tagged_enum! {
    /// Where pooled revenue came from.
    pub enum RevenueSource: "revenue source" {
        Marketplace => "marketplace",
        Direct => "direct",
        Other => "other",
    }
}

tagged_enum! {
    /// Pool lifecycle: `pending -> distributing -> {completed | failed}`.
    ///
    /// A failed pool returns to completed once retries settle every payout.
    pub enum PoolStatus: "pool status" {
        Pending => "pending",
        Distributing => "distributing",
        Completed => "completed",
        Failed => "failed",
    }
}

tagged_enum! {
    /// Payout lifecycle: `pending -> processing -> {completed | failed | ambiguous}`.
    pub enum PayoutStatus: "payout status" {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        /// Submitted, but the outcome could not be established before the
        /// confirmation timeout. Funds may have moved.
        Ambiguous => "ambiguous",
    }
}

impl PayoutStatus {
    /// Pending and processing payouts hold the `(pool, contributor)` slot.
    pub fn is_active(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Processing)
    }

    /// States from which `retry` may start a new attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutStatus::Failed | PayoutStatus::Ambiguous)
    }
}

/// Revenue earmarked for one distribution.
///
/// `total_amount` is immutable after creation; `distributed_amount` only
/// increases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenuePool {
    pub id: PoolId,
    pub project_id: ProjectId,
    pub source: RevenueSource,
    pub token: Token,
    pub total_amount: u64,
    pub distributed_amount: u64,
    pub status: PoolStatus,
    /// Fee rate applied when the pool was distributed.
    pub fee_bps: Option<u32>,
    pub source_metadata: Option<serde_json::Value>,
    pub created_at: u64,
}

/// One contributor's transfer attempt against a pool.
///
/// A failed payout is never reused; retries insert a new row with the next
/// `attempt` number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub pool_id: PoolId,
    pub contributor_id: ContributorId,
    pub amount: u64,
    pub attempt: u32,
    pub reference: Option<TxHash>,
    pub status: PayoutStatus,
    pub failure_reason: Option<String>,
    pub confirmations: Option<u64>,
    pub block_number: Option<u64>,
    pub timestamp: u64,
}
