//! Progress events published while a distribution runs.

use serde::{Deserialize, Serialize};

use crate::{ContributorId, PayoutId, PayoutStatus, PoolId, PoolStatus, TxHash};

/// A settlement progress notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DistributionEvent {
    RunStarted {
        pool_id: PoolId,
        contributors: usize,
        distributable: u64,
    },
    PayoutUpdated {
        pool_id: PoolId,
        payout_id: PayoutId,
        contributor_id: ContributorId,
        status: PayoutStatus,
        reference: Option<TxHash>,
    },
    PayoutRetried {
        pool_id: PoolId,
        contributor_id: ContributorId,
        payout_id: PayoutId,
        attempt: u32,
    },
    RunFinished {
        pool_id: PoolId,
        status: PoolStatus,
        distributed_amount: u64,
    },
}

impl DistributionEvent {
    /// The pool this event concerns.
    pub fn pool_id(&self) -> PoolId {
        match self {
            DistributionEvent::RunStarted { pool_id, .. }
            | DistributionEvent::PayoutUpdated { pool_id, .. }
            | DistributionEvent::PayoutRetried { pool_id, .. }
            | DistributionEvent::RunFinished { pool_id, .. } => *pool_id,
        }
    }

    /// Event name as published to subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            DistributionEvent::RunStarted { .. } => "RunStarted",
            DistributionEvent::PayoutUpdated { .. } => "PayoutUpdated",
            DistributionEvent::PayoutRetried { .. } => "PayoutRetried",
            DistributionEvent::RunFinished { .. } => "RunFinished",
        }
    }
}
