//! Projects and their contributors.
//!
//! Both are created by onboarding outside the settlement engine; the engine
//! only reads them, apart from the project's revenue totals.

use serde::{Deserialize, Serialize};

use crate::{Address, ContributorId, ProjectId, ShareBps};

tagged_enum! {
    /// Project lifecycle status.
    pub enum ProjectStatus: "project status" {
        Active => "active",
        Inactive => "inactive",
        Completed => "completed",
    }
}

tagged_enum! {
    /// Contributor onboarding status. Only confirmed contributors are paid.
    pub enum ContributorStatus: "contributor status" {
        Pending => "pending",
        Confirmed => "confirmed",
        Declined => "declined",
    }
}

/// A revenue-sharing project.
///
/// Invariant after reconciliation: `total_distributed <= total_revenue`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub creator: Address,
    pub status: ProjectStatus,
    /// Cumulative pool amounts opened for this project.
    pub total_revenue: u64,
    /// Cumulative amounts of completed payouts.
    pub total_distributed: u64,
    pub created_at: u64,
}

/// A contributor's agreed share of a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: ContributorId,
    pub project_id: ProjectId,
    /// Payout address as recorded at onboarding. Validated before each
    /// transfer rather than on load, so one bad address cannot block a run.
    pub wallet: String,
    pub share: ShareBps,
    pub role: String,
    pub status: ContributorStatus,
    pub created_at: u64,
}
