//! Ledger interface.
//!
//! The orchestrator reads pools and contributors from, and writes payout
//! state to, a [`Ledger`]. Every payout state change is one call, and each
//! call is durable when it returns, so a run interrupted at any point leaves
//! a consistent record of what was attempted.

use std::future::Future;
use std::sync::Arc;

use creatorchain_db::queries::{contributors, payouts, pools, projects};
use creatorchain_types::{
    unix_now, Contributor, ContributorId, Payout, PayoutId, PayoutStatus, PoolId, PoolStatus,
    Project, ProjectId, RevenuePool, RevenueSource, Token, TxHash,
};
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::Result;

/// A payout status change and the details known when it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayoutUpdate {
    pub status: PayoutStatus,
    pub reference: Option<TxHash>,
    pub failure_reason: Option<String>,
    pub confirmations: Option<u64>,
    pub block_number: Option<u64>,
}

impl PayoutUpdate {
    pub fn new(status: PayoutStatus) -> Self {
        Self {
            status,
            reference: None,
            failure_reason: None,
            confirmations: None,
            block_number: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::new(PayoutStatus::Failed)
        }
    }

    pub fn ambiguous(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::new(PayoutStatus::Ambiguous)
        }
    }

    pub fn completed(confirmations: u64, block_number: Option<u64>) -> Self {
        Self {
            confirmations: Some(confirmations),
            block_number,
            ..Self::new(PayoutStatus::Completed)
        }
    }

    pub fn with_reference(mut self, reference: Option<TxHash>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_block(mut self, block_number: Option<u64>) -> Self {
        self.block_number = block_number;
        self
    }
}

/// Durable storage for projects, pools and payouts.
///
/// Implementations must enforce at most one pending or processing payout
/// per `(pool, contributor)`: [`Ledger::create_payout`] fails with
/// [`crate::SettlementError::Conflict`] when one exists.
pub trait Ledger: Send + Sync {
    fn get_project(&self, id: ProjectId) -> impl Future<Output = Result<Project>> + Send;

    fn get_contributor(&self, id: ContributorId) -> impl Future<Output = Result<Contributor>> + Send;

    /// Confirmed contributors of a project in allocation order.
    fn confirmed_contributors(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<Contributor>>> + Send;

    /// Open a pending pool and credit it to the project's revenue.
    fn create_pool(
        &self,
        project_id: ProjectId,
        source: RevenueSource,
        token: Token,
        total_amount: u64,
        source_metadata: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<RevenuePool>> + Send;

    fn get_pool(&self, id: PoolId) -> impl Future<Output = Result<RevenuePool>> + Send;

    /// Compare-and-set the pool status. Returns `false` if the pool was not
    /// in `from`.
    fn transition_pool(
        &self,
        id: PoolId,
        from: PoolStatus,
        to: PoolStatus,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn set_pool_status(&self, id: PoolId, status: PoolStatus) -> impl Future<Output = Result<()>> + Send;

    /// Record the fee rate and amount a run applied.
    fn record_pool_fee(
        &self,
        id: PoolId,
        fee_bps: u32,
        platform_fee: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Credit completed payout amounts to the pool and its project together.
    fn record_distribution(&self, id: PoolId, delta: u64) -> impl Future<Output = Result<()>> + Send;

    /// Insert the next pending attempt for a pair.
    fn create_payout(
        &self,
        pool_id: PoolId,
        contributor_id: ContributorId,
        amount: u64,
    ) -> impl Future<Output = Result<Payout>> + Send;

    fn get_payout(&self, id: PayoutId) -> impl Future<Output = Result<Payout>> + Send;

    fn update_payout_status(
        &self,
        id: PayoutId,
        update: PayoutUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist the reference of a broadcast transfer ahead of its outcome.
    fn record_payout_reference(
        &self,
        id: PayoutId,
        reference: TxHash,
    ) -> impl Future<Output = Result<()>> + Send;

    fn latest_payout(
        &self,
        pool_id: PoolId,
        contributor_id: ContributorId,
    ) -> impl Future<Output = Result<Option<Payout>>> + Send;

    /// Every attempt against a pool, oldest first.
    fn pool_payouts(&self, pool_id: PoolId) -> impl Future<Output = Result<Vec<Payout>>> + Send;

    /// The latest attempt of each contributor paid from a pool.
    fn latest_payouts(&self, pool_id: PoolId) -> impl Future<Output = Result<Vec<Payout>>> + Send;
}

/// [`Ledger`] over a shared SQLite connection.
#[derive(Clone)]
pub struct SqliteLedger {
    db: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// The underlying connection, for callers that also manage projects and
    /// contributors.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }
}

impl Ledger for SqliteLedger {
    async fn get_project(&self, id: ProjectId) -> Result<Project> {
        let db = self.db.lock().await;
        Ok(projects::get(&db, id)?)
    }

    async fn get_contributor(&self, id: ContributorId) -> Result<Contributor> {
        let db = self.db.lock().await;
        Ok(contributors::get(&db, id)?)
    }

    async fn confirmed_contributors(&self, project_id: ProjectId) -> Result<Vec<Contributor>> {
        let db = self.db.lock().await;
        Ok(contributors::confirmed_for_project(&db, project_id)?)
    }

    async fn create_pool(
        &self,
        project_id: ProjectId,
        source: RevenueSource,
        token: Token,
        total_amount: u64,
        source_metadata: Option<serde_json::Value>,
    ) -> Result<RevenuePool> {
        let db = self.db.lock().await;
        let id = pools::insert(
            &db,
            project_id,
            source,
            &token,
            total_amount,
            source_metadata.as_ref(),
            unix_now(),
        )?;
        Ok(pools::get(&db, id)?)
    }

    async fn get_pool(&self, id: PoolId) -> Result<RevenuePool> {
        let db = self.db.lock().await;
        Ok(pools::get(&db, id)?)
    }

    async fn transition_pool(&self, id: PoolId, from: PoolStatus, to: PoolStatus) -> Result<bool> {
        let db = self.db.lock().await;
        Ok(pools::transition(&db, id, from, to, unix_now())?)
    }

    async fn set_pool_status(&self, id: PoolId, status: PoolStatus) -> Result<()> {
        let db = self.db.lock().await;
        Ok(pools::set_status(&db, id, status, unix_now())?)
    }

    async fn record_pool_fee(&self, id: PoolId, fee_bps: u32, platform_fee: u64) -> Result<()> {
        let db = self.db.lock().await;
        Ok(pools::record_fee(&db, id, fee_bps, platform_fee, unix_now())?)
    }

    async fn record_distribution(&self, id: PoolId, delta: u64) -> Result<()> {
        let db = self.db.lock().await;
        Ok(pools::record_distribution(&db, id, delta, unix_now())?)
    }

    async fn create_payout(
        &self,
        pool_id: PoolId,
        contributor_id: ContributorId,
        amount: u64,
    ) -> Result<Payout> {
        let db = self.db.lock().await;
        Ok(payouts::insert(&db, pool_id, contributor_id, amount, unix_now())?)
    }

    async fn get_payout(&self, id: PayoutId) -> Result<Payout> {
        let db = self.db.lock().await;
        Ok(payouts::get(&db, id)?)
    }

    async fn update_payout_status(&self, id: PayoutId, update: PayoutUpdate) -> Result<()> {
        let mut change = payouts::StatusUpdate::new(update.status)
            .reference(update.reference.as_ref());
        if let Some(reason) = update.failure_reason.as_deref() {
            change = change.failure_reason(reason);
        }
        change.confirmations = update.confirmations;
        change.block_number = update.block_number;

        let db = self.db.lock().await;
        Ok(payouts::update_status(&db, id, &change, unix_now())?)
    }

    async fn record_payout_reference(&self, id: PayoutId, reference: TxHash) -> Result<()> {
        let db = self.db.lock().await;
        Ok(payouts::record_reference(&db, id, &reference, unix_now())?)
    }

    async fn latest_payout(
        &self,
        pool_id: PoolId,
        contributor_id: ContributorId,
    ) -> Result<Option<Payout>> {
        let db = self.db.lock().await;
        Ok(payouts::latest_for(&db, pool_id, contributor_id)?)
    }

    async fn pool_payouts(&self, pool_id: PoolId) -> Result<Vec<Payout>> {
        let db = self.db.lock().await;
        Ok(payouts::list_for_pool(&db, pool_id)?)
    }

    async fn latest_payouts(&self, pool_id: PoolId) -> Result<Vec<Payout>> {
        let db = self.db.lock().await;
        Ok(payouts::latest_per_contributor(&db, pool_id)?)
    }
}
