//! Batch distribution runs.
//!
//! A run claims a pending pool, computes the allocation once, and pays each
//! contributor in allocation order. For every contributor it creates a
//! payout, moves it to processing, submits, waits for a final outcome and
//! persists it before moving on. A failure for one contributor is recorded
//! and the run continues with the next.
//!
//! Once every contributor has a final outcome the run credits completed
//! amounts to the pool and project and marks the pool completed (all paid)
//! or failed (anything else). Failed and ambiguous payouts are repaired one
//! contributor at a time with [`DistributionOrchestrator::retry`] or
//! [`DistributionOrchestrator::resolve_ambiguous`]. A pool left distributing
//! by a run that never finished is settled with
//! [`DistributionOrchestrator::recover_pool`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use creatorchain_chain::{ChainReader, TransferSigner};
use creatorchain_revenue::{calculate, FeePolicy, RevenueError, ShareEntry};
use creatorchain_types::{
    AllocationTable, ContributorId, ContributorStatus, DistributionEvent, Payout, PayoutId,
    PayoutStatus, PoolId, PoolStatus, ProjectId, ProjectStatus, RevenuePool, RevenueSource, Token,
    TxHash,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::executor::TransferExecutor;
use crate::ledger::{Ledger, PayoutUpdate};
use crate::locks::SignerLocks;
use crate::verifier::{PaymentVerifier, VerificationOutcome};
use crate::{ErrorClass, Result, SettlementConfig, SettlementError};

const CANCELLED_REASON: &str = "run cancelled before submission";
const INTERRUPTED_REASON: &str = "run interrupted before submission";
const UNKNOWN_BROADCAST_REASON: &str = "run interrupted, transfer may have been broadcast";

/// Final state of one contributor within a run or retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutOutcome {
    Completed,
    Failed,
    Ambiguous,
    /// Not attempted because the run was cancelled or interrupted. Stored
    /// as failed.
    Skipped,
}

impl PayoutOutcome {
    /// The payout status this outcome is stored as.
    pub fn status(&self) -> PayoutStatus {
        match self {
            PayoutOutcome::Completed => PayoutStatus::Completed,
            PayoutOutcome::Failed | PayoutOutcome::Skipped => PayoutStatus::Failed,
            PayoutOutcome::Ambiguous => PayoutStatus::Ambiguous,
        }
    }
}

/// Outcome for one contributor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutResult {
    pub contributor_id: ContributorId,
    pub payout_id: PayoutId,
    pub attempt: u32,
    pub amount: u64,
    pub outcome: PayoutOutcome,
    pub reference: Option<TxHash>,
    pub confirmations: Option<u64>,
    pub error_class: Option<ErrorClass>,
    pub error: Option<String>,
}

impl PayoutResult {
    fn new(payout: &Payout, outcome: PayoutOutcome) -> Self {
        Self {
            contributor_id: payout.contributor_id,
            payout_id: payout.id,
            attempt: payout.attempt,
            amount: payout.amount,
            outcome,
            reference: payout.reference,
            confirmations: None,
            error_class: None,
            error: None,
        }
    }

    fn with_error(mut self, class: ErrorClass, message: impl Into<String>) -> Self {
        self.error_class = Some(class);
        self.error = Some(message.into());
        self
    }
}

/// Result of a distribution run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub pool_id: PoolId,
    pub status: PoolStatus,
    pub allocation: AllocationTable,
    /// One entry per contributor, in allocation order.
    pub payouts: Vec<PayoutResult>,
    /// Amount completed by this run.
    pub distributed_amount: u64,
    pub cancelled: bool,
}

impl RunResult {
    pub fn count(&self, outcome: PayoutOutcome) -> usize {
        self.payouts.iter().filter(|p| p.outcome == outcome).count()
    }

    pub fn payout_for(&self, contributor_id: ContributorId) -> Option<&PayoutResult> {
        self.payouts
            .iter()
            .find(|p| p.contributor_id == contributor_id)
    }
}

/// Operator decision for a payout whose outcome could not be determined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// The funds arrived. `reference` replaces the stored one if given.
    Completed { reference: Option<TxHash> },
    /// The transfer never landed.
    Failed { reason: String },
}

/// Result of settling an interrupted run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub pool_id: PoolId,
    pub status: PoolStatus,
    /// Payouts this recovery moved to a final state, plus contributors the
    /// run never reached.
    pub payouts: Vec<PayoutResult>,
    /// Completed amount credited by this recovery.
    pub distributed_amount: u64,
}

/// Pools with a run or recovery in progress in this process.
#[derive(Clone, Debug, Default)]
struct ActiveRuns(Arc<Mutex<HashSet<PoolId>>>);

impl ActiveRuns {
    /// Mark `pool_id` busy until the returned guard drops. `None` if it
    /// already is.
    fn try_enter(&self, pool_id: PoolId) -> Option<ActiveRun> {
        let inserted = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pool_id);
        inserted.then(|| ActiveRun {
            runs: self.clone(),
            pool_id,
        })
    }
}

struct ActiveRun {
    runs: ActiveRuns,
    pool_id: PoolId,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.runs
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.pool_id);
    }
}

/// A pool and its full payout history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReport {
    pub pool: RevenuePool,
    /// Every attempt, oldest first.
    pub attempts: Vec<Payout>,
    /// Latest attempt per contributor.
    pub latest: Vec<Payout>,
}

/// Coordinates runs, retries and reconciliation over a ledger and a chain.
pub struct DistributionOrchestrator<L, C> {
    ledger: Arc<L>,
    executor: TransferExecutor<C>,
    verifier: PaymentVerifier<C>,
    fee: FeePolicy,
    config: SettlementConfig,
    locks: SignerLocks,
    active: ActiveRuns,
    events: Option<broadcast::Sender<DistributionEvent>>,
}

impl<L: Ledger, C: ChainReader> DistributionOrchestrator<L, C> {
    pub fn new(ledger: Arc<L>, chain: Arc<C>, fee: FeePolicy, config: SettlementConfig) -> Self {
        Self {
            executor: TransferExecutor::new(Arc::clone(&chain), config.submit_timeout),
            verifier: PaymentVerifier::new(chain, config.clone()),
            ledger,
            fee,
            config,
            locks: SignerLocks::new(),
            active: ActiveRuns::default(),
            events: None,
        }
    }

    /// Publish progress events to `events`.
    pub fn with_events(mut self, events: broadcast::Sender<DistributionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Share submission locks with other orchestrators paying from the
    /// same accounts.
    pub fn with_locks(mut self, locks: SignerLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn fee_policy(&self) -> FeePolicy {
        self.fee
    }

    /// Split preview with the configured fee. No side effects.
    pub fn preview_split(&self, total_amount: u64, shares: &[ShareEntry]) -> Result<AllocationTable> {
        Ok(creatorchain_revenue::preview_split(total_amount, &self.fee, shares)?)
    }

    /// Split preview against a project's current confirmed contributors.
    pub async fn preview_project(
        &self,
        project_id: ProjectId,
        total_amount: u64,
    ) -> Result<AllocationTable> {
        let shares = self.share_table(project_id).await?;
        self.preview_split(total_amount, &shares)
    }

    /// Open a pending pool for an active project.
    pub async fn open_pool(
        &self,
        project_id: ProjectId,
        source: RevenueSource,
        token: Token,
        total_amount: u64,
        source_metadata: Option<serde_json::Value>,
    ) -> Result<RevenuePool> {
        if total_amount == 0 {
            return Err(RevenueError::InvalidAmount.into());
        }
        let project = self.ledger.get_project(project_id).await?;
        if project.status != ProjectStatus::Active {
            return Err(SettlementError::Validation(format!(
                "project {project_id} is {}",
                project.status
            )));
        }

        let pool = self
            .ledger
            .create_pool(project_id, source, token, total_amount, source_metadata)
            .await?;
        tracing::info!(pool_id = %pool.id, %project_id, total_amount, %token, "revenue pool opened");
        Ok(pool)
    }

    /// Distribute a pending pool.
    pub async fn distribute<S: TransferSigner>(&self, pool_id: PoolId, signer: &S) -> Result<RunResult> {
        self.distribute_with_cancel(pool_id, signer, &CancellationToken::new())
            .await
    }

    /// Distribute a pending pool, stopping before the next contributor once
    /// `cancel` fires. Transfers already submitted are still verified.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any state changes. Ledger
    /// errors abort the run and leave the pool distributing until
    /// [`Self::recover_pool`] settles it.
    pub async fn distribute_with_cancel<S: TransferSigner>(
        &self,
        pool_id: PoolId,
        signer: &S,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let pool = self.ledger.get_pool(pool_id).await?;
        if pool.status != PoolStatus::Pending {
            return Err(SettlementError::PoolNotPending {
                pool_id,
                status: pool.status,
            });
        }
        let shares = self.share_table(pool.project_id).await?;
        let allocation = calculate(pool.total_amount, &self.fee, &shares)?;

        let Some(_run) = self.active.try_enter(pool_id) else {
            return Err(SettlementError::PoolNotPending {
                pool_id,
                status: PoolStatus::Distributing,
            });
        };
        if !self
            .ledger
            .transition_pool(pool_id, PoolStatus::Pending, PoolStatus::Distributing)
            .await?
        {
            let current = self.ledger.get_pool(pool_id).await?;
            return Err(SettlementError::PoolNotPending {
                pool_id,
                status: current.status,
            });
        }
        self.ledger
            .record_pool_fee(pool_id, allocation.fee_bps, allocation.platform_fee)
            .await?;

        tracing::info!(
            %pool_id,
            signer = %signer.account(),
            contributors = allocation.entries.len(),
            distributable = allocation.distributable,
            platform_fee = allocation.platform_fee,
            "distribution started"
        );
        self.emit(DistributionEvent::RunStarted {
            pool_id,
            contributors: allocation.entries.len(),
            distributable: allocation.distributable,
        });

        let mut payouts = Vec::with_capacity(allocation.entries.len());
        let mut cancelled = false;
        for entry in &allocation.entries {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(%pool_id, remaining = allocation.entries.len() - payouts.len(), "distribution cancelled");
            }
            let result = if cancelled {
                self.skip(&pool, entry.contributor_id, entry.amount, CANCELLED_REASON)
                    .await?
            } else {
                self.pay(&pool, entry.contributor_id, &entry.wallet, entry.amount, signer)
                    .await?
            };
            payouts.push(result);
        }

        let distributed_amount: u64 = payouts
            .iter()
            .filter(|p| p.outcome == PayoutOutcome::Completed)
            .map(|p| p.amount)
            .sum();
        if distributed_amount > 0 {
            self.ledger
                .record_distribution(pool_id, distributed_amount)
                .await?;
        }
        // Payouts resolved by hand while the run was going count too.
        let status = self.refresh_pool_status(pool_id).await?;

        let result = RunResult {
            pool_id,
            status,
            allocation,
            payouts,
            distributed_amount,
            cancelled,
        };
        tracing::info!(
            %pool_id,
            %status,
            distributed_amount,
            completed = result.count(PayoutOutcome::Completed),
            failed = result.count(PayoutOutcome::Failed),
            ambiguous = result.count(PayoutOutcome::Ambiguous),
            skipped = result.count(PayoutOutcome::Skipped),
            "distribution finished"
        );
        self.emit(DistributionEvent::RunFinished {
            pool_id,
            status,
            distributed_amount,
        });
        Ok(result)
    }

    /// Start a new attempt for one contributor of a failed pool.
    ///
    /// An ambiguous latest attempt is re-checked on chain first. If it
    /// landed it is completed without sending anything; if it is still
    /// unknown the retry is refused with
    /// [`SettlementError::AmbiguousOutcome`].
    pub async fn retry<S: TransferSigner>(
        &self,
        pool_id: PoolId,
        contributor_id: ContributorId,
        signer: &S,
    ) -> Result<PayoutResult> {
        let pool = self.ledger.get_pool(pool_id).await?;
        let not_allowed = |reason: &str| SettlementError::RetryNotAllowed {
            pool_id,
            contributor_id,
            reason: reason.to_string(),
        };
        match pool.status {
            PoolStatus::Failed => {}
            PoolStatus::Distributing => {
                return Err(SettlementError::Conflict(format!(
                    "pool {pool_id} has a run in progress"
                )))
            }
            PoolStatus::Pending => return Err(not_allowed("pool has not been distributed")),
            PoolStatus::Completed => return Err(not_allowed("pool is completed")),
        }

        let latest = self
            .ledger
            .latest_payout(pool_id, contributor_id)
            .await?
            .ok_or_else(|| {
                SettlementError::NotFound(format!(
                    "payout for contributor {contributor_id} in pool {pool_id}"
                ))
            })?;

        match latest.status {
            PayoutStatus::Failed => {}
            PayoutStatus::Completed => return Err(not_allowed("payout is completed")),
            PayoutStatus::Pending | PayoutStatus::Processing => {
                return Err(SettlementError::Conflict(format!(
                    "payout {} is in flight",
                    latest.id
                )))
            }
            PayoutStatus::Ambiguous => {
                let Some(reference) = latest.reference else {
                    return Err(SettlementError::AmbiguousOutcome {
                        payout_id: latest.id,
                        reference: None,
                    });
                };
                tracing::info!(payout_id = %latest.id, %reference, "re-checking ambiguous payout");
                let outcome = self
                    .verifier
                    .await_confirmation(
                        reference,
                        self.config.required_confirmations,
                        self.config.confirmation_timeout,
                    )
                    .await;
                if !outcome.is_final() {
                    return Err(SettlementError::AmbiguousOutcome {
                        payout_id: latest.id,
                        reference: Some(reference),
                    });
                }
                let result = self.record_outcome(&latest, reference, outcome).await?;
                if result.outcome == PayoutOutcome::Completed {
                    self.ledger.record_distribution(pool_id, result.amount).await?;
                    self.refresh_pool_status(pool_id).await?;
                    return Ok(result);
                }
                // Reverted: safe to send again.
            }
        }

        let contributor = self.ledger.get_contributor(contributor_id).await?;
        if contributor.project_id != pool.project_id {
            return Err(SettlementError::Validation(format!(
                "contributor {contributor_id} does not belong to project {}",
                pool.project_id
            )));
        }
        if contributor.status != ContributorStatus::Confirmed {
            return Err(SettlementError::Validation(format!(
                "contributor {contributor_id} is {}, not confirmed",
                contributor.status
            )));
        }

        let result = self
            .pay(&pool, contributor_id, &contributor.wallet, latest.amount, signer)
            .await?;
        tracing::info!(
            %pool_id,
            %contributor_id,
            payout_id = %result.payout_id,
            attempt = result.attempt,
            outcome = ?result.outcome,
            "payout retried"
        );
        self.emit(DistributionEvent::PayoutRetried {
            pool_id,
            contributor_id,
            payout_id: result.payout_id,
            attempt: result.attempt,
        });

        if result.outcome == PayoutOutcome::Completed && result.amount > 0 {
            self.ledger.record_distribution(pool_id, result.amount).await?;
        }
        self.refresh_pool_status(pool_id).await?;
        Ok(result)
    }

    /// Settle an ambiguous payout by hand after checking the chain
    /// out of band.
    pub async fn resolve_ambiguous(&self, payout_id: PayoutId, resolution: Resolution) -> Result<Payout> {
        let payout = self.ledger.get_payout(payout_id).await?;
        if payout.status != PayoutStatus::Ambiguous {
            return Err(SettlementError::Validation(format!(
                "payout {payout_id} is {}, not ambiguous",
                payout.status
            )));
        }

        match &resolution {
            Resolution::Completed { reference } => {
                let update = PayoutUpdate::new(PayoutStatus::Completed)
                    .with_reference(reference.or(payout.reference));
                self.ledger.update_payout_status(payout_id, update).await?;
                self.ledger
                    .record_distribution(payout.pool_id, payout.amount)
                    .await?;
            }
            Resolution::Failed { reason } => {
                self.ledger
                    .update_payout_status(payout_id, PayoutUpdate::failed(reason.clone()))
                    .await?;
            }
        }

        let pool = self.ledger.get_pool(payout.pool_id).await?;
        if pool.status != PoolStatus::Distributing {
            self.refresh_pool_status(pool.id).await?;
        }

        let resolved = self.ledger.get_payout(payout_id).await?;
        tracing::info!(%payout_id, status = %resolved.status, "ambiguous payout resolved");
        self.emit(DistributionEvent::PayoutUpdated {
            pool_id: resolved.pool_id,
            payout_id,
            contributor_id: resolved.contributor_id,
            status: resolved.status,
            reference: resolved.reference,
        });
        Ok(resolved)
    }

    /// Settle a pool left distributing by a run that stopped early, after
    /// a crash or a ledger error.
    ///
    /// Processing payouts with a recorded reference are verified again.
    /// A processing payout without one may have been broadcast and becomes
    /// ambiguous. A pending payout was never submitted and fails, as do
    /// contributors the run never reached. Completed amounts not yet
    /// credited are then credited and the pool status is recomputed.
    ///
    /// Runs in this orchestrator are refused with
    /// [`SettlementError::Conflict`]. Callers sharing the ledger with other
    /// processes must make sure none of them is still running the pool.
    pub async fn recover_pool(&self, pool_id: PoolId) -> Result<RecoveryResult> {
        let Some(_run) = self.active.try_enter(pool_id) else {
            return Err(SettlementError::Conflict(format!(
                "pool {pool_id} has a run in progress"
            )));
        };
        let pool = self.ledger.get_pool(pool_id).await?;
        if pool.status != PoolStatus::Distributing {
            return Err(SettlementError::Validation(format!(
                "pool {pool_id} is {}, not distributing",
                pool.status
            )));
        }
        let fee = match pool.fee_bps {
            Some(fee_bps) => FeePolicy::new(fee_bps)?,
            None => self.fee,
        };
        let shares = self.share_table(pool.project_id).await?;
        let allocation = calculate(pool.total_amount, &fee, &shares)?;

        tracing::warn!(%pool_id, "recovering interrupted distribution");
        let latest = self.ledger.latest_payouts(pool_id).await?;
        let reached: HashSet<ContributorId> = latest.iter().map(|p| p.contributor_id).collect();

        let mut payouts = Vec::new();
        for payout in &latest {
            let result = match (payout.status, payout.reference) {
                (PayoutStatus::Processing, Some(reference)) => {
                    let outcome = self
                        .verifier
                        .await_confirmation(
                            reference,
                            self.config.required_confirmations,
                            self.config.confirmation_timeout,
                        )
                        .await;
                    payouts.push(self.record_outcome(payout, reference, outcome).await?);
                    continue;
                }
                (PayoutStatus::Processing, None) if payout.amount == 0 => {
                    self.ledger
                        .update_payout_status(payout.id, PayoutUpdate::completed(0, None))
                        .await?;
                    PayoutResult::new(payout, PayoutOutcome::Completed)
                }
                (PayoutStatus::Processing, None) => {
                    self.ledger
                        .update_payout_status(
                            payout.id,
                            PayoutUpdate::ambiguous(UNKNOWN_BROADCAST_REASON),
                        )
                        .await?;
                    PayoutResult::new(payout, PayoutOutcome::Ambiguous)
                        .with_error(ErrorClass::Ambiguous, UNKNOWN_BROADCAST_REASON)
                }
                (PayoutStatus::Pending, _) => {
                    self.ledger
                        .update_payout_status(payout.id, PayoutUpdate::failed(INTERRUPTED_REASON))
                        .await?;
                    PayoutResult::new(payout, PayoutOutcome::Failed)
                        .with_error(ErrorClass::Submission, INTERRUPTED_REASON)
                }
                _ => continue,
            };
            self.emit_payout(pool_id, &result);
            payouts.push(result);
        }

        for entry in allocation
            .entries
            .iter()
            .filter(|e| !reached.contains(&e.contributor_id))
        {
            payouts.push(
                self.skip(&pool, entry.contributor_id, entry.amount, INTERRUPTED_REASON)
                    .await?,
            );
        }

        let completed: u64 = self
            .ledger
            .pool_payouts(pool_id)
            .await?
            .iter()
            .filter(|p| p.status == PayoutStatus::Completed)
            .map(|p| p.amount)
            .sum();
        let credited = self.ledger.get_pool(pool_id).await?.distributed_amount;
        let distributed_amount = completed.saturating_sub(credited);
        if distributed_amount > 0 {
            self.ledger
                .record_distribution(pool_id, distributed_amount)
                .await?;
        }
        let status = self.refresh_pool_status(pool_id).await?;

        tracing::info!(
            %pool_id,
            %status,
            distributed_amount,
            settled = payouts.len(),
            "interrupted distribution recovered"
        );
        self.emit(DistributionEvent::RunFinished {
            pool_id,
            status,
            distributed_amount,
        });
        Ok(RecoveryResult {
            pool_id,
            status,
            payouts,
            distributed_amount,
        })
    }

    /// A pool with its payout history.
    pub async fn pool_report(&self, pool_id: PoolId) -> Result<PoolReport> {
        Ok(PoolReport {
            pool: self.ledger.get_pool(pool_id).await?,
            attempts: self.ledger.pool_payouts(pool_id).await?,
            latest: self.ledger.latest_payouts(pool_id).await?,
        })
    }

    async fn share_table(&self, project_id: ProjectId) -> Result<Vec<ShareEntry>> {
        let contributors = self.ledger.confirmed_contributors(project_id).await?;
        Ok(contributors.iter().map(ShareEntry::from).collect())
    }

    /// One attempt for one contributor, persisted at every step.
    async fn pay<S: TransferSigner>(
        &self,
        pool: &RevenuePool,
        contributor_id: ContributorId,
        wallet: &str,
        amount: u64,
        signer: &S,
    ) -> Result<PayoutResult> {
        let payout = self
            .ledger
            .create_payout(pool.id, contributor_id, amount)
            .await?;
        self.ledger
            .update_payout_status(payout.id, PayoutUpdate::new(PayoutStatus::Processing))
            .await?;

        if amount == 0 {
            self.ledger
                .update_payout_status(payout.id, PayoutUpdate::completed(0, None))
                .await?;
            let result = PayoutResult::new(&payout, PayoutOutcome::Completed);
            self.emit_payout(pool.id, &result);
            return Ok(result);
        }

        let submitted = {
            let _submission = self.locks.acquire(signer.account()).await;
            self.executor.submit(signer, wallet, amount, pool.token).await
        };

        let handle = match submitted {
            Ok(handle) => handle,
            Err(err) => {
                let class = err.class();
                let reason = err.to_string();
                let (update, outcome) = if class == ErrorClass::Ambiguous {
                    (PayoutUpdate::ambiguous(reason.clone()), PayoutOutcome::Ambiguous)
                } else {
                    (PayoutUpdate::failed(reason.clone()), PayoutOutcome::Failed)
                };
                self.ledger.update_payout_status(payout.id, update).await?;
                tracing::warn!(
                    pool_id = %pool.id,
                    %contributor_id,
                    payout_id = %payout.id,
                    ?class,
                    error = %reason,
                    "payout not submitted"
                );
                let result = PayoutResult::new(&payout, outcome).with_error(class, reason);
                self.emit_payout(pool.id, &result);
                return Ok(result);
            }
        };

        self.ledger
            .record_payout_reference(payout.id, handle.reference)
            .await?;
        self.emit(DistributionEvent::PayoutUpdated {
            pool_id: pool.id,
            payout_id: payout.id,
            contributor_id,
            status: PayoutStatus::Processing,
            reference: Some(handle.reference),
        });

        let outcome = self
            .verifier
            .await_confirmation(
                handle.reference,
                self.config.required_confirmations,
                self.config.confirmation_timeout,
            )
            .await;
        self.record_outcome(&payout, handle.reference, outcome).await
    }

    /// Persist a verification outcome for a payout.
    async fn record_outcome(
        &self,
        payout: &Payout,
        reference: TxHash,
        outcome: VerificationOutcome,
    ) -> Result<PayoutResult> {
        let (update, mut result) = match outcome {
            VerificationOutcome::Completed {
                confirmations,
                block_number,
            } => {
                let mut result = PayoutResult::new(payout, PayoutOutcome::Completed);
                result.confirmations = Some(confirmations);
                (
                    PayoutUpdate::completed(confirmations, Some(block_number)),
                    result,
                )
            }
            VerificationOutcome::Failed { block_number } => {
                let reason = format!("transfer reverted in block {block_number}");
                (
                    PayoutUpdate::failed(reason.clone()).with_block(Some(block_number)),
                    PayoutResult::new(payout, PayoutOutcome::Failed)
                        .with_error(ErrorClass::Reverted, reason),
                )
            }
            VerificationOutcome::Ambiguous {
                confirmations,
                block_number,
                reason,
            } => {
                let mut update = PayoutUpdate::ambiguous(reason.clone()).with_block(block_number);
                update.confirmations = Some(confirmations);
                (
                    update,
                    PayoutResult::new(payout, PayoutOutcome::Ambiguous)
                        .with_error(ErrorClass::Ambiguous, reason),
                )
            }
        };
        self.ledger
            .update_payout_status(payout.id, update.with_reference(Some(reference)))
            .await?;
        result.reference = Some(reference);

        match result.outcome {
            PayoutOutcome::Completed => {
                tracing::info!(payout_id = %payout.id, %reference, amount = payout.amount, "payout completed")
            }
            _ => tracing::warn!(
                payout_id = %payout.id,
                %reference,
                outcome = ?result.outcome,
                error = result.error.as_deref().unwrap_or_default(),
                "payout not completed"
            ),
        }
        self.emit_payout(payout.pool_id, &result);
        Ok(result)
    }

    /// Record a contributor the run did not reach.
    async fn skip(
        &self,
        pool: &RevenuePool,
        contributor_id: ContributorId,
        amount: u64,
        reason: &str,
    ) -> Result<PayoutResult> {
        let payout = self
            .ledger
            .create_payout(pool.id, contributor_id, amount)
            .await?;
        self.ledger
            .update_payout_status(payout.id, PayoutUpdate::failed(reason))
            .await?;
        let mut result = PayoutResult::new(&payout, PayoutOutcome::Skipped);
        result.error = Some(reason.to_string());
        self.emit_payout(pool.id, &result);
        Ok(result)
    }

    /// Recompute a pool's status from the latest attempts.
    async fn refresh_pool_status(&self, pool_id: PoolId) -> Result<PoolStatus> {
        let latest = self.ledger.latest_payouts(pool_id).await?;
        let status = if !latest.is_empty()
            && latest.iter().all(|p| p.status == PayoutStatus::Completed)
        {
            PoolStatus::Completed
        } else {
            PoolStatus::Failed
        };
        self.ledger.set_pool_status(pool_id, status).await?;
        tracing::debug!(%pool_id, %status, "pool status refreshed");
        Ok(status)
    }

    fn emit_payout(&self, pool_id: PoolId, result: &PayoutResult) {
        self.emit(DistributionEvent::PayoutUpdated {
            pool_id,
            payout_id: result.payout_id,
            contributor_id: result.contributor_id,
            status: result.outcome.status(),
            reference: result.reference,
        });
    }

    fn emit(&self, event: DistributionEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}
