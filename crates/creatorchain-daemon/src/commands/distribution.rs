//! Distribution command handlers.

use std::sync::Arc;

use creatorchain_chain::{ChainReader, TransferSigner};
use creatorchain_revenue::ShareEntry;
use creatorchain_settlement::{ErrorClass, PayoutOutcome, Resolution};
use creatorchain_types::{
    ContributorId, PayoutId, PoolId, ProjectId, RevenueSource, ShareBps, Token,
};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{parse_params, to_json};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct PoolParams {
    pool_id: PoolId,
}

#[derive(Deserialize)]
struct ShareParam {
    contributor_id: ContributorId,
    wallet: String,
    share_bps: u32,
}

#[derive(Deserialize)]
struct PreviewParams {
    total_amount: u64,
    #[serde(default)]
    project_id: Option<ProjectId>,
    #[serde(default)]
    shares: Option<Vec<ShareParam>>,
}

#[derive(Deserialize)]
struct OpenPoolParams {
    project_id: ProjectId,
    total_amount: u64,
    #[serde(default = "default_source")]
    source: RevenueSource,
    #[serde(default)]
    source_metadata: Option<Value>,
}

fn default_source() -> RevenueSource {
    RevenueSource::Direct
}

#[derive(Deserialize)]
struct RetryParams {
    pool_id: PoolId,
    contributor_id: ContributorId,
}

#[derive(Deserialize)]
struct ResolveParams {
    payout_id: PayoutId,
    #[serde(flatten)]
    resolution: Resolution,
}

/// Preview a split, either for an explicit share table or for a project's
/// confirmed contributors.
pub async fn preview_split(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: PreviewParams = parse_params(params)?;
    let table = match (params.shares, params.project_id) {
        (Some(shares), _) => {
            let entries = shares
                .into_iter()
                .map(|s| {
                    let share = ShareBps::new(s.share_bps)
                        .map_err(|e| RpcError::invalid_params(&e.to_string()))?;
                    Ok(ShareEntry {
                        contributor_id: s.contributor_id,
                        wallet: s.wallet,
                        share,
                    })
                })
                .collect::<std::result::Result<Vec<_>, RpcError>>()?;
            state
                .orchestrator
                .preview_split(params.total_amount, &entries)?
        }
        (None, Some(project_id)) => {
            state
                .orchestrator
                .preview_project(project_id, params.total_amount)
                .await?
        }
        (None, None) => return Err(RpcError::invalid_params("project_id or shares required")),
    };
    to_json(&table)
}

/// Open a pending pool in the configured payout token.
pub async fn open_pool(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: OpenPoolParams = parse_params(params)?;
    let pool = state
        .orchestrator
        .open_pool(
            params.project_id,
            params.source,
            state.token,
            params.total_amount,
            params.source_metadata,
        )
        .await?;
    to_json(&pool)
}

/// Run a distribution to completion and return per-contributor results.
pub async fn distribute(state: &Arc<DaemonState>, params: &Value) -> Result {
    let PoolParams { pool_id } = parse_params(params)?;

    let cancel = CancellationToken::new();
    {
        let mut runs = state.runs.lock().await;
        if runs.contains_key(&pool_id) {
            return Err(RpcError::conflict(&format!(
                "pool {pool_id} already has a run in progress"
            )));
        }
        runs.insert(pool_id, cancel.clone());
    }

    let result = state
        .orchestrator
        .distribute_with_cancel(pool_id, &state.signer, &cancel)
        .await;
    state.runs.lock().await.remove(&pool_id);

    to_json(&result?)
}

/// Retry one contributor. A payout that does not complete is reported as an
/// error carrying the payout result.
pub async fn retry_payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: RetryParams = parse_params(params)?;
    let result = state
        .orchestrator
        .retry(params.pool_id, params.contributor_id, &state.signer)
        .await?;

    if result.outcome == PayoutOutcome::Completed {
        return to_json(&result);
    }
    let class = result.error_class.unwrap_or(ErrorClass::Internal);
    Err(RpcError::payout_failed(class, to_json(&result)?))
}

/// Manually settle an ambiguous payout.
pub async fn resolve_payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: ResolveParams = parse_params(params)?;
    let payout = state
        .orchestrator
        .resolve_ambiguous(params.payout_id, params.resolution)
        .await?;
    to_json(&payout)
}

/// Ask a running distribution to stop before its next contributor.
pub async fn cancel_distribution(state: &Arc<DaemonState>, params: &Value) -> Result {
    let PoolParams { pool_id } = parse_params(params)?;
    let runs = state.runs.lock().await;
    let cancel = runs
        .get(&pool_id)
        .ok_or_else(|| RpcError::not_found(&format!("no run in progress for pool {pool_id}")))?;
    cancel.cancel();
    info!(%pool_id, "distribution cancellation requested");
    Ok(serde_json::json!({ "pool_id": pool_id, "cancelled": true }))
}

/// Settle a pool left distributing by a run that did not finish.
pub async fn recover_pool(state: &Arc<DaemonState>, params: &Value) -> Result {
    let PoolParams { pool_id } = parse_params(params)?;
    if state.runs.lock().await.contains_key(&pool_id) {
        return Err(RpcError::conflict(&format!(
            "pool {pool_id} has a run in progress"
        )));
    }
    let recovered = state.orchestrator.recover_pool(pool_id).await?;
    info!(%pool_id, status = %recovered.status, "pool recovered over RPC");
    to_json(&recovered)
}

/// Pool with its full payout history.
pub async fn get_pool_report(state: &Arc<DaemonState>, params: &Value) -> Result {
    let PoolParams { pool_id } = parse_params(params)?;
    let report = state.orchestrator.pool_report(pool_id).await?;
    to_json(&report)
}

/// Distributor balances in the payout token and the native token.
pub async fn get_distributor_balance(state: &Arc<DaemonState>) -> Result {
    let account = state.signer.account();
    let balance = state
        .chain
        .balance(account, state.token)
        .await
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;
    let native_balance = state
        .chain
        .balance(account, Token::Native)
        .await
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;

    Ok(serde_json::json!({
        "chain_id": state.config.chain.chain_id,
        "account": account,
        "token": state.token,
        "balance": balance,
        "native_balance": native_balance,
    }))
}
