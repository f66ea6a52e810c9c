//! Dev-only command handlers for the simulated chain.

use std::sync::Arc;

use creatorchain_chain::TransferSigner;
use creatorchain_db::queries::{contributors, projects};
use creatorchain_types::{unix_now, ContributorStatus, ShareBps, Token};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::parse_params;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

#[derive(Deserialize)]
struct SeedContributor {
    wallet: String,
    share_bps: u32,
    #[serde(default = "default_role")]
    role: String,
    #[serde(default = "default_contributor_status")]
    status: ContributorStatus,
}

fn default_role() -> String {
    "contributor".to_string()
}

fn default_contributor_status() -> ContributorStatus {
    ContributorStatus::Confirmed
}

#[derive(Deserialize)]
struct SeedParams {
    name: String,
    contributors: Vec<SeedContributor>,
}

#[derive(Deserialize)]
struct FundParams {
    amount: u64,
    /// Fund the native token instead of the payout token.
    #[serde(default)]
    native: bool,
}

/// Create an active project owned by the distributor with the given
/// contributors, in one transaction.
pub async fn seed_project(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: SeedParams = parse_params(params)?;
    if params.name.trim().is_empty() {
        return Err(RpcError::invalid_params("name must not be empty"));
    }

    let creator = state.signer.account();
    let now = unix_now();
    let mut db = state.db.lock().await;
    let tx = db
        .transaction()
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;

    let project_id = projects::insert(&tx, &params.name, &creator, now)
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;

    let mut contributor_ids = Vec::with_capacity(params.contributors.len());
    for c in &params.contributors {
        let share = ShareBps::new(c.share_bps).map_err(|e| RpcError::invalid_params(&e.to_string()))?;
        let id = contributors::insert(&tx, project_id, &c.wallet, share, &c.role, c.status, now)
            .map_err(|e| RpcError::internal_error(&e.to_string()))?;
        contributor_ids.push(id);
    }
    tx.commit()
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;

    info!(%project_id, contributors = contributor_ids.len(), "seeded project");
    Ok(serde_json::json!({
        "project_id": project_id,
        "contributor_ids": contributor_ids,
    }))
}

/// Credit the distributor account on the simulated chain.
pub async fn fund_distributor(state: &Arc<DaemonState>, params: &Value) -> Result {
    let params: FundParams = parse_params(params)?;
    let token = if params.native { Token::Native } else { state.token };
    let account = state.signer.account();
    state.chain.fund(account, token, params.amount);

    info!(%account, %token, amount = params.amount, "funded distributor");
    Ok(serde_json::json!({
        "account": account,
        "token": token,
        "credited": params.amount,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::events::EventBus;
    use creatorchain_chain::ChainReader;

    fn state() -> Arc<DaemonState> {
        let conn = creatorchain_db::open_memory().expect("open test db");
        Arc::new(crate::build_state(DaemonConfig::default(), conn, EventBus::new(16)).expect("state"))
    }

    #[tokio::test]
    async fn test_seed_project() {
        let state = state();
        let seeded = seed_project(
            &state,
            &serde_json::json!({
                "name": "EP",
                "contributors": [
                    { "wallet": "0x1111111111111111111111111111111111111111", "share_bps": 5000 },
                    { "wallet": "0x2222222222222222222222222222222222222222", "share_bps": 5000, "role": "producer" },
                ],
            }),
        )
        .await
        .expect("seed");
        assert_eq!(seeded["contributor_ids"].as_array().map(Vec::len), Some(2));

        let db = state.db.lock().await;
        let project_id = serde_json::from_value(seeded["project_id"].clone()).expect("id");
        let confirmed = contributors::confirmed_for_project(&db, project_id).expect("list");
        assert_eq!(confirmed.len(), 2);
        assert_eq!(confirmed[1].role, "producer");
    }

    #[tokio::test]
    async fn test_seed_rejects_bad_share_atomically() {
        let state = state();
        let err = seed_project(
            &state,
            &serde_json::json!({
                "name": "EP",
                "contributors": [
                    { "wallet": "0x1111111111111111111111111111111111111111", "share_bps": 0 },
                ],
            }),
        )
        .await
        .expect_err("zero share");
        assert_eq!(err.code, -32602);

        let db = state.db.lock().await;
        let count: i64 = db
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_fund_distributor() {
        let state = state();
        let account = state.signer.account();
        let before = state.chain.balance(account, Token::Native).await.expect("balance");

        fund_distributor(&state, &serde_json::json!({ "amount": 5, "native": true }))
            .await
            .expect("fund");
        let after = state.chain.balance(account, Token::Native).await.expect("balance");
        assert_eq!(after, before + 5);
    }
}
