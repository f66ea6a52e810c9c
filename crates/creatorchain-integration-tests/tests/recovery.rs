//! Integration test: partial failure and recovery.
//!
//! Each scenario breaks one contributor's payout in a different way, then
//! checks that the others are unaffected, that the pool reports the partial
//! outcome, and that a targeted retry finishes the pool without paying
//! anyone twice:
//! 1. Distributor runs out of funds mid-batch
//! 2. One recipient's transfer reverts on chain
//! 3. A transfer is broadcast but never confirms (ambiguous)
//! 4. The signer is unavailable
//! 5. The run is cancelled part way through
//! 6. The process dies mid-run and a fresh engine settles the pool

use std::time::Duration;

use creatorchain_chain::{TransferRequest, TransferSigner};
use creatorchain_integration_tests::{wallet, Fixture, DISTRIBUTOR, USDC};
use creatorchain_settlement::{
    ErrorClass, Ledger, PayoutOutcome, PayoutUpdate, SettlementError, SignerLocks,
};
use creatorchain_types::{Address, DistributionEvent, PayoutStatus, PoolStatus, Token, TxHash};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn insufficient_balance_mid_batch_then_retry() {
    let fx = Fixture::new().expect("fixture");
    // Enough for the first contributor only.
    fx.fund_usdc(60 * USDC);
    let (project, ids) = fx
        .project("Split Single", &[(wallet(1), 6000), (wallet(2), 4000)])
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 100 * USDC).await.expect("pool");

    // =========================================================
    // Step 1: run stops short on the second contributor
    // =========================================================
    let run = fx
        .orchestrator
        .distribute(pool_id, &fx.signer)
        .await
        .expect("run");
    assert_eq!(run.status, PoolStatus::Failed);
    assert_eq!(run.distributed_amount, 58_800_000);

    let first = run.payout_for(ids[0]).expect("first");
    assert_eq!(first.outcome, PayoutOutcome::Completed);
    let second = run.payout_for(ids[1]).expect("second");
    assert_eq!(second.outcome, PayoutOutcome::Failed);
    assert_eq!(second.error_class, Some(ErrorClass::Preflight));
    assert!(second.reference.is_none());
    assert!(second
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("insufficient"));
    assert_eq!(fx.chain.submissions().len(), 1);

    // =========================================================
    // Step 2: top up and retry only the failed contributor
    // =========================================================
    fx.fund_usdc(50 * USDC);
    let retried = fx
        .orchestrator
        .retry(pool_id, ids[1], &fx.signer)
        .await
        .expect("retry");
    assert_eq!(retried.outcome, PayoutOutcome::Completed);
    assert_eq!(retried.attempt, 2);
    assert_eq!(retried.amount, 39_200_000);
    assert_eq!(fx.usdc_balance(wallet(1)), 58_800_000);
    assert_eq!(fx.usdc_balance(wallet(2)), 39_200_000);

    // =========================================================
    // Step 3: audit trail keeps the failed attempt
    // =========================================================
    let report = fx.orchestrator.pool_report(pool_id).await.expect("report");
    assert_eq!(report.pool.status, PoolStatus::Completed);
    assert_eq!(report.pool.distributed_amount, 98 * USDC);
    assert_eq!(report.attempts.len(), 3);
    let history: Vec<(u32, PayoutStatus)> = report
        .attempts
        .iter()
        .filter(|p| p.contributor_id == ids[1])
        .map(|p| (p.attempt, p.status))
        .collect();
    assert_eq!(
        history,
        vec![(1, PayoutStatus::Failed), (2, PayoutStatus::Completed)]
    );
    assert_eq!(report.latest.len(), 2);

    let project = fx.ledger.get_project(project).await.expect("project");
    assert_eq!(project.total_distributed, 98 * USDC);

    let err = fx
        .orchestrator
        .retry(pool_id, ids[1], &fx.signer)
        .await
        .expect_err("pool completed");
    assert!(matches!(err, SettlementError::RetryNotAllowed { .. }));
}

#[tokio::test(start_paused = true)]
async fn reverted_transfer_is_isolated() {
    let fx = Fixture::new().expect("fixture");
    fx.fund_usdc(100 * USDC);
    let (project, ids) = fx
        .project(
            "Remix Pack",
            &[(wallet(1), 5000), (wallet(2), 3000), (wallet(3), 2000)],
        )
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 10 * USDC).await.expect("pool");
    fx.chain.revert_transfers_to(wallet(2));

    let run = fx
        .orchestrator
        .distribute(pool_id, &fx.signer)
        .await
        .expect("run");
    assert_eq!(run.status, PoolStatus::Failed);
    assert_eq!(run.count(PayoutOutcome::Completed), 2);

    let reverted = run.payout_for(ids[1]).expect("reverted");
    assert_eq!(reverted.outcome, PayoutOutcome::Failed);
    assert_eq!(reverted.error_class, Some(ErrorClass::Reverted));
    assert!(reverted.reference.is_some());
    assert_eq!(fx.usdc_balance(wallet(2)), 0);
    assert_eq!(fx.usdc_balance(wallet(1)), 4_900_000);
    assert_eq!(fx.usdc_balance(wallet(3)), 1_960_000);

    let payout = fx
        .ledger
        .get_payout(reverted.payout_id)
        .await
        .expect("payout");
    assert_eq!(payout.status, PayoutStatus::Failed);
    assert!(payout.block_number.is_some());

    fx.chain.clear_reverts(wallet(2));
    let retried = fx
        .orchestrator
        .retry(pool_id, ids[1], &fx.signer)
        .await
        .expect("retry");
    assert_eq!(retried.outcome, PayoutOutcome::Completed);
    assert_eq!(fx.usdc_balance(wallet(2)), 2_940_000);

    let pool = fx.ledger.get_pool(pool_id).await.expect("pool");
    assert_eq!(pool.status, PoolStatus::Completed);
    assert_eq!(pool.distributed_amount, 9_800_000);
}

#[tokio::test(start_paused = true)]
async fn ambiguous_transfer_is_rechecked_not_resent() {
    let fx = Fixture::new().expect("fixture");
    fx.fund_usdc(100 * USDC);
    let (project, ids) = fx
        .project("Tour Merch", &[(wallet(1), 6000), (wallet(2), 4000)])
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 100 * USDC).await.expect("pool");

    // The first transfer is accepted but never mined.
    fx.chain.hold_next_submissions(1);
    let run = fx
        .orchestrator
        .distribute(pool_id, &fx.signer)
        .await
        .expect("run");
    assert_eq!(run.status, PoolStatus::Failed);

    let stuck = run.payout_for(ids[0]).expect("stuck");
    assert_eq!(stuck.outcome, PayoutOutcome::Ambiguous);
    assert_eq!(stuck.error_class, Some(ErrorClass::Ambiguous));
    let reference = stuck.reference.expect("reference persisted");
    assert_eq!(
        run.payout_for(ids[1]).map(|p| p.outcome),
        Some(PayoutOutcome::Completed)
    );
    assert_eq!(run.distributed_amount, 39_200_000);

    // =========================================================
    // Retry while the outcome is still unknown is refused
    // =========================================================
    let err = fx
        .orchestrator
        .retry(pool_id, ids[0], &fx.signer)
        .await
        .expect_err("still unknown");
    assert!(matches!(
        err,
        SettlementError::AmbiguousOutcome { reference: Some(r), .. } if r == reference
    ));
    assert_eq!(err.class(), ErrorClass::Ambiguous);
    assert_eq!(fx.chain.submissions().len(), 2);

    // =========================================================
    // Once it lands, retry completes the original attempt
    // =========================================================
    fx.chain.release(reference);
    let settled = fx
        .orchestrator
        .retry(pool_id, ids[0], &fx.signer)
        .await
        .expect("retry");
    assert_eq!(settled.outcome, PayoutOutcome::Completed);
    assert_eq!(settled.payout_id, stuck.payout_id);
    assert_eq!(settled.attempt, 1);
    assert_eq!(fx.chain.submissions().len(), 2);
    assert_eq!(fx.usdc_balance(wallet(1)), 58_800_000);

    let report = fx.orchestrator.pool_report(pool_id).await.expect("report");
    assert_eq!(report.pool.status, PoolStatus::Completed);
    assert_eq!(report.pool.distributed_amount, 98 * USDC);
    assert_eq!(report.attempts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn signer_outage_fails_every_payout_without_broadcasting() {
    let fx = Fixture::new().expect("fixture");
    fx.fund_usdc(100 * USDC);
    let (project, ids) = fx
        .project("Podcast S1", &[(wallet(1), 5000), (wallet(2), 5000)])
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 20 * USDC).await.expect("pool");

    fx.chain.set_signing_error(Some("hardware signer offline"));
    let run = fx
        .orchestrator
        .distribute(pool_id, &fx.signer)
        .await
        .expect("run");
    assert_eq!(run.status, PoolStatus::Failed);
    assert_eq!(run.distributed_amount, 0);
    assert!(run
        .payouts
        .iter()
        .all(|p| p.error_class == Some(ErrorClass::Submission)));
    assert!(fx.chain.submissions().is_empty());
    assert_eq!(fx.usdc_balance(DISTRIBUTOR), 100 * USDC);

    fx.chain.set_signing_error(None);
    for id in &ids {
        let retried = fx
            .orchestrator
            .retry(pool_id, *id, &fx.signer)
            .await
            .expect("retry");
        assert_eq!(retried.outcome, PayoutOutcome::Completed);
    }
    let pool = fx.ledger.get_pool(pool_id).await.expect("pool");
    assert_eq!(pool.status, PoolStatus::Completed);
    assert_eq!(pool.distributed_amount, 19_600_000);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_records_unreached_contributors() {
    let fx = Fixture::new().expect("fixture");
    fx.fund_usdc(100 * USDC);
    let (project, ids) = fx
        .project(
            "Compilation",
            &[(wallet(1), 4000), (wallet(2), 3000), (wallet(3), 3000)],
        )
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 10 * USDC).await.expect("pool");

    let (tx, mut rx) = broadcast::channel(64);
    let orchestrator = fx.sibling(SignerLocks::new()).with_events(tx);
    fx.chain.set_submit_delay(Duration::from_millis(500));

    // Cancel as soon as the first payout completes.
    let cancel = CancellationToken::new();
    let watcher = async {
        while let Ok(event) = rx.recv().await {
            if let DistributionEvent::PayoutUpdated {
                status: PayoutStatus::Completed,
                ..
            } = event
            {
                cancel.cancel();
                break;
            }
        }
    };
    let (run, ()) = tokio::join!(
        orchestrator.distribute_with_cancel(pool_id, &fx.signer, &cancel),
        watcher
    );
    let run = run.expect("run");

    assert!(run.cancelled);
    assert_eq!(run.status, PoolStatus::Failed);
    assert_eq!(run.payouts[0].outcome, PayoutOutcome::Completed);
    let last = run.payout_for(ids[2]).expect("last contributor");
    assert_eq!(last.outcome, PayoutOutcome::Skipped);
    assert!(last.reference.is_none());

    // Unreached contributors are on record as failed first attempts.
    let payout = fx.ledger.get_payout(last.payout_id).await.expect("payout");
    assert_eq!(payout.status, PayoutStatus::Failed);
    assert!(payout
        .failure_reason
        .as_deref()
        .unwrap_or_default()
        .contains("cancelled"));
    assert_eq!(
        fx.chain.submissions().len(),
        run.count(PayoutOutcome::Completed)
    );

    // Finish the pool with targeted retries.
    for result in run.payouts.iter().filter(|p| p.outcome != PayoutOutcome::Completed) {
        let retried = orchestrator
            .retry(pool_id, result.contributor_id, &fx.signer)
            .await
            .expect("retry");
        assert_eq!(retried.outcome, PayoutOutcome::Completed);
        assert_eq!(retried.attempt, 2);
    }
    let pool = fx.ledger.get_pool(pool_id).await.expect("pool");
    assert_eq!(pool.status, PoolStatus::Completed);
    assert_eq!(pool.distributed_amount, 9_800_000);
    assert_eq!(fx.usdc_balance(wallet(3)), 2_940_000);
}

#[tokio::test(start_paused = true)]
async fn restart_settles_interrupted_run() {
    let fx = Fixture::new().expect("fixture");
    fx.fund_usdc(100 * USDC);
    let (project, ids) = fx
        .project(
            "Tour Film",
            &[(wallet(1), 4000), (wallet(2), 3000), (wallet(3), 3000)],
        )
        .await
        .expect("project");
    let pool_id = fx.open_pool(project, 100 * USDC).await.expect("pool");

    // =========================================================
    // Step 1: leave the ledger as a crash mid-run would
    // =========================================================
    // First contributor paid and recorded, second broadcast with its
    // reference saved, third never reached. Nothing credited yet.
    let ledger = &fx.ledger;
    assert!(ledger
        .transition_pool(pool_id, PoolStatus::Pending, PoolStatus::Distributing)
        .await
        .expect("claim"));
    ledger
        .record_pool_fee(pool_id, 200, 2 * USDC)
        .await
        .expect("fee");

    let paid = ledger
        .create_payout(pool_id, ids[0], 39_200_000)
        .await
        .expect("first payout");
    let paid_ref = broadcast_usdc(&fx, wallet(1), 39_200_000).await;
    ledger
        .update_payout_status(
            paid.id,
            PayoutUpdate::completed(1, None).with_reference(Some(paid_ref)),
        )
        .await
        .expect("first completed");

    let in_flight = ledger
        .create_payout(pool_id, ids[1], 29_400_000)
        .await
        .expect("second payout");
    ledger
        .update_payout_status(in_flight.id, PayoutUpdate::new(PayoutStatus::Processing))
        .await
        .expect("processing");
    let in_flight_ref = broadcast_usdc(&fx, wallet(2), 29_400_000).await;
    ledger
        .record_payout_reference(in_flight.id, in_flight_ref)
        .await
        .expect("reference");

    // =========================================================
    // Step 2: nothing but recovery can move the pool
    // =========================================================
    let engine = fx.sibling(SignerLocks::new());
    let err = engine
        .distribute(pool_id, &fx.signer)
        .await
        .expect_err("pool is claimed");
    assert!(matches!(
        err,
        SettlementError::PoolNotPending {
            status: PoolStatus::Distributing,
            ..
        }
    ));

    let recovered = engine.recover_pool(pool_id).await.expect("recover");
    assert_eq!(recovered.status, PoolStatus::Failed);
    assert_eq!(recovered.distributed_amount, 39_200_000 + 29_400_000);
    let outcomes: Vec<PayoutOutcome> = recovered.payouts.iter().map(|p| p.outcome).collect();
    assert_eq!(outcomes, vec![PayoutOutcome::Completed, PayoutOutcome::Skipped]);
    assert_eq!(recovered.payouts[0].payout_id, in_flight.id);
    assert_eq!(recovered.payouts[0].reference, Some(in_flight_ref));
    assert_eq!(fx.chain.submissions().len(), 2);

    // =========================================================
    // Step 3: the unreached contributor is retried like any failure
    // =========================================================
    let retried = engine.retry(pool_id, ids[2], &fx.signer).await.expect("retry");
    assert_eq!(retried.outcome, PayoutOutcome::Completed);
    assert_eq!(retried.attempt, 2);

    let report = engine.pool_report(pool_id).await.expect("report");
    assert_eq!(report.pool.status, PoolStatus::Completed);
    assert_eq!(report.pool.distributed_amount, 98 * USDC);
    assert_eq!(fx.usdc_balance(wallet(1)), 39_200_000);
    assert_eq!(fx.usdc_balance(wallet(2)), 29_400_000);
    assert_eq!(fx.usdc_balance(wallet(3)), 29_400_000);
    assert_eq!(fx.chain.submissions().len(), 3);

    let project = ledger.get_project(project).await.expect("project");
    assert_eq!(project.total_distributed, 98 * USDC);
}

/// Send a USDC transfer from the distributor outside any run.
async fn broadcast_usdc(fx: &Fixture, to: Address, amount: u64) -> TxHash {
    let request = TransferRequest {
        from: DISTRIBUTOR,
        to,
        amount,
        token: Token::usdc(),
    };
    fx.signer.send_transfer(&request).await.expect("broadcast")
}
