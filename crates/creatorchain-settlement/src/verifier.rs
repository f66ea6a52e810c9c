//! Confirmation tracking for submitted transfers.
//!
//! The verifier polls a transfer's receipt until it is mined with enough
//! confirmations, reverts, or the timeout elapses. Only the first two are
//! final. A timeout, or a chain that stays unreachable through every read
//! retry, yields [`VerificationOutcome::Ambiguous`]: the transfer may still
//! land, so the payout must not be treated as failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use creatorchain_chain::{ChainError, ChainReader, ReceiptStatus};
use creatorchain_types::TxHash;
use serde::{Deserialize, Serialize};

use crate::SettlementConfig;

/// Result of waiting on a submitted transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Mined successfully with at least the required confirmations.
    Completed {
        confirmations: u64,
        block_number: u64,
    },
    /// Mined and reverted. No value moved.
    Failed { block_number: u64 },
    /// No final outcome could be established.
    Ambiguous {
        /// Confirmations last observed, zero if never seen mined.
        confirmations: u64,
        block_number: Option<u64>,
        reason: String,
    },
}

impl VerificationOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, VerificationOutcome::Ambiguous { .. })
    }
}

/// What the last successful poll showed.
#[derive(Clone, Copy, Debug, Default)]
struct Observation {
    confirmations: u64,
    block_number: Option<u64>,
}

/// Polls the chain for the outcome of submitted transfers.
pub struct PaymentVerifier<C> {
    chain: Arc<C>,
    config: SettlementConfig,
}

impl<C: ChainReader> PaymentVerifier<C> {
    pub fn new(chain: Arc<C>, config: SettlementConfig) -> Self {
        Self { chain, config }
    }

    /// Wait for `reference` to reach a final outcome.
    ///
    /// Never returns an error: chain failures that outlast the read retry
    /// budget are reported as ambiguous.
    pub async fn await_confirmation(
        &self,
        reference: TxHash,
        required_confirmations: u64,
        timeout: Duration,
    ) -> VerificationOutcome {
        let required = required_confirmations.max(1);
        let mut seen = Observation::default();

        let outcome = tokio::time::timeout(timeout, self.poll(reference, required, &mut seen)).await;
        match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(%reference, error = %err, "chain unreachable while verifying transfer");
                VerificationOutcome::Ambiguous {
                    confirmations: seen.confirmations,
                    block_number: seen.block_number,
                    reason: format!("chain unreachable: {err}"),
                }
            }
            Err(_) => {
                tracing::warn!(
                    %reference,
                    confirmations = seen.confirmations,
                    required,
                    "confirmation timeout"
                );
                VerificationOutcome::Ambiguous {
                    confirmations: seen.confirmations,
                    block_number: seen.block_number,
                    reason: format!(
                        "no final outcome after {}s ({} of {} confirmations)",
                        timeout.as_secs(),
                        seen.confirmations,
                        required
                    ),
                }
            }
        }
    }

    async fn poll(
        &self,
        reference: TxHash,
        required: u64,
        seen: &mut Observation,
    ) -> Result<VerificationOutcome, ChainError> {
        loop {
            let receipt = self
                .read_with_retry("receipt", || self.chain.transaction_receipt(reference))
                .await?;

            if let Some(receipt) = receipt {
                seen.block_number = Some(receipt.block_number);
                if receipt.status == ReceiptStatus::Reverted {
                    tracing::info!(%reference, block = receipt.block_number, "transfer reverted");
                    return Ok(VerificationOutcome::Failed {
                        block_number: receipt.block_number,
                    });
                }

                let confirmations = self
                    .read_with_retry("confirmations", || self.chain.confirmations(reference))
                    .await?;
                seen.confirmations = confirmations;
                if confirmations >= required {
                    tracing::info!(%reference, block = receipt.block_number, confirmations, "transfer confirmed");
                    return Ok(VerificationOutcome::Completed {
                        confirmations,
                        block_number: receipt.block_number,
                    });
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Run a chain read, retrying transient failures with capped
    /// exponential backoff.
    async fn read_with_retry<T, F, Fut>(&self, what: &'static str, mut read: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let mut attempt = 0u32;
        loop {
            match read().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_read_retries => {
                    let backoff = self.config.read_backoff_for(attempt);
                    tracing::debug!(what, attempt, ?backoff, error = %err, "chain read failed, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
