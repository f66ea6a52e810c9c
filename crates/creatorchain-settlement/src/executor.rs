//! Transfer submission.
//!
//! [`TransferExecutor::submit`] validates the recipient, checks that the
//! signer can cover the amount and the network cost, then hands the transfer
//! to the signer. It returns as soon as the network accepts the transfer;
//! whether it lands is the verifier's business.
//!
//! A submission that does not return within the submit timeout may or may
//! not have been broadcast. That case is reported as
//! [`TransferError::SubmitTimeout`], which callers must treat as ambiguous
//! and never resubmit blindly.

use std::sync::Arc;
use std::time::Duration;

use creatorchain_chain::{ChainError, ChainReader, SignerError, TransferRequest, TransferSigner};
use creatorchain_types::{unix_now, Address, Token, TxHash};
use serde::{Deserialize, Serialize};

use crate::ErrorClass;

/// A transfer the network has accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHandle {
    pub reference: TxHash,
    pub submitted_at: u64,
}

/// Why a transfer was not (or may not have been) submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("transfer amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient {token} balance: have {available}, need {required}")]
    InsufficientBalance {
        token: Token,
        available: u64,
        required: u64,
    },

    /// Balance or cost could not be read. Nothing was submitted.
    #[error("pre-flight read failed: {0}")]
    Preflight(ChainError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("submission did not complete within {0:?}; transfer may have been broadcast")]
    SubmitTimeout(Duration),
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransferError::InvalidAmount => ErrorClass::Validation,
            TransferError::InvalidRecipient(_)
            | TransferError::InsufficientBalance { .. }
            | TransferError::Preflight(_) => ErrorClass::Preflight,
            TransferError::Signer(_) => ErrorClass::Submission,
            TransferError::SubmitTimeout(_) => ErrorClass::Ambiguous,
        }
    }
}

/// Submits single transfers on behalf of a signer.
pub struct TransferExecutor<C> {
    chain: Arc<C>,
    submit_timeout: Duration,
}

impl<C: ChainReader> TransferExecutor<C> {
    pub fn new(chain: Arc<C>, submit_timeout: Duration) -> Self {
        Self {
            chain,
            submit_timeout,
        }
    }

    /// Validate, pre-flight and submit one transfer.
    ///
    /// # Errors
    ///
    /// Every variant except [`TransferError::SubmitTimeout`] guarantees
    /// nothing was broadcast.
    pub async fn submit<S: TransferSigner>(
        &self,
        signer: &S,
        recipient: &str,
        amount: u64,
        token: Token,
    ) -> Result<TransferHandle, TransferError> {
        let to = Address::parse_recipient(recipient)
            .map_err(|_| TransferError::InvalidRecipient(recipient.to_string()))?;
        let from = signer.account();
        if to == from {
            return Err(TransferError::InvalidRecipient(format!(
                "{recipient} is the paying account"
            )));
        }
        if amount == 0 {
            return Err(TransferError::InvalidAmount);
        }

        self.preflight(from, amount, token).await?;

        let request = TransferRequest {
            from,
            to,
            amount,
            token,
        };
        let reference = tokio::time::timeout(self.submit_timeout, signer.send_transfer(&request))
            .await
            .map_err(|_| TransferError::SubmitTimeout(self.submit_timeout))??;

        tracing::info!(%from, %to, amount, %token, %reference, "transfer submitted");
        Ok(TransferHandle {
            reference,
            submitted_at: unix_now(),
        })
    }

    async fn preflight(&self, from: Address, amount: u64, token: Token) -> Result<(), TransferError> {
        let cost = self
            .chain
            .estimate_transfer_cost(token)
            .await
            .map_err(TransferError::Preflight)?;
        let native = self
            .chain
            .balance(from, Token::Native)
            .await
            .map_err(TransferError::Preflight)?;

        if token.is_native() {
            let required = amount.saturating_add(cost);
            if native < required {
                return Err(TransferError::InsufficientBalance {
                    token,
                    available: native,
                    required,
                });
            }
            return Ok(());
        }

        let available = self
            .chain
            .balance(from, token)
            .await
            .map_err(TransferError::Preflight)?;
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                token,
                available,
                required: amount,
            });
        }
        if native < cost {
            return Err(TransferError::InsufficientBalance {
                token: Token::Native,
                available: native,
                required: cost,
            });
        }
        Ok(())
    }
}
