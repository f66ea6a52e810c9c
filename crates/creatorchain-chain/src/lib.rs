//! # creatorchain-chain
//!
//! Interfaces to the blockchain the settlement engine pays through.
//!
//! The engine never runs a node or holds keys itself. It consumes two
//! collaborators:
//!
//! - [`ChainReader`] — balance, receipt and confirmation lookups
//! - [`TransferSigner`] — an already-authenticated capability that can
//!   authorize and broadcast a value transfer for one account
//!
//! ## Modules
//!
//! - [`simulated`] — In-process chain for development and tests

pub mod simulated;

use std::future::Future;

use creatorchain_types::{Address, Token, TxHash};
use serde::{Deserialize, Serialize};

pub use simulated::{SimulatedChain, SimulatedSigner};

/// Errors from chain reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The RPC endpoint could not be reached or timed out. Worth retrying.
    #[error("chain RPC unavailable: {0}")]
    Unavailable(String),

    /// The RPC endpoint answered with an error. Not worth retrying.
    #[error("chain RPC error: {0}")]
    Rpc(String),
}

impl ChainError {
    /// Whether the read may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable(_))
    }
}

/// Errors from the signing capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    /// The signer refused or failed to produce a signature. Needs user
    /// action before another attempt.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The signed transfer could not be handed to the network. Nothing was
    /// broadcast.
    #[error("broadcast failed: {0}")]
    Network(String),
}

/// Convenience result type for chain reads.
pub type Result<T> = std::result::Result<T, ChainError>;

/// On-chain result of a mined transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Receipt of a mined transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub status: ReceiptStatus,
    pub block_number: u64,
}

/// A single value transfer to be signed and broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub token: Token,
}

/// Read access to chain state.
///
/// Implementors provide the actual RPC I/O. This abstraction allows the
/// settlement engine to be tested without a network.
pub trait ChainReader: Send + Sync {
    /// Balance of `account` in `token`'s smallest unit.
    fn balance(
        &self,
        account: Address,
        token: Token,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Expected network cost of one transfer of `token`, in native units.
    fn estimate_transfer_cost(&self, token: Token) -> impl Future<Output = Result<u64>> + Send;

    /// Receipt of a transfer, or `None` while it is not yet mined.
    fn transaction_receipt(
        &self,
        reference: TxHash,
    ) -> impl Future<Output = Result<Option<Receipt>>> + Send;

    /// Number of blocks including and built on top of the transfer's block.
    ///
    /// Zero while the transfer is not mined.
    fn confirmations(&self, reference: TxHash) -> impl Future<Output = Result<u64>> + Send;
}

/// Capability to authorize value transfers from one account.
///
/// Supplied by the caller per run and never persisted by the engine.
pub trait TransferSigner: Send + Sync {
    /// The account this signer spends from.
    fn account(&self) -> Address;

    /// Sign and broadcast a transfer. Returns its reference once the network
    /// has accepted it. Irreversible once this returns `Ok`.
    fn send_transfer(
        &self,
        request: &TransferRequest,
    ) -> impl Future<Output = std::result::Result<TxHash, SignerError>> + Send;
}
