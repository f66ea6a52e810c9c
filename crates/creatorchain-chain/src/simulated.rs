//! In-process simulated chain.
//!
//! Used by the daemon in development mode and by tests across the
//! workspace. It keeps balances, a nonce-ordered submission log, and a block
//! height. Transfers are mined into the next block, which either happens on
//! every receipt lookup (auto-mining, the default) or when
//! [`SimulatedChain::mine_block`] is called.
//!
//! Faults can be injected to exercise the engine's failure paths: reverting
//! transfers to a recipient, failing reads, holding transfers so they are
//! never mined, failing signatures, and slowing down submission.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use creatorchain_types::{Address, Token, TxHash};

use crate::{
    ChainError, ChainReader, Receipt, ReceiptStatus, Result, SignerError, TransferRequest,
    TransferSigner,
};

/// Default native cost charged per transfer.
pub const DEFAULT_TRANSFER_COST: u64 = 21_000;

/// A transfer accepted by the simulated network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTransfer {
    pub reference: TxHash,
    pub request: TransferRequest,
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Pending,
    Held,
    Mined(Receipt),
}

#[derive(Debug)]
struct State {
    head: u64,
    balances: HashMap<(Address, Token), u64>,
    nonces: HashMap<Address, u64>,
    transfers: Vec<SubmittedTransfer>,
    tx_state: HashMap<TxHash, TxState>,
    transfer_cost: u64,
    auto_mine: bool,
    reverting: HashSet<Address>,
    failing_reads: u32,
    held_submissions: u32,
    signing_error: Option<String>,
    broadcast_failures: u32,
    submit_delay: Duration,
}

/// A simulated chain shared by readers and signers.
#[derive(Clone, Debug)]
pub struct SimulatedChain {
    state: Arc<Mutex<State>>,
}

/// Signing capability for one account on a [`SimulatedChain`].
#[derive(Clone, Debug)]
pub struct SimulatedSigner {
    chain: SimulatedChain,
    account: Address,
}

impl SimulatedChain {
    /// Create an empty chain at block 1 with auto-mining enabled.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                head: 1,
                balances: HashMap::new(),
                nonces: HashMap::new(),
                transfers: Vec::new(),
                tx_state: HashMap::new(),
                transfer_cost: DEFAULT_TRANSFER_COST,
                auto_mine: true,
                reverting: HashSet::new(),
                failing_reads: 0,
                held_submissions: 0,
                signing_error: None,
                broadcast_failures: 0,
                submit_delay: Duration::ZERO,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Signing capability for `account`.
    pub fn signer(&self, account: Address) -> SimulatedSigner {
        SimulatedSigner {
            chain: self.clone(),
            account,
        }
    }

    /// Credit `amount` of `token` to `account`.
    pub fn fund(&self, account: Address, token: Token, amount: u64) {
        let mut state = self.lock();
        let balance = state.balances.entry((account, token)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Current balance, without fault injection.
    pub fn balance_of(&self, account: Address, token: Token) -> u64 {
        self.lock().balances.get(&(account, token)).copied().unwrap_or(0)
    }

    /// Current block height.
    pub fn head(&self) -> u64 {
        self.lock().head
    }

    /// Every accepted transfer in submission order.
    pub fn submissions(&self) -> Vec<SubmittedTransfer> {
        self.lock().transfers.clone()
    }

    /// Set the native cost charged per transfer.
    pub fn set_transfer_cost(&self, cost: u64) {
        self.lock().transfer_cost = cost;
    }

    /// Enable or disable mining on every receipt lookup.
    pub fn set_auto_mine(&self, enabled: bool) {
        self.lock().auto_mine = enabled;
    }

    /// Make every transfer to `recipient` revert when mined.
    pub fn revert_transfers_to(&self, recipient: Address) {
        self.lock().reverting.insert(recipient);
    }

    /// Stop reverting transfers to `recipient`.
    pub fn clear_reverts(&self, recipient: Address) {
        self.lock().reverting.remove(&recipient);
    }

    /// Fail the next `count` reads with [`ChainError::Unavailable`].
    pub fn fail_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    /// Accept the next `count` submissions but never mine them until
    /// [`release`](Self::release) is called.
    pub fn hold_next_submissions(&self, count: u32) {
        self.lock().held_submissions = count;
    }

    /// Let a held transfer be mined into the next block.
    pub fn release(&self, reference: TxHash) {
        let mut state = self.lock();
        if let Some(tx_state) = state.tx_state.get_mut(&reference) {
            if *tx_state == TxState::Held {
                *tx_state = TxState::Pending;
            }
        }
    }

    /// Make every signature attempt fail until cleared with `None`.
    pub fn set_signing_error(&self, error: Option<&str>) {
        self.lock().signing_error = error.map(str::to_string);
    }

    /// Fail the next `count` broadcasts before anything reaches the network.
    pub fn fail_broadcasts(&self, count: u32) {
        self.lock().broadcast_failures = count;
    }

    /// Delay every submission acknowledgement.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.lock().submit_delay = delay;
    }

    /// Mine all pending transfers into a new block.
    pub fn mine_block(&self) -> u64 {
        let mut state = self.lock();
        mine(&mut state)
    }

    fn check_read(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ChainError::Unavailable("simulated RPC outage".to_string()));
        }
        Ok(state)
    }
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply pending transfers in submission order and advance the head.
fn mine(state: &mut State) -> u64 {
    state.head += 1;
    let block = state.head;

    let pending: Vec<SubmittedTransfer> = state
        .transfers
        .iter()
        .filter(|t| state.tx_state.get(&t.reference) == Some(&TxState::Pending))
        .cloned()
        .collect();

    for transfer in pending {
        let status = apply_transfer(state, &transfer.request);
        state.tx_state.insert(
            transfer.reference,
            TxState::Mined(Receipt {
                status,
                block_number: block,
            }),
        );
        tracing::debug!(reference = %transfer.reference, block, ?status, "simulated transfer mined");
    }
    block
}

fn apply_transfer(state: &mut State, request: &TransferRequest) -> ReceiptStatus {
    let cost = state.transfer_cost;
    let native = state
        .balances
        .get(&(request.from, Token::Native))
        .copied()
        .unwrap_or(0);

    // The network fee is charged even when the transfer reverts.
    let charged = native.min(cost);
    state
        .balances
        .insert((request.from, Token::Native), native - charged);
    if charged < cost {
        return ReceiptStatus::Reverted;
    }

    if state.reverting.contains(&request.to) {
        return ReceiptStatus::Reverted;
    }

    let available = state
        .balances
        .get(&(request.from, request.token))
        .copied()
        .unwrap_or(0);
    if available < request.amount {
        return ReceiptStatus::Reverted;
    }
    state
        .balances
        .insert((request.from, request.token), available - request.amount);
    let credited = state.balances.entry((request.to, request.token)).or_insert(0);
    *credited = credited.saturating_add(request.amount);
    ReceiptStatus::Success
}

fn transfer_hash(from: &Address, nonce: u64, request: &TransferRequest) -> TxHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&from.0);
    hasher.update(&nonce.to_le_bytes());
    hasher.update(&request.to.0);
    hasher.update(&request.amount.to_le_bytes());
    hasher.update(request.token.to_string().as_bytes());
    TxHash(*hasher.finalize().as_bytes())
}

impl ChainReader for SimulatedChain {
    async fn balance(&self, account: Address, token: Token) -> Result<u64> {
        let state = self.check_read()?;
        Ok(state.balances.get(&(account, token)).copied().unwrap_or(0))
    }

    async fn estimate_transfer_cost(&self, _token: Token) -> Result<u64> {
        let state = self.check_read()?;
        Ok(state.transfer_cost)
    }

    async fn transaction_receipt(&self, reference: TxHash) -> Result<Option<Receipt>> {
        let mut state = self.check_read()?;
        if state.auto_mine {
            mine(&mut state);
        }
        match state.tx_state.get(&reference) {
            Some(TxState::Mined(receipt)) => Ok(Some(*receipt)),
            _ => Ok(None),
        }
    }

    async fn confirmations(&self, reference: TxHash) -> Result<u64> {
        let state = self.check_read()?;
        match state.tx_state.get(&reference) {
            Some(TxState::Mined(receipt)) => Ok(state.head - receipt.block_number + 1),
            _ => Ok(0),
        }
    }
}

impl TransferSigner for SimulatedSigner {
    fn account(&self) -> Address {
        self.account
    }

    async fn send_transfer(&self, request: &TransferRequest) -> std::result::Result<TxHash, SignerError> {
        let delay = {
            let mut state = self.chain.lock();
            if let Some(error) = &state.signing_error {
                return Err(SignerError::Signing(error.clone()));
            }
            if state.broadcast_failures > 0 {
                state.broadcast_failures -= 1;
                return Err(SignerError::Network("simulated broadcast failure".to_string()));
            }
            state.submit_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.chain.lock();
        let nonce = {
            let next = state.nonces.entry(self.account).or_insert(0);
            let nonce = *next;
            *next += 1;
            nonce
        };
        let reference = transfer_hash(&self.account, nonce, request);
        let held = state.held_submissions > 0;
        if held {
            state.held_submissions -= 1;
        }
        state.tx_state.insert(
            reference,
            if held { TxState::Held } else { TxState::Pending },
        );
        state.transfers.push(SubmittedTransfer {
            reference,
            request: request.clone(),
            nonce,
        });
        tracing::debug!(%reference, nonce, to = %request.to, amount = request.amount, "simulated transfer accepted");
        Ok(reference)
    }
}
