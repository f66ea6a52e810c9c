//! Per-signer submission locks.
//!
//! Submissions from one account must not interleave: two runs sharing a
//! signer would otherwise race on the account's nonce and pass each other's
//! balance checks. Each account gets a FIFO-fair async mutex, held from the
//! pre-flight check until the network accepts the transfer. Confirmation
//! waits happen outside the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use creatorchain_types::Address;
use tokio::sync::OwnedMutexGuard;

/// Registry of per-account submission locks. Cheap to clone; clones share
/// the same locks.
#[derive(Clone, Debug, Default)]
pub struct SignerLocks {
    inner: Arc<Mutex<HashMap<Address, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SignerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive submission rights on `account`.
    pub async fn acquire(&self, account: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(account).or_default())
        };
        lock.lock_owned().await
    }
}
