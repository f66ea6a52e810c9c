//! Settlement timing and confirmation policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a settlement engine instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Confirmations required before a transfer counts as completed.
    pub required_confirmations: u64,
    /// How long to wait for a submitted transfer to reach a final outcome.
    pub confirmation_timeout: Duration,
    /// Interval between receipt polls.
    pub poll_interval: Duration,
    /// Upper bound on a single sign-and-broadcast call.
    pub submit_timeout: Duration,
    /// Retries for a transient chain read before giving up on it.
    pub max_read_retries: u32,
    /// First backoff between read retries. Doubles on each retry.
    pub read_backoff: Duration,
    /// Cap on the read retry backoff.
    pub max_read_backoff: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 1,
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(2000),
            submit_timeout: Duration::from_secs(30),
            max_read_retries: 5,
            read_backoff: Duration::from_millis(500),
            max_read_backoff: Duration::from_millis(8000),
        }
    }
}

impl SettlementConfig {
    /// Backoff before read retry number `attempt` (zero-based).
    pub fn read_backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.read_backoff
            .saturating_mul(factor)
            .min(self.max_read_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SettlementConfig::default();
        assert_eq!(config.read_backoff_for(0), Duration::from_millis(500));
        assert_eq!(config.read_backoff_for(1), Duration::from_millis(1000));
        assert_eq!(config.read_backoff_for(3), Duration::from_millis(4000));
        assert_eq!(config.read_backoff_for(4), Duration::from_millis(8000));
        assert_eq!(config.read_backoff_for(40), Duration::from_millis(8000));
    }
}
