//! Integration test crate for CreatorChain settlement.
//!
//! The library part is a small fixture: an in-memory ledger, a simulated
//! chain with a funded distributor account, and an orchestrator wired to
//! both. The end-to-end flows live under `tests/`.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p creatorchain-integration-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use creatorchain_chain::{SimulatedChain, SimulatedSigner};
use creatorchain_db::queries::{contributors, projects};
use creatorchain_revenue::FeePolicy;
use creatorchain_settlement::{
    DistributionOrchestrator, SettlementConfig, SettlementError, SignerLocks, SqliteLedger,
};
use creatorchain_types::{
    unix_now, Address, ContributorId, ContributorStatus, PoolId, ProjectId, RevenueSource,
    ShareBps, Token,
};
use tokio::sync::Mutex;

/// Account every fixture pays from.
pub const DISTRIBUTOR: Address = Address([0xd1; 20]);

/// Native balance credited to the distributor for transfer costs.
pub const NATIVE_FUNDING: u64 = 1_000_000_000_000_000_000;

/// 1 USDC in its smallest unit.
pub const USDC: u64 = 1_000_000;

pub type Orchestrator = DistributionOrchestrator<SqliteLedger, SimulatedChain>;

/// Deterministic recipient address.
pub fn wallet(n: u8) -> Address {
    Address([n; 20])
}

/// Short timeouts so paused-time tests stay fast.
pub fn test_config() -> SettlementConfig {
    SettlementConfig {
        confirmation_timeout: Duration::from_secs(10),
        ..SettlementConfig::default()
    }
}

/// Ledger, chain and engine for one test.
pub struct Fixture {
    pub chain: SimulatedChain,
    pub ledger: Arc<SqliteLedger>,
    pub signer: SimulatedSigner,
    pub orchestrator: Orchestrator,
}

impl Fixture {
    pub fn new() -> creatorchain_db::Result<Self> {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SettlementConfig) -> creatorchain_db::Result<Self> {
        let conn = creatorchain_db::open_memory()?;
        let ledger = Arc::new(SqliteLedger::new(Arc::new(Mutex::new(conn))));
        let chain = SimulatedChain::new();
        chain.fund(DISTRIBUTOR, Token::Native, NATIVE_FUNDING);

        let orchestrator = DistributionOrchestrator::new(
            Arc::clone(&ledger),
            Arc::new(chain.clone()),
            FeePolicy::default(),
            config,
        );
        Ok(Self {
            signer: chain.signer(DISTRIBUTOR),
            chain,
            ledger,
            orchestrator,
        })
    }

    /// A second engine over the same ledger and chain, sharing `locks`.
    pub fn sibling(&self, locks: SignerLocks) -> Orchestrator {
        DistributionOrchestrator::new(
            Arc::clone(&self.ledger),
            Arc::new(self.chain.clone()),
            FeePolicy::default(),
            test_config(),
        )
        .with_locks(locks)
    }

    pub fn fund_usdc(&self, amount: u64) {
        self.chain.fund(DISTRIBUTOR, Token::usdc(), amount);
    }

    pub fn usdc_balance(&self, account: Address) -> u64 {
        self.chain.balance_of(account, Token::usdc())
    }

    /// An active project with confirmed contributors, in insertion order.
    pub async fn project(
        &self,
        name: &str,
        shares: &[(Address, u32)],
    ) -> creatorchain_db::Result<(ProjectId, Vec<ContributorId>)> {
        let db = self.ledger.connection();
        let conn = db.lock().await;
        let now = unix_now();
        let project = projects::insert(&conn, name, &DISTRIBUTOR, now)?;

        let mut ids = Vec::with_capacity(shares.len());
        for (wallet, bps) in shares {
            let share = ShareBps::new(*bps)
                .map_err(|e| creatorchain_db::DbError::Constraint(e.to_string()))?;
            ids.push(contributors::insert(
                &conn,
                project,
                &wallet.to_string(),
                share,
                "artist",
                ContributorStatus::Confirmed,
                now,
            )?);
        }
        Ok((project, ids))
    }

    /// Open a USDC pool from a direct payment.
    pub async fn open_pool(&self, project: ProjectId, amount: u64) -> Result<PoolId, SettlementError> {
        let pool = self
            .orchestrator
            .open_pool(project, RevenueSource::Direct, Token::usdc(), amount, None)
            .await?;
        Ok(pool.id)
    }
}
