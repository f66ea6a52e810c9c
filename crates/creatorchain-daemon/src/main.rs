//! creatorchain-daemon: revenue distribution and payout settlement service.
//!
//! Single OS process running a Tokio async runtime. Operators and the web
//! backend talk to the daemon via JSON-RPC over a Unix socket.

mod commands;
mod config;
mod events;
mod rpc;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use creatorchain_chain::{SimulatedChain, SimulatedSigner};
use creatorchain_settlement::{DistributionOrchestrator, SqliteLedger};
use creatorchain_types::{unix_now, PoolId, Token};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// The settlement engine as wired by the daemon.
pub type Orchestrator = DistributionOrchestrator<SqliteLedger, SimulatedChain>;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Database connection, shared with the ledger.
    pub db: Arc<Mutex<rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Token new pools are paid in.
    pub token: Token,
    /// Chain backend.
    pub chain: SimulatedChain,
    /// Signing capability of the distributor account.
    pub signer: SimulatedSigner,
    /// Settlement engine.
    pub orchestrator: Orchestrator,
    /// Cancellation handles of runs in progress.
    pub runs: Mutex<HashMap<PoolId, CancellationToken>>,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
}

/// Build the daemon state over an open database.
pub fn build_state(
    config: DaemonConfig,
    conn: rusqlite::Connection,
    event_bus: EventBus,
) -> anyhow::Result<DaemonState> {
    if config.chain.mode != "simulated" {
        anyhow::bail!("unsupported chain.mode {:?}", config.chain.mode);
    }
    let token = config.chain.payout_token()?;
    let distributor = config.chain.distributor()?;

    let chain = SimulatedChain::new();
    chain.fund(distributor, Token::Native, config.chain.initial_native_balance);
    if !token.is_native() {
        chain.fund(distributor, token, config.chain.initial_balance);
    }
    let signer = chain.signer(distributor);

    let db = Arc::new(Mutex::new(conn));
    let (events_tx, events_rx) = broadcast::channel(1000);
    events::forward_distribution_events(event_bus.clone(), events_rx);

    let orchestrator = DistributionOrchestrator::new(
        Arc::new(SqliteLedger::new(Arc::clone(&db))),
        Arc::new(chain.clone()),
        config.distribution.fee_policy()?,
        config.distribution.settlement(),
    )
    .with_events(events_tx);

    info!(
        chain_id = config.chain.chain_id,
        %distributor,
        %token,
        fee_bps = config.distribution.platform_fee_bps,
        confirmations = config.distribution.required_confirmations,
        "settlement engine ready (simulated chain)"
    );

    Ok(DaemonState {
        db,
        config,
        token,
        chain,
        signer,
        orchestrator,
        runs: Mutex::new(HashMap::new()),
        event_bus,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("creatorchain={}", config.advanced.log_level))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("CreatorChain daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    // 3. Open database
    let db_path = data_dir.join("creatorchain.db");
    let conn = creatorchain_db::open(&db_path)?;

    // 4. Build state
    let event_bus = EventBus::new(1000);
    let state = Arc::new(build_state(config, conn, event_bus)?);

    // 5. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit(events::Event {
        event_type: "DaemonStarted".to_string(),
        timestamp: unix_now(),
        payload: serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    });

    // 6. Run the RPC server until shutdown
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Stop runs between contributors; submitted transfers stay recorded.
    for (pool_id, token) in state.runs.lock().await.iter() {
        info!(%pool_id, "cancelling distribution");
        token.cancel();
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
