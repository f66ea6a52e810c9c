//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC method calls to the command handlers. A
//! connection that calls `subscribe_events` switches to streaming event
//! notifications until the client disconnects.

use std::path::PathBuf;
use std::sync::Arc;

use creatorchain_settlement::{ErrorClass, SettlementError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::EventFilter;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Stable error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    fn detail(code: i32, message: &str, detail: &str) -> Self {
        Self::new(code, message, Some(serde_json::json!({ "detail": detail })))
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({ "method": method })),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::detail(-32602, "INVALID_PARAMS", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::detail(-32603, "INTERNAL_ERROR", detail)
    }

    // Settlement errors

    /// Rejected before any state change (-32050).
    pub fn validation(detail: &str) -> Self {
        Self::detail(-32050, "VALIDATION", detail)
    }

    /// Concurrent state prevents the operation (-32055).
    pub fn conflict(detail: &str) -> Self {
        Self::detail(-32055, "CONFLICT", detail)
    }

    /// Unknown project, pool, contributor or payout (-32056).
    pub fn not_found(detail: &str) -> Self {
        Self::detail(-32056, "NOT_FOUND", detail)
    }

    /// Error for a single failed payout, by failure class.
    pub fn payout_failed(class: ErrorClass, data: serde_json::Value) -> Self {
        let (code, message) = match class {
            ErrorClass::Validation => (-32050, "VALIDATION"),
            ErrorClass::Preflight => (-32051, "PREFLIGHT"),
            ErrorClass::Submission => (-32052, "SUBMISSION"),
            ErrorClass::Reverted => (-32053, "REVERTED"),
            ErrorClass::Ambiguous => (-32054, "AMBIGUOUS"),
            ErrorClass::Internal => (-32603, "INTERNAL_ERROR"),
        };
        Self::new(code, message, Some(data))
    }
}

impl From<SettlementError> for RpcError {
    fn from(err: SettlementError) -> Self {
        let detail = err.to_string();
        match &err {
            SettlementError::Conflict(_) => RpcError::conflict(&detail),
            SettlementError::NotFound(_) => RpcError::not_found(&detail),
            SettlementError::AmbiguousOutcome {
                payout_id,
                reference,
            } => RpcError::new(
                -32054,
                "AMBIGUOUS",
                Some(serde_json::json!({
                    "detail": detail,
                    "payout_id": payout_id,
                    "reference": reference,
                })),
            ),
            SettlementError::Storage(_) => RpcError::internal_error(&detail),
            SettlementError::Revenue(_)
            | SettlementError::Validation(_)
            | SettlementError::PoolNotPending { .. }
            | SettlementError::RetryNotAllowed { .. } => RpcError::validation(&detail),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.jsonrpc == "2.0" => request,
            Ok(request) => {
                let response = RpcResponse::error(request.id, RpcError::invalid_request());
                write_line(&mut writer, &response).await?;
                continue;
            }
            Err(_) => {
                let response =
                    RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_line(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == "subscribe_events" {
            let filter = match serde_json::from_value::<Option<EventFilter>>(request.params) {
                Ok(filter) => filter.unwrap_or_default(),
                Err(e) => {
                    let response =
                        RpcResponse::error(request.id, RpcError::invalid_params(&e.to_string()));
                    write_line(&mut writer, &response).await?;
                    continue;
                }
            };
            let events = state.event_bus.subscribe();
            let response = RpcResponse::success(
                request.id,
                serde_json::json!({ "subscribed": true, "sequence": state.event_bus.sequence() }),
            );
            write_line(&mut writer, &response).await?;
            return stream_events(&mut writer, events, filter).await;
        }

        let response = dispatch_request(state.clone(), request).await;
        write_line(&mut writer, &response).await?;
    }

    Ok(())
}

/// Push matching events as JSON-RPC notifications until the client goes
/// away.
async fn stream_events(
    writer: &mut OwnedWriteHalf,
    mut events: broadcast::Receiver<crate::events::Event>,
    filter: EventFilter,
) -> anyhow::Result<()> {
    loop {
        match events.recv().await {
            Ok(event) if filter.matches(&event) => {
                let notification = serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": "event",
                    "params": event,
                });
                write_line(writer, &notification).await?;
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_line<T: Serialize>(writer: &mut OwnedWriteHalf, value: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub(crate) async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Distribution
        "preview_split" => commands::distribution::preview_split(&state, &request.params).await,
        "open_pool" => commands::distribution::open_pool(&state, &request.params).await,
        "distribute" => commands::distribution::distribute(&state, &request.params).await,
        "retry_payout" => commands::distribution::retry_payout(&state, &request.params).await,
        "resolve_payout" => commands::distribution::resolve_payout(&state, &request.params).await,
        "cancel_distribution" => {
            commands::distribution::cancel_distribution(&state, &request.params).await
        }
        "recover_pool" => commands::distribution::recover_pool(&state, &request.params).await,
        "get_pool_report" => commands::distribution::get_pool_report(&state, &request.params).await,
        "get_distributor_balance" => commands::distribution::get_distributor_balance(&state).await,

        // Dev-only commands (simulated chain)
        "dev_seed_project" => commands::dev::seed_project(&state, &request.params).await,
        "dev_fund_distributor" => commands::dev::fund_distributor(&state, &request.params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
