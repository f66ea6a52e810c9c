//! Event emission.
//!
//! Settlement progress is pushed from the daemon to subscribed clients as
//! JSON-RPC notifications. Each subscriber has an independent buffer; a
//! subscriber that falls behind loses the oldest events, never blocks a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use creatorchain_types::{unix_now, DistributionEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (e.g. "RunStarted", "DaemonStarted").
    pub event_type: String,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

impl Event {
    /// Wrap a settlement event.
    pub fn from_distribution(event: &DistributionEvent) -> Self {
        Self {
            event_type: event.name().to_string(),
            timestamp: unix_now(),
            payload: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events of these types.
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    /// Only events about these pools.
    #[serde(default)]
    pub pool_ids: Option<Vec<i64>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| *t == event.event_type) {
                return false;
            }
        }

        // Events without a pool_id (e.g. DaemonStarted) always pass.
        if let Some(ref pool_ids) = self.pool_ids {
            if let Some(pool_id) = event.payload.get("pool_id").and_then(|v| v.as_i64()) {
                if !pool_ids.contains(&pool_id) {
                    return false;
                }
            }
        }

        true
    }
}

/// Forward settlement events into the daemon's event bus until the
/// settlement side of the channel is dropped.
pub fn forward_distribution_events(
    bus: EventBus,
    mut events: broadcast::Receiver<DistributionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => bus.emit(Event::from_distribution(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
