//! Event hub: routes inbound events to handlers or relays them to peers.

use crate::broadcast::{BroadcastReport, Broadcaster, DEFAULT_SEND_TIMEOUT};
use crate::client::ClientInfo;
use crate::connection::ConnectionHandle;
use crate::error::RealtimeError;
use crate::event::Envelope;
use crate::handler::{Capabilities, HandlerArgs, HandlerTable};
use crate::names::{NameAllocator, DEFAULT_NAMES};
use crate::registry::ClientRegistry;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Default maximum number of concurrent connections.
pub const MAX_CONNECTIONS: usize = 10000;

/// Default capacity of each client's outbound queue.
pub const OUTBOUND_BUFFER: usize = 256;

/// What to do with a message that cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Report the error to the client and keep reading.
    #[default]
    Skip,
    /// End the session.
    Close,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound for a single send to a client.
    pub send_timeout: Duration,
    /// Capacity of each client's outbound queue.
    pub outbound_buffer: usize,
    /// Maximum number of registered clients.
    pub max_connections: usize,
    /// Handling of unparsable messages.
    pub malformed_policy: MalformedPolicy,
    /// Display name candidates.
    pub name_pool: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outbound_buffer: OUTBOUND_BUFFER,
            max_connections: MAX_CONNECTIONS,
            malformed_policy: MalformedPolicy::default(),
            name_pool: DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Result of routing one event.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A handler ran to completion.
    Handled {
        /// Handler execution time.
        elapsed: Duration,
    },
    /// A handler returned an error.
    Failed {
        /// Handler execution time.
        elapsed: Duration,
        /// The handler's error.
        error: anyhow::Error,
    },
    /// No handler exists; the event was relayed to the other clients.
    Relayed {
        /// Relay delivery report.
        report: BroadcastReport,
    },
}

impl RouteOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Handled { .. } => "handled",
            RouteOutcome::Failed { .. } => "failed",
            RouteOutcome::Relayed { .. } => "relayed",
        }
    }

    /// Handler execution time, if a handler ran.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RouteOutcome::Handled { elapsed } | RouteOutcome::Failed { elapsed, .. } => {
                Some(*elapsed)
            }
            RouteOutcome::Relayed { .. } => None,
        }
    }
}

/// Receives hub lifecycle notifications.
///
/// All methods default to no-ops.
pub trait HubObserver: Send + Sync {
    /// A client was registered.
    fn client_connected(&self, _client: &ClientInfo) {}

    /// A client was removed.
    fn client_disconnected(&self, _client: &ClientInfo) {}

    /// An inbound event was routed.
    fn event_routed(&self, _event: &str, _outcome: &RouteOutcome) {}

    /// A broadcast finished.
    fn broadcast_completed(&self, _report: &BroadcastReport) {}
}

/// Hub statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Current number of connections.
    pub current_connections: usize,
    /// Total connections since start.
    pub total_connections: u64,
    /// Total inbound events routed.
    pub total_events: u64,
    /// Events processed by a handler.
    pub handled_events: u64,
    /// Events relayed for lack of a handler.
    pub relayed_events: u64,
    /// Handler invocations that failed.
    pub handler_failures: u64,
    /// Successful broadcast deliveries.
    pub deliveries: u64,
    /// Failed broadcast deliveries.
    pub failed_deliveries: u64,
}

/// Central context of the real-time server.
///
/// Built once at startup and shared as `Arc<EventHub>` with the connection
/// accept path and the handler wiring.
pub struct EventHub {
    config: HubConfig,
    registry: Arc<ClientRegistry>,
    handlers: HandlerTable,
    broadcaster: Broadcaster,
    stats: RwLock<HubStats>,
    observer: Option<Arc<dyn HubObserver>>,
}

impl EventHub {
    /// Create a hub.
    pub fn new(config: HubConfig) -> Self {
        let registry = Arc::new(ClientRegistry::new(
            NameAllocator::new(config.name_pool.clone()),
            config.max_connections,
        ));
        Self {
            handlers: HandlerTable::new(registry.clone()),
            broadcaster: Broadcaster::new(config.send_timeout),
            registry,
            stats: RwLock::new(HubStats::default()),
            observer: None,
            config,
        }
    }

    /// Attach an observer.
    pub fn with_observer(mut self, observer: Arc<dyn HubObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Client registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Handler table.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Register a handler for `event`. The last registration wins.
    pub fn on<F, Fut>(&self, event: impl Into<String>, capabilities: Capabilities, handler: F)
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.register(event, capabilities, handler);
    }

    /// Remove the handler for `event`. Returns whether one existed.
    pub fn unregister_handler(&self, event: &str) -> bool {
        self.handlers.unregister(event)
    }

    /// Whether a handler is registered for `event`.
    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.contains(event)
    }

    /// Register a connection. Fails if the connection is already registered
    /// or the hub is full; neither case touches stats or the observer.
    pub fn connect(&self, connection: ConnectionHandle) -> Result<ClientInfo, RealtimeError> {
        let client = self.registry.add(connection)?;
        self.stats.write().total_connections += 1;
        if let Some(observer) = &self.observer {
            observer.client_connected(&client);
        }
        Ok(client)
    }

    /// Remove a client.
    pub fn disconnect(&self, client_id: &str) -> Option<ClientInfo> {
        let client = self.registry.remove(client_id)?;
        if let Some(observer) = &self.observer {
            observer.client_disconnected(&client);
        }
        Some(client)
    }

    /// Route one inbound event received on `connection`.
    ///
    /// A registered handler is awaited and timed; its failure is logged and
    /// reported in the outcome, never propagated. Without a handler the event
    /// is wrapped in an [`Envelope`] and relayed to every other client.
    pub async fn handle_event(
        &self,
        event: &str,
        payload: Value,
        connection: &ConnectionHandle,
    ) -> RouteOutcome {
        let identity = self.registry.get_info(connection);
        debug!(
            event = %event,
            client_id = identity.client_id.as_deref().unwrap_or("unknown"),
            client_name = identity.name_or_unknown(),
            "Received event"
        );

        let outcome = match self.handlers.get(event) {
            Some(handler) => {
                let start = Instant::now();
                let result = AssertUnwindSafe(handler.call(payload, connection))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(&*panic))));
                let elapsed = start.elapsed();

                match result {
                    Ok(()) => {
                        debug!(
                            event = %event,
                            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                            "Event handler finished"
                        );
                        RouteOutcome::Handled { elapsed }
                    }
                    Err(e) => {
                        error!(
                            event = %event,
                            client_id = identity.client_id.as_deref().unwrap_or("unknown"),
                            error = %e,
                            "Event handler failed"
                        );
                        RouteOutcome::Failed { elapsed, error: e }
                    }
                }
            }
            None => {
                debug!(
                    event = %event,
                    client_name = identity.name_or_unknown(),
                    "Unknown event, relaying to all clients except sender"
                );
                let envelope = Envelope::new(event, &identity, payload);
                let report = match envelope.to_value() {
                    Ok(value) => self.broadcast(&value, false),
                    Err(e) => {
                        error!(event = %event, error = %e, "Failed to encode envelope");
                        BroadcastReport::default()
                    }
                };
                RouteOutcome::Relayed { report }
            }
        };

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            match &outcome {
                RouteOutcome::Handled { .. } => stats.handled_events += 1,
                RouteOutcome::Failed { .. } => stats.handler_failures += 1,
                RouteOutcome::Relayed { .. } => stats.relayed_events += 1,
            }
        }
        if let Some(observer) = &self.observer {
            observer.event_routed(event, &outcome);
        }

        outcome
    }

    /// Broadcast `data` to a snapshot of all registered clients.
    ///
    /// Never waits on a recipient; clients with a full queue miss the message.
    pub fn broadcast(&self, data: &Value, include_sender: bool) -> BroadcastReport {
        let recipients = self.registry.list_all();
        let report = self
            .broadcaster
            .broadcast(data, &recipients, include_sender);

        {
            let mut stats = self.stats.write();
            stats.deliveries += report.delivered as u64;
            stats.failed_deliveries += report.failed() as u64;
        }
        if let Some(observer) = &self.observer {
            observer.broadcast_completed(&report);
        }

        report
    }

    /// Send `data` to one connection within the configured timeout.
    pub async fn send_to(&self, connection: &ConnectionHandle, data: &Value) -> Result<(), RealtimeError> {
        self.broadcaster.send(connection, data).await
    }

    /// Get current connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Get hub statistics.
    pub fn stats(&self) -> HubStats {
        let mut stats = self.stats.read().clone();
        stats.current_connections = self.connection_count();
        stats
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .field("handlers", &self.handlers.names())
            .finish_non_exhaustive()
    }
}
