//! Prometheus metrics collection.
//!
//! Provides metrics for:
//! - WebSocket sessions
//! - Event routing outcomes and handler latency
//! - Broadcast delivery
//! - HTTP request latency and counts

use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use relay_realtime::{BroadcastReport, ClientInfo, HubObserver, RouteOutcome};
use std::sync::Arc;

/// Label used for events that had no handler. Relayed event names come from
/// clients and would make the label set unbounded.
const UNHANDLED_EVENT: &str = "_unhandled";

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path pattern
    pub path: String,
    /// Response status code
    pub status: u16,
}

/// Event routing labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    /// Event name, or `_unhandled`
    pub event: String,
    /// Routing outcome (handled, failed, relayed)
    pub outcome: String,
}

/// Handler labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HandlerLabels {
    /// Event name
    pub event: String,
}

/// Metrics state container.
#[derive(Clone)]
pub struct MetricsState {
    /// Prometheus registry.
    pub registry: Arc<RwLock<Registry>>,
    /// HTTP request counter.
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// HTTP request duration histogram (seconds).
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    /// WebSocket active connections.
    pub websocket_connections: Gauge,
    /// WebSocket connections accepted since start.
    pub websocket_connections_total: Counter,
    /// Routed events by name and outcome.
    pub events_total: Family<EventLabels, Counter>,
    /// Handler execution time (seconds).
    pub handler_duration_seconds: Family<HandlerLabels, Histogram>,
    /// Successful broadcast deliveries.
    pub broadcast_deliveries: Counter,
    /// Failed broadcast deliveries.
    pub broadcast_failures: Counter,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // HTTP metrics
        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "relay_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "relay_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        // WebSocket metrics
        let websocket_connections = Gauge::default();
        registry.register(
            "relay_websocket_connections",
            "Active WebSocket connections",
            websocket_connections.clone(),
        );

        let websocket_connections_total = Counter::default();
        registry.register(
            "relay_websocket_connections_accepted",
            "WebSocket connections accepted since start",
            websocket_connections_total.clone(),
        );

        // Routing metrics
        let events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "relay_events",
            "Routed events by name and outcome",
            events_total.clone(),
        );

        let handler_duration_seconds =
            Family::<HandlerLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0001, 2.0, 18))
            });
        registry.register(
            "relay_handler_duration_seconds",
            "Event handler execution time in seconds",
            handler_duration_seconds.clone(),
        );

        // Broadcast metrics
        let broadcast_deliveries = Counter::default();
        registry.register(
            "relay_broadcast_deliveries",
            "Messages delivered by broadcasts",
            broadcast_deliveries.clone(),
        );

        let broadcast_failures = Counter::default();
        registry.register(
            "relay_broadcast_failures",
            "Broadcast sends that failed or timed out",
            broadcast_failures.clone(),
        );

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            websocket_connections,
            websocket_connections_total,
            events_total,
            handler_duration_seconds,
            broadcast_deliveries,
            broadcast_failures,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record one routed event.
    pub fn record_event(&self, event: &str, outcome: &RouteOutcome) {
        let event = match outcome {
            RouteOutcome::Relayed { .. } => UNHANDLED_EVENT,
            _ => event,
        };

        self.events_total
            .get_or_create(&EventLabels {
                event: event.to_string(),
                outcome: outcome.label().to_string(),
            })
            .inc();

        if let Some(elapsed) = outcome.elapsed() {
            self.handler_duration_seconds
                .get_or_create(&HandlerLabels {
                    event: event.to_string(),
                })
                .observe(elapsed.as_secs_f64());
        }
    }

    /// Encode metrics for Prometheus scraping.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        let registry = self.registry.read();
        prometheus_client::encoding::text::encode(&mut buffer, &registry)?;
        Ok(buffer)
    }
}

impl HubObserver for MetricsState {
    fn client_connected(&self, _client: &ClientInfo) {
        self.websocket_connections.inc();
        self.websocket_connections_total.inc();
    }

    fn client_disconnected(&self, _client: &ClientInfo) {
        self.websocket_connections.dec();
    }

    fn event_routed(&self, event: &str, outcome: &RouteOutcome) {
        self.record_event(event, outcome);
    }

    fn broadcast_completed(&self, report: &BroadcastReport) {
        self.broadcast_deliveries.inc_by(report.delivered as u64);
        self.broadcast_failures.inc_by(report.failed() as u64);
    }
}

/// Normalize path for metrics (collapse the variable part of `/sum/...`).
fn normalize_path(path: &str) -> String {
    if path.starts_with("/sum/") {
        return "/sum/:numbers".to_string();
    }
    path.to_string()
}
