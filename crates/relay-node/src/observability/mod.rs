//! # Observability Module
//!
//! Observability for the relay node:
//!
//! - **Structured Logging**: pretty or JSON logs with request IDs and context
//! - **Prometheus Metrics**: WebSocket sessions, event routing, broadcast delivery, HTTP
//! - **Request Tracing**: request ID propagation across HTTP handlers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_node::observability::{init_logging, LogFormat, MetricsState};
//!
//! init_logging("info", LogFormat::Json);
//! let metrics = MetricsState::new();
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use metrics::{EventLabels, HandlerLabels, HttpLabels, MetricsState};
pub use middleware::{
    metrics_handler, metrics_middleware, request_id_middleware, REQUEST_ID_HEADER,
};
