//! HTTP API for the relay node.

use axum::{
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use relay_realtime::EventHub;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::register_default_handlers;
use crate::observability::{metrics_handler, metrics_middleware, request_id_middleware, MetricsState};
use crate::realtime_api::realtime_routes;
use crate::sum_api::sum_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event hub.
    pub hub: Arc<EventHub>,
    /// Metrics registry.
    pub metrics: MetricsState,
}

impl AppState {
    /// Build the hub with the built-in handlers and metrics attached.
    pub fn new(config: &Config) -> Self {
        let metrics = MetricsState::new();
        let hub = Arc::new(
            EventHub::new(config.hub_config()).with_observer(Arc::new(metrics.clone())),
        );
        register_default_handlers(&hub, config.long_task_delay());
        Self { hub, metrics }
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>relay</title></head>
<body>
<h1>relay</h1>
<form id="send"><input id="event" value="ping"> <input id="payload" value="{}"> <button>send</button></form>
<pre id="log"></pre>
<script>
const log = (m) => document.getElementById("log").textContent += m + "\n";
const ws = new WebSocket(`ws://${location.host}/ws`);
ws.onmessage = (e) => log("< " + e.data);
ws.onclose = () => log("closed");
document.getElementById("send").onsubmit = (e) => {
  e.preventDefault();
  const msg = Object.assign({}, JSON.parse(document.getElementById("payload").value || "{}"),
    { event: document.getElementById("event").value });
  ws.send(JSON.stringify(msg));
  log("> " + JSON.stringify(msg));
};
</script>
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics_handler))
        .merge(realtime_routes())
        .merge(sum_routes())
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_app_state_registers_handlers() {
        let state = AppState::new(&Config::default());
        assert!(state.hub.has_handler("welcome"));
        assert!(state.hub.has_handler("ping"));
        assert!(state.hub.has_handler("hello"));
        assert!(state.hub.has_handler("long_task"));
    }
}
