//! Built-in WebSocket event handlers.
//!
//! | Event       | Needs                | Reply                                  |
//! |-------------|----------------------|----------------------------------------|
//! | `welcome`   | connection, identity | greeting with the assigned id and name |
//! | `ping`      | connection           | `pong`                                 |
//! | `hello`     | payload, connection  | `Hello <name>!`                        |
//! | `long_task` | connection           | ack now, broadcast to all when done    |

use relay_realtime::{Capabilities, Capability, EventHub, HandlerArgs, WELCOME_EVENT};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};

/// Sender name used in server-generated greetings.
pub const SERVER_NAME: &str = "relay";

/// Register the built-in handlers on `hub`.
pub fn register_default_handlers(hub: &Arc<EventHub>, long_task_delay: Duration) {
    hub.on(
        WELCOME_EVENT,
        Capabilities::of(&[Capability::Connection, Capability::Identity]),
        handle_welcome,
    );
    hub.on(
        "ping",
        Capabilities::of(&[Capability::Connection]),
        handle_ping,
    );
    hub.on(
        "hello",
        Capabilities::of(&[Capability::Payload, Capability::Connection]),
        handle_hello,
    );

    let weak = Arc::downgrade(hub);
    hub.on(
        "long_task",
        Capabilities::of(&[Capability::Connection]),
        move |args: HandlerArgs| handle_long_task(args, weak.clone(), long_task_delay),
    );

    info!(handlers = ?hub.handlers().names(), "Registered event handlers");
}

async fn handle_welcome(args: HandlerArgs) -> anyhow::Result<()> {
    let identity = args.identity()?;
    let id = identity.client_id.as_deref().unwrap_or("unknown");
    let name = identity.name_or_unknown();

    args.connection()?
        .send(&json!({
            "event": WELCOME_EVENT,
            "sender_name": SERVER_NAME,
            "client_id": id,
            "display_name": name,
            "message": format!("habedere! we will call you {name}! ({id})"),
        }))
        .await?;
    Ok(())
}

async fn handle_ping(args: HandlerArgs) -> anyhow::Result<()> {
    args.connection()?
        .send(&json!({"event": "pong", "sender_name": "ping pong bot"}))
        .await?;
    Ok(())
}

async fn handle_hello(args: HandlerArgs) -> anyhow::Result<()> {
    let name = args
        .payload()?
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Guest");
    info!(name = %name, "Handling hello event");

    args.connection()?
        .send(&json!({
            "event": "hello",
            "sender_name": "hello handler",
            "message": format!("Hello {name}!"),
        }))
        .await?;
    Ok(())
}

async fn handle_long_task(
    args: HandlerArgs,
    hub: Weak<EventHub>,
    delay: Duration,
) -> anyhow::Result<()> {
    tokio::spawn(run_long_task(hub, delay));

    args.connection()?
        .send(&json!({
            "event": "long_task_started",
            "sender_name": "long_task_batch_processing_system",
            "message": "Long task initiated",
        }))
        .await?;
    Ok(())
}

/// Detached job: outlives the request that started it and reports to everyone.
async fn run_long_task(hub: Weak<EventHub>, delay: Duration) {
    tokio::time::sleep(delay).await;

    let Some(hub) = hub.upgrade() else {
        debug!("Hub dropped before long task finished");
        return;
    };

    let report = hub.broadcast(
        &json!({
            "event": "long_task_completed",
            "sender_name": "long_task_batch_processing_system",
            "data": {"result": "yolo!"},
        }),
        true,
    );
    info!(delivered = report.delivered, "Long task completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_realtime::{create_connection, ConnectionReceiver, RouteOutcome};
    use serde_json::Value;

    fn hub() -> Arc<EventHub> {
        let hub = Arc::new(EventHub::default());
        register_default_handlers(&hub, Duration::from_millis(20));
        hub
    }

    async fn recv(rx: &mut ConnectionReceiver) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_default_handlers_registered() {
        let hub = hub();
        assert_eq!(
            hub.handlers().names(),
            vec!["hello", "long_task", "ping", "welcome"]
        );
    }

    #[tokio::test]
    async fn test_welcome_contains_identity() {
        let hub = hub();
        let (conn, mut rx) = create_connection(4);
        let client = hub.connect(conn.clone()).unwrap();

        hub.handle_event("welcome", json!({}), &conn).await;

        let msg = recv(&mut rx).await;
        assert_eq!(msg["event"], "welcome");
        assert_eq!(msg["client_id"], client.id.as_str());
        assert_eq!(msg["display_name"], client.display_name.as_str());
        let text = msg["message"].as_str().unwrap();
        assert!(text.contains(&client.id));
        assert!(text.contains(&client.display_name));
    }

    #[tokio::test]
    async fn test_hello_defaults_to_guest() {
        let hub = hub();
        let (conn, mut rx) = create_connection(4);
        hub.connect(conn.clone()).unwrap();

        hub.handle_event("hello", json!({"name": "John"}), &conn).await;
        assert_eq!(recv(&mut rx).await["message"], "Hello John!");

        hub.handle_event("hello", json!({}), &conn).await;
        assert_eq!(recv(&mut rx).await["message"], "Hello Guest!");
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let hub = hub();
        let (conn, mut rx) = create_connection(4);
        hub.connect(conn.clone()).unwrap();

        let outcome = hub.handle_event("ping", json!({}), &conn).await;
        assert!(matches!(outcome, RouteOutcome::Handled { .. }));
        assert_eq!(recv(&mut rx).await["event"], "pong");
    }

    #[tokio::test]
    async fn test_long_task_reports_to_everyone() {
        let hub = hub();
        let (a, mut rx_a) = create_connection(4);
        let (b, mut rx_b) = create_connection(4);
        hub.connect(a.clone()).unwrap();
        hub.connect(b).unwrap();

        hub.handle_event("long_task", json!({}), &a).await;
        assert_eq!(recv(&mut rx_a).await["event"], "long_task_started");

        let done_a = recv(&mut rx_a).await;
        let done_b = recv(&mut rx_b).await;
        assert_eq!(done_a["event"], "long_task_completed");
        assert_eq!(done_b["data"]["result"], "yolo!");
    }

    #[tokio::test]
    async fn test_long_task_survives_sender_disconnect() {
        let hub = hub();
        let (a, rx_a) = create_connection(4);
        let (b, mut rx_b) = create_connection(4);
        let client_a = hub.connect(a.clone()).unwrap();
        hub.connect(b).unwrap();

        hub.handle_event("long_task", json!({}), &a).await;
        hub.disconnect(&client_a.id);
        drop(rx_a);

        assert_eq!(recv(&mut rx_b).await["event"], "long_task_completed");
    }
}
