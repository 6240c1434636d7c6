//! Per-connection lifecycle: register, greet, read events, deregister.

use crate::client::ClientId;
use crate::connection::{ConnectionHandle, Inbox};
use crate::error::RealtimeError;
use crate::event::{InboundEvent, ERROR_EVENT, WELCOME_EVENT};
use crate::hub::{EventHub, MalformedPolicy};
use serde_json::json;
use tracing::{debug, error, info, warn};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection.
    Disconnected,
    /// A malformed message ended the session.
    Protocol(String),
    /// The transport failed.
    Transport(String),
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Client id assigned at registration.
    pub client_id: ClientId,
    /// Display name assigned at registration.
    pub display_name: String,
    /// Inbound events routed during the session.
    pub events: u64,
    /// Why the session ended.
    pub close_reason: CloseReason,
}

/// Removes the client from the hub when dropped, whichever way the session ends.
struct Registration<'a> {
    hub: &'a EventHub,
    client_id: ClientId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.hub.disconnect(&self.client_id) {
            debug!(client_id = %client.id, "Session deregistered");
        }
    }
}

/// Serve one accepted connection until it closes.
///
/// The client is registered first. If a `welcome` handler exists it is run
/// with an empty payload on behalf of the new client; without one nothing is
/// sent, so peers never see another client's greeting. Inbound messages are
/// then handled one at a time. Malformed messages follow the hub's
/// [`MalformedPolicy`]. The client is deregistered on every exit path, including cancellation of this future.
///
/// Only a refused registration is returned as an error.
pub async fn run_session<I: Inbox>(
    hub: &EventHub,
    connection: ConnectionHandle,
    mut inbox: I,
) -> Result<SessionSummary, RealtimeError> {
    let client = hub.connect(connection.clone())?;
    let registration = Registration {
        hub,
        client_id: client.id.clone(),
    };
    let client_id = client.id.as_str();
    info!(client_id = %client_id, name = %client.display_name, "Session started");

    if hub.has_handler(WELCOME_EVENT) {
        hub.handle_event(WELCOME_EVENT, json!({}), &connection).await;
    } else {
        debug!(client_id = %client_id, "No welcome handler registered");
    }

    let mut events: u64 = 0;
    let close_reason = loop {
        let next = inbox
            .receive()
            .await
            .and_then(|text| InboundEvent::parse(&text));

        match next {
            Ok(event) => {
                events += 1;
                hub.handle_event(&event.event, event.payload, &connection)
                    .await;
            }
            Err(RealtimeError::Disconnected) => {
                info!(client_id = %client_id, "Client disconnected");
                break CloseReason::Disconnected;
            }
            Err(e) if e.is_terminal() => {
                error!(client_id = %client_id, error = %e, "Connection error");
                break CloseReason::Transport(e.to_string());
            }
            Err(e) => {
                let reason = match e {
                    RealtimeError::Protocol(reason) => reason,
                    other => other.to_string(),
                };
                match hub.config().malformed_policy {
                    MalformedPolicy::Skip => {
                        warn!(client_id = %client_id, reason = %reason, "Skipping malformed message");
                        let notice = json!({
                            "event": ERROR_EVENT,
                            "message": format!("invalid message: {reason}"),
                        });
                        if let Err(e) = hub.send_to(&connection, &notice).await {
                            debug!(client_id = %client_id, error = %e, "Failed to report malformed message");
                        }
                    }
                    MalformedPolicy::Close => {
                        error!(client_id = %client_id, reason = %reason, "Malformed message, closing session");
                        break CloseReason::Protocol(reason);
                    }
                }
            }
        }
    };

    drop(registration);

    Ok(SessionSummary {
        client_id: client.id,
        display_name: client.display_name,
        events,
        close_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{create_connection, ChannelInbox, ConnectionReceiver};
    use crate::handler::{Capabilities, Capability, HandlerArgs};
    use crate::hub::HubConfig;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Feed = mpsc::Sender<Result<String, RealtimeError>>;

    fn hub_with(policy: MalformedPolicy) -> Arc<EventHub> {
        let hub = EventHub::new(HubConfig {
            malformed_policy: policy,
            ..HubConfig::default()
        });
        hub.on(
            WELCOME_EVENT,
            Capabilities::of(&[Capability::Connection, Capability::Identity]),
            |args: HandlerArgs| async move {
                let identity = args.identity()?;
                args.connection()?
                    .send(&json!({
                        "event": "welcome",
                        "client_id": identity.client_id,
                        "display_name": identity.display_name,
                    }))
                    .await?;
                Ok(())
            },
        );
        hub.on(
            "ping",
            Capabilities::of(&[Capability::Connection]),
            |args: HandlerArgs| async move {
                args.connection()?.send(&json!({"event": "pong"})).await?;
                Ok(())
            },
        );
        Arc::new(hub)
    }

    fn start(
        hub: &Arc<EventHub>,
    ) -> (
        Feed,
        ConnectionReceiver,
        tokio::task::JoinHandle<Result<SessionSummary, RealtimeError>>,
    ) {
        let (conn, out) = create_connection(16);
        let (feed, inbox) = ChannelInbox::new(16);
        let hub = hub.clone();
        let task = tokio::spawn(async move { run_session(&hub, conn, inbox).await });
        (feed, out, task)
    }

    async fn recv_json(out: &mut ConnectionReceiver) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(2), out.recv())
            .await
            .expect("timed out")
            .expect("connection closed");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_welcome_then_ping() {
        let hub = hub_with(MalformedPolicy::Skip);
        let (feed, mut out, task) = start(&hub);

        let welcome = recv_json(&mut out).await;
        assert_eq!(welcome["event"], "welcome");
        assert!(welcome["client_id"].is_string());
        assert_eq!(hub.connection_count(), 1);

        feed.send(Ok(r#"{"event":"ping"}"#.to_string())).await.unwrap();
        assert_eq!(recv_json(&mut out).await, json!({"event": "pong"}));

        drop(feed);
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.events, 1);
        assert_eq!(summary.close_reason, CloseReason::Disconnected);
        assert_eq!(summary.client_id, welcome["client_id"]);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_message_skipped() {
        let hub = hub_with(MalformedPolicy::Skip);
        let (feed, mut out, task) = start(&hub);
        recv_json(&mut out).await;

        feed.send(Ok("{not json".to_string())).await.unwrap();
        let notice = recv_json(&mut out).await;
        assert_eq!(notice["event"], "error");

        feed.send(Ok(r#"{"event":"ping"}"#.to_string())).await.unwrap();
        assert_eq!(recv_json(&mut out).await["event"], "pong");

        drop(feed);
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.close_reason, CloseReason::Disconnected);
    }

    #[tokio::test]
    async fn test_malformed_message_closes() {
        let hub = hub_with(MalformedPolicy::Close);
        let (feed, mut out, task) = start(&hub);
        recv_json(&mut out).await;

        feed.send(Ok(r#"{"name":"no event"}"#.to_string())).await.unwrap();

        let summary = task.await.unwrap().unwrap();
        assert!(matches!(summary.close_reason, CloseReason::Protocol(_)));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_deregisters() {
        let hub = hub_with(MalformedPolicy::Skip);
        let (feed, mut out, task) = start(&hub);
        recv_json(&mut out).await;

        feed.send(Err(RealtimeError::Transport("reset".to_string())))
            .await
            .unwrap();

        let summary = task.await.unwrap().unwrap();
        assert_eq!(
            summary.close_reason,
            CloseReason::Transport("transport error: reset".to_string())
        );
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_session_deregisters() {
        let hub = hub_with(MalformedPolicy::Skip);
        let (_feed, mut out, task) = start(&hub);
        recv_json(&mut out).await;
        assert_eq!(hub.connection_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_event_relayed_between_sessions() {
        let hub = hub_with(MalformedPolicy::Skip);
        let (feed_a, mut out_a, _task_a) = start(&hub);
        let welcome_a = recv_json(&mut out_a).await;
        let (_feed_b, mut out_b, _task_b) = start(&hub);
        recv_json(&mut out_b).await;

        feed_a
            .send(Ok(r#"{"event":"custom_noone_handles"}"#.to_string()))
            .await
            .unwrap();

        let relayed = recv_json(&mut out_b).await;
        assert_eq!(
            relayed,
            json!({
                "event": "custom_noone_handles",
                "sender_id": welcome_a["client_id"],
                "sender_name": welcome_a["display_name"],
                "data": {}
            })
        );
        assert!(out_a.try_recv().is_err());
    }

    async fn wait_for_connections(hub: &EventHub, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.connection_count() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("clients did not register");
    }

    #[tokio::test]
    async fn test_no_welcome_handler_sends_nothing_to_peers() {
        let hub = Arc::new(EventHub::default());
        let (_feed_a, mut out_a, _task_a) = start(&hub);
        wait_for_connections(&hub, 1).await;
        let (feed_b, _out_b, _task_b) = start(&hub);
        wait_for_connections(&hub, 2).await;

        feed_b
            .send(Ok(r#"{"event":"after_join"}"#.to_string()))
            .await
            .unwrap();

        // The first thing A sees is B's event, not a relayed greeting
        assert_eq!(recv_json(&mut out_a).await["event"], "after_join");
        assert!(out_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_continues_after_handler_failure() {
        let hub = hub_with(MalformedPolicy::Skip);
        hub.on("boom", Capabilities::none(), |_args| async {
            Err(anyhow::anyhow!("handler exploded"))
        });
        let (feed, mut out, task) = start(&hub);
        recv_json(&mut out).await;

        feed.send(Ok(r#"{"event":"boom"}"#.to_string())).await.unwrap();
        feed.send(Ok(r#"{"event":"ping"}"#.to_string())).await.unwrap();
        assert_eq!(recv_json(&mut out).await, json!({"event": "pong"}));

        drop(feed);
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.close_reason, CloseReason::Disconnected);
        assert_eq!(hub.stats().handler_failures, 1);
    }

    #[tokio::test]
    async fn test_registration_refused() {
        let hub = Arc::new(EventHub::new(HubConfig {
            max_connections: 0,
            ..HubConfig::default()
        }));
        let (conn, _out) = create_connection(1);
        let (_feed, inbox) = ChannelInbox::new(1);

        let err = run_session(&hub, conn, inbox).await.unwrap_err();
        assert!(matches!(err, RealtimeError::ConnectionLimit(0)));
        assert_eq!(hub.stats().total_connections, 0);
    }
}
