//! # Relay Real-time
//!
//! Event routing core of the Relay real-time hub.
//!
//! Clients hold a persistent connection and send named events with a
//! payload. The hub either hands the event to a registered handler or, when
//! nobody handles it, relays it to every other connected client.
//!
//! ## Features
//!
//! - **Client Registry**: connection to identity mapping with unique display names
//! - **Handler Table**: event name to handler mapping with declared capabilities
//! - **Broadcaster**: concurrent best-effort fan-out with per-send timeouts
//! - **Sessions**: connection lifecycle with guaranteed deregistration
//!
//! ## Example
//!
//! ```rust
//! use relay_realtime::{create_connection, Capabilities, Capability, EventHub, HandlerArgs};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = EventHub::default();
//!
//! hub.on(
//!     "ping",
//!     Capabilities::of(&[Capability::Connection]),
//!     |args: HandlerArgs| async move {
//!         args.connection()?.send(&json!({"event": "pong"})).await?;
//!         Ok(())
//!     },
//! );
//!
//! let (connection, mut outbound) = create_connection(16);
//! hub.connect(connection.clone()).unwrap();
//!
//! hub.handle_event("ping", json!({}), &connection).await;
//! assert_eq!(outbound.recv().await.unwrap(), r#"{"event":"pong"}"#);
//! # }
//! ```
//!
//! ## Protocol
//!
//! ```json
//! // Client -> Server
//! {"event": "hello", "name": "John"}
//!
//! // Server -> other clients, for events without a handler
//! {"event": "draw", "sender_id": "<id>", "sender_name": "Ivy", "data": {"x": 1}}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                 EventHub                  │
//! │  ┌─────────────────┐  ┌────────────────┐  │
//! │  │ ClientRegistry  │  │  HandlerTable  │  │
//! │  │ id -> ClientInfo│  │ event -> fn    │  │
//! │  │ conn -> id      │  │ (capabilities) │  │
//! │  └────────┬────────┘  └───────┬────────┘  │
//! │           │  handle_event     │           │
//! │  ┌────────▼───────────────────▼────────┐  │
//! │  │ handler found? run it : Broadcaster │  │
//! │  └─────────────────────────────────────┘  │
//! └───────────────────────────────────────────┘
//! ```

pub mod broadcast;
pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod handler;
pub mod hub;
pub mod names;
pub mod registry;
pub mod session;

// Re-export main types
pub use broadcast::{BroadcastReport, Broadcaster, DEFAULT_SEND_TIMEOUT};
pub use client::{ClientId, ClientIdentity, ClientInfo};
pub use connection::{
    create_connection, ChannelConnection, ChannelInbox, Connection, ConnectionHandle,
    ConnectionKey, ConnectionReceiver, Inbox,
};
pub use error::RealtimeError;
pub use event::{Envelope, InboundEvent, ERROR_EVENT, WELCOME_EVENT};
pub use handler::{
    AdaptedHandler, Capabilities, Capability, HandlerArgs, HandlerFn, HandlerFuture, HandlerTable,
};
pub use hub::{
    EventHub, HubConfig, HubObserver, HubStats, MalformedPolicy, RouteOutcome, MAX_CONNECTIONS,
    OUTBOUND_BUFFER,
};
pub use names::{NameAllocator, DEFAULT_NAMES};
pub use registry::ClientRegistry;
pub use session::{run_session, CloseReason, SessionSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_public_api() {
        let hub = EventHub::new(HubConfig::default());
        assert_eq!(hub.connection_count(), 0);
        assert!(hub.handlers().is_empty());
    }

    #[tokio::test]
    async fn test_full_flow() {
        let hub = EventHub::default();

        // Connect two clients
        let (a, mut rx_a) = create_connection(8);
        let (b, mut rx_b) = create_connection(8);
        let alice = hub.connect(a.clone()).unwrap();
        hub.connect(b).unwrap();
        assert_eq!(hub.connection_count(), 2);

        // Relay an unhandled event
        hub.handle_event("cursor", json!({"x": 3}), &a).await;

        let msg: serde_json::Value = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(msg["sender_id"], alice.id.as_str());
        assert_eq!(msg["data"], json!({"x": 3}));
        assert!(rx_a.try_recv().is_err());

        // Disconnect
        hub.disconnect(&alice.id);
        assert_eq!(hub.connection_count(), 1);
    }
}
