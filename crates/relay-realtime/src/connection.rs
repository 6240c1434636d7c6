//! Transport-facing connection primitives.
//!
//! The core never touches sockets. It sends through [`Connection`] and reads
//! through [`Inbox`]; the server crate adapts its WebSocket to both.

use crate::error::RealtimeError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound half of a client connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send one structured message to the peer.
    async fn send(&self, message: &Value) -> Result<(), RealtimeError>;

    /// Queue one message without waiting.
    ///
    /// Fails with [`RealtimeError::QueueFull`] when the peer is not keeping up.
    fn try_send(&self, message: &Value) -> Result<(), RealtimeError>;
}

/// Inbound half of a client connection.
#[async_trait]
pub trait Inbox: Send {
    /// Wait for the next text message.
    ///
    /// Returns [`RealtimeError::Disconnected`] once the peer has closed the
    /// connection and [`RealtimeError::Transport`] if the transport failed.
    async fn receive(&mut self) -> Result<String, RealtimeError>;
}

/// Process-unique key identifying one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

impl ConnectionKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Clonable handle to a live connection.
///
/// Equality and hashing use the connection key only, so every clone of a
/// handle refers to the same connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    key: ConnectionKey,
    sink: Arc<dyn Connection>,
}

impl ConnectionHandle {
    /// Wrap a connection and assign it a fresh key.
    pub fn new(sink: Arc<dyn Connection>) -> Self {
        Self {
            key: ConnectionKey::next(),
            sink,
        }
    }

    /// Key of this connection.
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Send a structured message over this connection.
    pub async fn send(&self, message: &Value) -> Result<(), RealtimeError> {
        self.sink.send(message).await
    }

    /// Queue a structured message without waiting.
    pub fn try_send(&self, message: &Value) -> Result<(), RealtimeError> {
        self.sink.try_send(message)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Handle for receiving serialized messages to write to the socket.
pub type ConnectionReceiver = mpsc::Receiver<String>;

/// [`Connection`] backed by a bounded channel drained by a writer task.
#[derive(Debug)]
pub struct ChannelConnection {
    sender: mpsc::Sender<String>,
}

impl ChannelConnection {
    /// Create a connection from a channel sender.
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&self, message: &Value) -> Result<(), RealtimeError> {
        let text = serde_json::to_string(message)?;
        self.sender
            .send(text)
            .await
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    fn try_send(&self, message: &Value) -> Result<(), RealtimeError> {
        let text = serde_json::to_string(message)?;
        self.sender.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RealtimeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RealtimeError::ChannelClosed,
        })
    }
}

/// Create a channel-backed connection with its message receiver.
pub fn create_connection(buffer: usize) -> (ConnectionHandle, ConnectionReceiver) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    let handle = ConnectionHandle::new(Arc::new(ChannelConnection::new(sender)));
    (handle, receiver)
}

/// [`Inbox`] fed from a channel of text frames. Closing the channel reads as a
/// clean disconnect.
#[derive(Debug)]
pub struct ChannelInbox {
    receiver: mpsc::Receiver<Result<String, RealtimeError>>,
}

impl ChannelInbox {
    /// Create an inbox and the sender that feeds it.
    pub fn new(buffer: usize) -> (mpsc::Sender<Result<String, RealtimeError>>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl Inbox for ChannelInbox {
    async fn receive(&mut self) -> Result<String, RealtimeError> {
        match self.receiver.recv().await {
            Some(frame) => frame,
            None => Err(RealtimeError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_connection_send() {
        let (handle, mut rx) = create_connection(4);

        handle.send(&json!({"event": "pong"})).await.unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg, r#"{"event":"pong"}"#);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (handle, rx) = create_connection(4);
        drop(rx);

        let err = handle.send(&json!({})).await.unwrap_err();
        assert!(matches!(err, RealtimeError::ChannelClosed));
    }

    #[test]
    fn test_try_send_reports_full_and_closed_queues() {
        let (handle, mut rx) = create_connection(1);

        handle.try_send(&json!({"n": 1})).unwrap();
        assert!(matches!(
            handle.try_send(&json!({"n": 2})),
            Err(RealtimeError::QueueFull)
        ));

        assert_eq!(rx.try_recv().unwrap(), r#"{"n":1}"#);
        drop(rx);
        assert!(matches!(
            handle.try_send(&json!({})),
            Err(RealtimeError::ChannelClosed)
        ));
    }

    #[test]
    fn test_handles_compare_by_key() {
        let (a, _rx_a) = create_connection(1);
        let (b, _rx_b) = create_connection(1);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
    }

    #[tokio::test]
    async fn test_channel_inbox_close_is_disconnect() {
        let (tx, mut inbox) = ChannelInbox::new(2);
        tx.send(Ok("hi".to_string())).await.unwrap();
        drop(tx);

        assert_eq!(inbox.receive().await.unwrap(), "hi");
        assert!(matches!(
            inbox.receive().await,
            Err(RealtimeError::Disconnected)
        ));
    }
}
