//! Best-effort fan-out to connected clients.

use crate::client::ClientInfo;
use crate::connection::ConnectionHandle;
use crate::error::RealtimeError;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default upper bound for a single send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients a send was attempted to.
    pub attempted: usize,
    /// Sends that completed.
    pub delivered: usize,
}

impl BroadcastReport {
    /// Sends that failed or timed out.
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Sends messages to sets of clients.
///
/// Broadcasts queue onto each recipient without waiting, so a client that
/// stops reading only loses its own messages. Direct sends wait for queue
/// space up to the send timeout.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    send_timeout: Duration,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-send timeout.
    pub fn new(send_timeout: Duration) -> Self {
        Self { send_timeout }
    }

    /// Per-send timeout.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Send `data` to a single connection within the timeout.
    pub async fn send(&self, connection: &ConnectionHandle, data: &Value) -> Result<(), RealtimeError> {
        match tokio::time::timeout(self.send_timeout, connection.send(data)).await {
            Ok(result) => result,
            Err(_) => Err(RealtimeError::SendTimeout(self.send_timeout)),
        }
    }

    /// Queue `data` on every recipient.
    ///
    /// The originator is read from `data["sender_id"]` and skipped unless
    /// `include_sender` is set. Messages without a sender id go to everyone.
    /// A recipient whose queue is full or closed counts as a failed delivery.
    pub fn broadcast(
        &self,
        data: &Value,
        recipients: &[ClientInfo],
        include_sender: bool,
    ) -> BroadcastReport {
        let sender_id = data.get("sender_id").and_then(Value::as_str);

        let mut report = BroadcastReport::default();
        for client in recipients
            .iter()
            .filter(|client| include_sender || sender_id != Some(client.id.as_str()))
        {
            report.attempted += 1;
            match client.connection.try_send(data) {
                Ok(()) => report.delivered += 1,
                Err(RealtimeError::ChannelClosed) => {
                    warn!(client_id = %client.id, "Failed to send message: connection closed");
                }
                Err(RealtimeError::QueueFull) => {
                    warn!(client_id = %client.id, "Dropped message: client is not keeping up");
                }
                Err(e) => {
                    error!(client_id = %client.id, error = %e, "Error sending message");
                }
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            "Broadcast message"
        );
        report
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
