//! Client identity records.

use crate::connection::ConnectionHandle;
use serde::{Deserialize, Serialize};

/// Unique identifier for a connected client.
pub type ClientId = String;

/// A registered client: its connection and server-assigned identity.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Unique client identifier.
    pub id: ClientId,
    /// Display name, unique among connected clients.
    pub display_name: String,
    /// Connection owned by this client.
    pub connection: ConnectionHandle,
}

impl ClientInfo {
    /// Create a client record.
    pub fn new(id: ClientId, display_name: String, connection: ConnectionHandle) -> Self {
        Self {
            id,
            display_name,
            connection,
        }
    }

    /// Identity view of this record.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            client_id: Some(self.id.clone()),
            display_name: Some(self.display_name.clone()),
        }
    }
}

/// Identity looked up from a connection.
///
/// Both fields are `None` when the connection is not registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Client id, if known.
    pub client_id: Option<ClientId>,
    /// Display name, if known.
    pub display_name: Option<String>,
}

impl ClientIdentity {
    /// The identity of an unregistered connection.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Whether this identity belongs to a registered client.
    pub fn is_known(&self) -> bool {
        self.client_id.is_some()
    }

    /// Display name, or `"Unknown"` for unregistered connections.
    pub fn name_or_unknown(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unknown")
    }
}
