//! Registry of connected clients.

use crate::client::{ClientId, ClientIdentity, ClientInfo};
use crate::connection::{ConnectionHandle, ConnectionKey};
use crate::error::RealtimeError;
use crate::names::NameAllocator;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Both views of the client set. Always mutated together under one lock.
#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<ClientId, ClientInfo>,
    lookup: HashMap<ConnectionKey, ClientId>,
}

/// Maps live connections to client identities.
#[derive(Debug)]
pub struct ClientRegistry {
    inner: RwLock<Inner>,
    names: NameAllocator,
    max_clients: usize,
}

impl ClientRegistry {
    /// Create a registry accepting at most `max_clients` clients.
    pub fn new(names: NameAllocator, max_clients: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            names,
            max_clients,
        }
    }

    /// Register a connection and return the new client record.
    ///
    /// A connection can be registered once; a second add fails with
    /// [`RealtimeError::AlreadyRegistered`]. Name allocation happens under the
    /// write lock, so concurrent adds never hand out the same display name.
    pub fn add(&self, connection: ConnectionHandle) -> Result<ClientInfo, RealtimeError> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner.lookup.get(&connection.key()) {
            warn!(client_id = %existing, "Connection already registered");
            return Err(RealtimeError::AlreadyRegistered(existing.clone()));
        }

        if inner.clients.len() >= self.max_clients {
            return Err(RealtimeError::ConnectionLimit(self.max_clients));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let used: HashSet<String> = inner
            .clients
            .values()
            .map(|c| c.display_name.clone())
            .collect();
        let display_name = self.names.allocate(&used);

        let info = ClientInfo::new(id.clone(), display_name, connection);
        inner.lookup.insert(info.connection.key(), id.clone());
        inner.clients.insert(id.clone(), info.clone());

        info!(client_id = %id, name = %info.display_name, "New client registered");
        debug!(total = inner.clients.len(), "Connected clients");

        Ok(info)
    }

    /// Remove a client. Unknown ids are logged and ignored.
    pub fn remove(&self, id: &str) -> Option<ClientInfo> {
        let mut inner = self.inner.write();
        match inner.clients.remove(id) {
            Some(info) => {
                inner.lookup.remove(&info.connection.key());
                info!(client_id = %id, name = %info.display_name, "Client removed");
                debug!(total = inner.clients.len(), "Connected clients");
                Some(info)
            }
            None => {
                warn!(client_id = %id, "Attempted to remove non-existent client");
                None
            }
        }
    }

    /// Identity of the client owning `connection`, or [`ClientIdentity::unknown`].
    pub fn get_info(&self, connection: &ConnectionHandle) -> ClientIdentity {
        let inner = self.inner.read();
        inner
            .lookup
            .get(&connection.key())
            .and_then(|id| inner.clients.get(id))
            .map(ClientInfo::identity)
            .unwrap_or_default()
    }

    /// Client record by id.
    pub fn get(&self, id: &str) -> Option<ClientInfo> {
        self.inner.read().clients.get(id).cloned()
    }

    /// Snapshot of all registered clients.
    pub fn list_all(&self) -> Vec<ClientInfo> {
        self.inner.read().clients.values().cloned().collect()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.inner.read().clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(NameAllocator::default(), usize::MAX)
    }
}
