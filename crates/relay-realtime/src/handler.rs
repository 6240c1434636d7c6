//! Event handler table and dispatch adapter.
//!
//! A handler declares up front which context it needs out of payload,
//! connection and identity. The adapter resolves exactly that context per
//! call, so handlers never depend on the transport or on the registry unless
//! they ask for it.

use crate::client::ClientIdentity;
use crate::connection::ConnectionHandle;
use crate::error::RealtimeError;
use crate::registry::ClientRegistry;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Context a handler can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The event payload.
    Payload,
    /// The sender's connection.
    Connection,
    /// The sender's identity.
    Identity,
}

impl FromStr for Capability {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payload" | "data" => Ok(Capability::Payload),
            "connection" | "websocket" => Ok(Capability::Connection),
            "identity" | "client_info" => Ok(Capability::Identity),
            other => Err(RealtimeError::UnknownParameter(other.to_string())),
        }
    }
}

/// Set of [`Capability`] values declared by a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    payload: bool,
    connection: bool,
    identity: bool,
}

impl Capabilities {
    /// No context at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Payload, connection and identity.
    pub fn all() -> Self {
        Self {
            payload: true,
            connection: true,
            identity: true,
        }
    }

    /// Set made of the given capabilities.
    pub fn of(capabilities: &[Capability]) -> Self {
        capabilities
            .iter()
            .fold(Self::none(), |set, cap| set.with(*cap))
    }

    /// Parse declared parameter names.
    ///
    /// Fails on any name outside payload, connection and identity (or their
    /// aliases data, websocket and client_info).
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, RealtimeError> {
        names.iter().try_fold(Self::none(), |set, name| {
            Ok(set.with(name.as_ref().parse::<Capability>()?))
        })
    }

    /// This set plus `capability`.
    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Payload => self.payload = true,
            Capability::Connection => self.connection = true,
            Capability::Identity => self.identity = true,
        }
        self
    }

    /// Whether `capability` is declared.
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Payload => self.payload,
            Capability::Connection => self.connection,
            Capability::Identity => self.identity,
        }
    }

    /// Number of declared capabilities.
    pub fn len(&self) -> usize {
        [self.payload, self.connection, self.identity]
            .iter()
            .filter(|b| **b)
            .count()
    }

    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Arguments passed to a handler. Undeclared fields are `None`.
#[derive(Debug, Clone, Default)]
pub struct HandlerArgs {
    /// Event payload.
    pub payload: Option<Value>,
    /// Sender's connection.
    pub connection: Option<ConnectionHandle>,
    /// Sender's identity.
    pub identity: Option<ClientIdentity>,
}

impl HandlerArgs {
    /// Number of arguments supplied.
    pub fn len(&self) -> usize {
        usize::from(self.payload.is_some())
            + usize::from(self.connection.is_some())
            + usize::from(self.identity.is_some())
    }

    /// Whether no argument was supplied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The payload, or an error if the handler did not declare it.
    pub fn payload(&self) -> anyhow::Result<&Value> {
        self.payload
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("handler did not declare the payload parameter"))
    }

    /// The connection, or an error if the handler did not declare it.
    pub fn connection(&self) -> anyhow::Result<&ConnectionHandle> {
        self.connection
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("handler did not declare the connection parameter"))
    }

    /// The identity, or an error if the handler did not declare it.
    pub fn identity(&self) -> anyhow::Result<&ClientIdentity> {
        self.identity
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("handler did not declare the identity parameter"))
    }
}

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Type-erased handler function.
pub type HandlerFn = Arc<dyn Fn(HandlerArgs) -> HandlerFuture + Send + Sync>;

/// A handler wrapped with the fixed `(payload, connection)` call signature.
pub struct AdaptedHandler {
    event: String,
    capabilities: Capabilities,
    handler: HandlerFn,
    registry: Arc<ClientRegistry>,
}

impl AdaptedHandler {
    /// Wrap `handler` so it receives only `capabilities`.
    pub fn new(
        event: impl Into<String>,
        capabilities: Capabilities,
        handler: HandlerFn,
        registry: Arc<ClientRegistry>,
    ) -> Self {
        Self {
            event: event.into(),
            capabilities,
            handler,
            registry,
        }
    }

    /// Event this handler is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Build the argument set for one call.
    pub fn args(&self, payload: Value, connection: &ConnectionHandle) -> HandlerArgs {
        HandlerArgs {
            payload: self
                .capabilities
                .contains(Capability::Payload)
                .then_some(payload),
            connection: self
                .capabilities
                .contains(Capability::Connection)
                .then(|| connection.clone()),
            identity: self
                .capabilities
                .contains(Capability::Identity)
                .then(|| self.registry.get_info(connection)),
        }
    }

    /// Invoke the handler for an event received on `connection`.
    pub async fn call(&self, payload: Value, connection: &ConnectionHandle) -> anyhow::Result<()> {
        let args = self.args(payload, connection);
        (self.handler)(args).await
    }
}

impl fmt::Debug for AdaptedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptedHandler")
            .field("event", &self.event)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Event name to handler mapping.
#[derive(Debug)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<String, Arc<AdaptedHandler>>>,
    registry: Arc<ClientRegistry>,
}

impl HandlerTable {
    /// Create an empty table resolving identities through `registry`.
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Register `handler` for `event`, replacing any previous handler.
    pub fn register<F, Fut>(&self, event: impl Into<String>, capabilities: Capabilities, handler: F)
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |args| Box::pin(handler(args)));
        self.insert(AdaptedHandler::new(
            event,
            capabilities,
            handler,
            self.registry.clone(),
        ));
    }

    /// Register a handler declaring its parameters by name.
    ///
    /// Unknown parameter names are a programming error and are rejected
    /// without touching the table.
    pub fn register_named<F, Fut, S>(
        &self,
        event: impl Into<String>,
        params: &[S],
        handler: F,
    ) -> Result<(), RealtimeError>
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        S: AsRef<str>,
    {
        let capabilities = Capabilities::parse(params)?;
        self.register(event, capabilities, handler);
        Ok(())
    }

    fn insert(&self, handler: AdaptedHandler) {
        let event = handler.event().to_string();
        let replaced = self
            .handlers
            .write()
            .insert(event.clone(), Arc::new(handler))
            .is_some();
        debug!(event = %event, replaced, "Registered handler");
    }

    /// Remove the handler for `event`. Returns whether one existed.
    pub fn unregister(&self, event: &str) -> bool {
        if self.handlers.write().remove(event).is_some() {
            debug!(event = %event, "Removed handler");
            true
        } else {
            warn!(event = %event, "Attempted to remove non-existent handler");
            false
        }
    }

    /// Handler for `event`, if any.
    pub fn get(&self, event: &str) -> Option<Arc<AdaptedHandler>> {
        self.handlers.read().get(event).cloned()
    }

    /// Whether a handler exists for `event`.
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Registered event names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
