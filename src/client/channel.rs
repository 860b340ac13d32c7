use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::error::ClientError;
use crate::fanout::{FanoutHub, Scope, TrackingEvent};

/// Push-channel client with an explicit lifecycle, injected into the
/// reconciliation client at construction. Never ambient state: a session
/// owns its client and is responsible for tearing it down.
pub trait ChannelClient: Send {
    /// Establish the connection. Idempotent.
    fn connect(&mut self) -> Result<(), ClientError>;
    /// Join one scope, returning the receiver that represents the
    /// subscription. Dropping the receiver leaves the scope.
    fn subscribe(&mut self, scope: &Scope) -> Result<broadcast::Receiver<TrackingEvent>, ClientError>;
    /// Leave one scope. Idempotent; unknown scopes are a no-op.
    fn unsubscribe(&mut self, scope: &Scope);
    /// Tear the connection down. Idempotent.
    fn disconnect(&mut self);
}

/// Channel client backed directly by the in-process fan-out hub. Used by
/// server-side viewing sessions and by tests; a remote viewer would hold a
/// WebSocket-backed implementation with the same lifecycle.
pub struct LocalChannelClient {
    hub: Arc<FanoutHub>,
    connected: bool,
    scopes: HashSet<String>,
}

impl LocalChannelClient {
    pub fn new(hub: Arc<FanoutHub>) -> Self {
        Self {
            hub,
            connected: false,
            scopes: HashSet::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn subscribed_scopes(&self) -> usize {
        self.scopes.len()
    }
}

impl ChannelClient for LocalChannelClient {
    fn connect(&mut self) -> Result<(), ClientError> {
        self.connected = true;
        Ok(())
    }

    fn subscribe(
        &mut self,
        scope: &Scope,
    ) -> Result<broadcast::Receiver<TrackingEvent>, ClientError> {
        if !self.connected {
            return Err(ClientError::Channel("not connected".into()));
        }
        self.scopes.insert(scope.channel_name());
        Ok(self.hub.subscribe(scope))
    }

    fn unsubscribe(&mut self, scope: &Scope) {
        self.scopes.remove(&scope.channel_name());
    }

    fn disconnect(&mut self) {
        self.scopes.clear();
        self.connected = false;
    }
}
