use serde_json::Value;
use tokio::sync::broadcast;

use super::ClientInfo;

/// Client-lifecycle and async-message events fanned out by the hub.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A socket connected and received its address-derived id.
    ClientConnected { id: String },
    /// A client replaced its address-derived id via a registration message.
    ClientRegistered {
        id: String,
        info: Option<ClientInfo>,
    },
    /// A client socket closed or errored out.
    ClientDisconnected { id: String },
    /// The active client changed. `None` means no clients remain.
    ActiveClientChanged { id: Option<String> },
    /// A per-socket error isolated to one client.
    ClientError { id: String, message: String },
    /// An inbound object with no correlation id: an async event from the
    /// editor (play-mode changes, compile notifications, ...).
    Message { id: String, payload: Value },
}

/// Broadcasts [`HubEvent`]s to all subscribers.
///
/// Senders never block: a lagging subscriber loses events rather than
/// slowing the hub down.
#[derive(Clone)]
pub struct HubEvents {
    tx: broadcast::Sender<HubEvent>,
}

impl Default for HubEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl HubEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send an event to all subscribers. No subscribers is fine.
    pub fn broadcast(&self, event: HubEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }
}
