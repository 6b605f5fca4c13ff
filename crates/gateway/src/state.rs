use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::{RwLock, mpsc};

use wagate_whatsapp::{ClientEvent, CredentialCell, MessagingClient};

// ── Connected observer ───────────────────────────────────────────────────────

/// A dashboard WebSocket currently subscribed to lifecycle frames.
#[derive(Debug)]
pub struct ConnectedObserver {
    pub conn_id: String,
    /// Channel for sending serialized frames to this observer's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedObserver {
    /// Send a serialized JSON frame to this observer.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Client state ─────────────────────────────────────────────────────────────

/// Last lifecycle phase seen from the messaging client. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Starting,
    Qr,
    Authenticated,
    Ready,
    Disconnected,
}

impl ClientState {
    /// The phase an event moves the client into, if it changes it at all.
    pub fn after(event: &ClientEvent) -> Option<Self> {
        match event {
            ClientEvent::Qr(_) => Some(Self::Qr),
            ClientEvent::Authenticated(_) => Some(Self::Authenticated),
            ClientEvent::Ready => Some(Self::Ready),
            ClientEvent::AuthFailure(_) | ClientEvent::Disconnected(_) => Some(Self::Disconnected),
            ClientEvent::Message(_) => None,
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// All connected dashboard observers, keyed by conn_id.
    pub observers: RwLock<HashMap<String, ConnectedObserver>>,
    pub client: Arc<dyn MessagingClient>,
    /// In-memory copy of the session credential.
    pub credential: CredentialCell,
    /// Country code substituted for a leading trunk `0`.
    pub country_code: String,
    pub client_state: RwLock<ClientState>,
    /// Server version string.
    pub version: String,
}

impl GatewayState {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        credential: CredentialCell,
        country_code: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            observers: RwLock::new(HashMap::new()),
            client,
            credential,
            country_code: country_code.into(),
            client_state: RwLock::new(ClientState::Starting),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Register a new observer connection.
    pub async fn register_observer(&self, observer: ConnectedObserver) {
        let conn_id = observer.conn_id.clone();
        self.observers.write().await.insert(conn_id, observer);
    }

    /// Remove an observer by conn_id. Returns the removed observer if found.
    pub async fn remove_observer(&self, conn_id: &str) -> Option<ConnectedObserver> {
        self.observers.write().await.remove(conn_id)
    }

    /// Number of connected observers.
    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    pub async fn set_client_state(&self, next: ClientState) {
        *self.client_state.write().await = next;
    }

    pub async fn client_state(&self) -> ClientState {
        *self.client_state.read().await
    }
}
