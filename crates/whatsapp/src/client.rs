use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::sync::broadcast,
};

use crate::{media::MessageMedia, number::RecipientId, session::SessionCredential};

/// Delivery receipt returned by the client for a sent message. Passed through
/// to API callers untouched.
pub type Receipt = Value;

/// Lifecycle and inbound-traffic events emitted by a messaging client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A login QR payload is available (rotates until scanned).
    Qr(String),
    /// Login succeeded; carries the credential to persist.
    Authenticated(SessionCredential),
    /// The session is ready to send and receive.
    Ready,
    Message(InboundMessage),
    AuthFailure(String),
    Disconnected(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::Authenticated(_) => "authenticated",
            Self::Ready => "ready",
            Self::Message(_) => "message",
            Self::AuthFailure(_) => "auth_failure",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Chat id of the sender.
    pub from: String,
    #[serde(default)]
    pub body: String,
}

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { body: String },
    Media(MessageMedia),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Reply to (quote) this message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("messaging client unreachable: {0}")]
    Transport(String),
    /// The client or network refused the operation. The payload is the
    /// client's own error body.
    #[error("messaging client rejected the request: {0}")]
    Rejected(Value),
    #[error("malformed messaging client response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Error detail suitable for returning to an API caller verbatim.
    pub fn detail(&self) -> Value {
        match self {
            Self::Rejected(body) => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// The external component that owns the WhatsApp Web session.
///
/// Implementations own connection lifecycle and protocol; callers only send,
/// query registration, and observe events.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Start (or resume, when a credential is supplied) the session.
    async fn initialize(&self, session: Option<SessionCredential>) -> Result<(), ClientError>;

    /// Whether the recipient has a WhatsApp account. Never cached.
    async fn is_registered_user(&self, recipient: &RecipientId) -> Result<bool, ClientError>;

    /// Send a message. May suspend for the full protocol round-trip.
    async fn send_message(
        &self,
        to: &RecipientId,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<Receipt, ClientError>;

    /// Independent event subscription. Events emitted before the call are
    /// not replayed.
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;
}
