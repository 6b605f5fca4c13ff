//! In-process stand-in for the messaging client.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tokio::sync::broadcast,
};

use wagate_whatsapp::{
    ClientError, ClientEvent, MessageContent, MessagingClient, Receipt, RecipientId, SendOptions,
    SessionCredential,
};

#[derive(Debug, Clone)]
pub enum SendOutcome {
    Ok(Value),
    Rejected(Value),
}

pub struct FakeClient {
    pub(crate) events: broadcast::Sender<ClientEvent>,
    pub registered: bool,
    /// Number of `initialize` calls that fail before one succeeds.
    pub init_failures: AtomicUsize,
    pub fail_registration: bool,
    pub outcome: SendOutcome,
    pub sent: Mutex<Vec<(RecipientId, MessageContent, SendOptions)>>,
    /// Credential passed to each `initialize` call, in order.
    pub init_calls: Mutex<Vec<Option<SessionCredential>>>,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self {
            events: broadcast::channel(16).0,
            registered: true,
            init_failures: AtomicUsize::new(0),
            fail_registration: false,
            outcome: SendOutcome::Ok(json!({"id": "true_62811@c.us_XYZ", "ack": 1})),
            sent: Mutex::new(Vec::new()),
            init_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeClient {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn sent(&self) -> Vec<(RecipientId, MessageContent, SendOptions)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn initialize(&self, session: Option<SessionCredential>) -> Result<(), ClientError> {
        self.init_calls.lock().unwrap().push(session);
        let failing = self
            .init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn is_registered_user(&self, _recipient: &RecipientId) -> Result<bool, ClientError> {
        if self.fail_registration {
            return Err(ClientError::Transport("bridge down".into()));
        }
        Ok(self.registered)
    }

    async fn send_message(
        &self,
        to: &RecipientId,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<Receipt, ClientError> {
        self.sent.lock().unwrap().push((to.clone(), content, options));
        match &self.outcome {
            SendOutcome::Ok(receipt) => Ok(receipt.clone()),
            SendOutcome::Rejected(body) => Err(ClientError::Rejected(body.clone())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
