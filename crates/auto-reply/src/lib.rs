//! Keyword auto-replies for inbound WhatsApp messages.
//!
//! Subscribes to the client's event stream on its own and answers messages
//! whose body exactly matches a configured trigger, quoting the original.

use std::{collections::HashMap, sync::Arc};

use {
    tokio::{sync::broadcast::error::RecvError, task::JoinHandle},
    tracing::{debug, info, warn},
};

use {
    wagate_config::AutoReplyConfig,
    wagate_whatsapp::{
        ClientEvent, InboundMessage, MessageContent, MessagingClient, RecipientId, SendOptions,
    },
};

/// Trigger → reply table.
#[derive(Debug, Clone, Default)]
pub struct AutoReply {
    rules: HashMap<String, String>,
}

impl AutoReply {
    pub fn from_config(config: &AutoReplyConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|r| (r.trigger.clone(), r.reply.clone()))
            .collect();
        Self { rules }
    }

    /// Reply text for a message body, if any rule matches exactly.
    pub fn reply_for(&self, body: &str) -> Option<&str> {
        self.rules.get(body).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Answer one inbound message. Send failures are logged and swallowed.
    pub async fn handle(&self, client: &dyn MessagingClient, msg: &InboundMessage) {
        let Some(reply) = self.reply_for(&msg.body) else {
            return;
        };
        let to = RecipientId::from_chat_id(msg.from.as_str());
        let options = SendOptions {
            quoted_message_id: Some(msg.id.clone()),
            ..Default::default()
        };
        match client
            .send_message(&to, MessageContent::Text { body: reply.to_string() }, options)
            .await
        {
            Ok(_) => debug!(to = %to, trigger = %msg.body, "auto-reply sent"),
            Err(e) => warn!(to = %to, error = %e, "auto-reply failed"),
        }
    }

    /// Subscribe to `client` and answer matching messages until the event
    /// stream closes.
    pub fn spawn(self, client: Arc<dyn MessagingClient>) -> JoinHandle<()> {
        let mut rx = client.subscribe();
        info!(rules = self.rules.len(), "auto-reply enabled");
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::Message(msg)) => self.handle(client.as_ref(), &msg).await,
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auto-reply fell behind, messages skipped");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
