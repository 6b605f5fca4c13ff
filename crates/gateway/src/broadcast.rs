use {serde::Serialize, serde_json::Value, tracing::debug};

use crate::state::GatewayState;

/// Push frame sent to dashboard observers.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame<'a> {
    pub event: &'a str,
    pub data: Value,
}

impl<'a> EventFrame<'a> {
    pub fn new(event: &'a str, data: impl Into<Value>) -> Self {
        Self {
            event,
            data: data.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Broadcast an event to every connected observer, dropping the ones whose
/// write loop has gone away.
pub async fn broadcast(state: &GatewayState, event: &str, data: impl Into<Value>) {
    let frame = EventFrame::new(event, data).to_json();

    let dead: Vec<String> = {
        let observers = state.observers.read().await;
        observers
            .values()
            .filter(|o| !o.send(&frame))
            .map(|o| o.conn_id.clone())
            .collect()
    };

    if !dead.is_empty() {
        let mut observers = state.observers.write().await;
        for conn_id in &dead {
            observers.remove(conn_id);
        }
        debug!(event, dropped = dead.len(), "removed closed observers");
    }
}
