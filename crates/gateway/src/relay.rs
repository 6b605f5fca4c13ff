//! Maps messaging-client lifecycle events onto dashboard push frames.

use std::sync::Arc;

use {
    tokio::{
        sync::broadcast::{Receiver, error::RecvError},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use wagate_whatsapp::ClientEvent;

use crate::{
    broadcast::broadcast,
    qr::qr_data_url,
    state::{ClientState, GatewayState},
};

pub const CONNECTING_NOTICE: &str = "Menghubungkan...";
pub const SCAN_QR_NOTICE: &str = "Silahkan Scan QR code!";
pub const READY_NOTICE: &str = "Whatsapp is ready!";
pub const AUTHENTICATED_NOTICE: &str = "Whatsapp is authenticated!";
pub const QR_FAILED_NOTICE: &str = "QR code could not be rendered";

/// Relay one event to every observer. Frames for a single event are sent
/// back to back so observers see them in order.
pub async fn relay_event(state: &GatewayState, event: &ClientEvent) {
    if let Some(next) = ClientState::after(event) {
        state.set_client_state(next).await;
    }

    match event {
        ClientEvent::Qr(payload) => {
            info!("login QR received");
            match qr_data_url(payload) {
                Ok(url) => {
                    broadcast(state, "qr", url).await;
                    broadcast(state, "message", SCAN_QR_NOTICE).await;
                },
                Err(e) => {
                    warn!(error = %e, "could not render login QR");
                    broadcast(state, "message", format!("{QR_FAILED_NOTICE}: {e}")).await;
                },
            }
        },
        ClientEvent::Ready => {
            info!("whatsapp session ready");
            broadcast(state, "ready", READY_NOTICE).await;
            broadcast(state, "message", READY_NOTICE).await;
        },
        ClientEvent::Authenticated(_) => {
            info!("whatsapp session authenticated");
            broadcast(state, "authenticated", AUTHENTICATED_NOTICE).await;
            broadcast(state, "message", AUTHENTICATED_NOTICE).await;
        },
        ClientEvent::AuthFailure(reason) => {
            warn!(reason = %reason, "whatsapp authentication failed");
            broadcast(state, "message", format!("Authentication failed: {reason}")).await;
        },
        ClientEvent::Disconnected(reason) => {
            warn!(reason = %reason, "whatsapp session disconnected");
            broadcast(state, "message", format!("Disconnected: {reason}")).await;
        },
        ClientEvent::Message(_) => {},
    }
}

/// Spawn the single relay task. Events are consumed in emission order.
pub fn spawn_relay(state: Arc<GatewayState>, mut events: Receiver<ClientEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => relay_event(&state, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event relay fell behind, events skipped");
                },
                Err(RecvError::Closed) => {
                    debug!("client event stream closed, relay stopping");
                    break;
                },
            }
        }
    })
}
