use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    broadcast::EventFrame,
    relay::CONNECTING_NOTICE,
    state::{ConnectedObserver, GatewayState},
};

/// Handle a dashboard WebSocket from upgrade to close.
///
/// The connecting notice is queued before the observer is registered, so it
/// is always the first frame the observer sees.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let _ = client_tx.send(EventFrame::new("message", CONNECTING_NOTICE).to_json());

    state
        .register_observer(ConnectedObserver {
            conn_id: conn_id.clone(),
            sender: client_tx,
            connected_at: Instant::now(),
        })
        .await;
    info!(conn_id = %conn_id, remote_ip = %remote_addr.ip(), "ws: observer connected");

    // Write loop: forward queued frames to the socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    // Read loop: the push channel is one-way, inbound text is ignored.
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        }
    }

    let duration = state
        .remove_observer(&conn_id)
        .await
        .map(|o| o.connected_at.elapsed())
        .unwrap_or_default();
    write_handle.abort();
    info!(
        conn_id = %conn_id,
        duration_secs = duration.as_secs(),
        "ws: observer disconnected"
    );
}
