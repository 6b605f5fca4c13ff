//! Session lifecycle around the messaging client: starting it with the
//! current credential, and persisting the credential whenever the client
//! authenticates.

use std::{sync::Arc, time::Duration};

use {
    tokio::{
        sync::broadcast::{Receiver, error::RecvError},
        task::JoinHandle,
    },
    tracing::{error, info, warn},
};

use wagate_whatsapp::{ClientEvent, CredentialCell, SessionCredential, SessionStore};

use crate::state::GatewayState;

/// Initialize the client with whatever credential the cell holds, retrying
/// with capped exponential backoff until the client accepts. The cell is
/// re-read on every attempt so a login completed meanwhile is resumed.
/// Returns the number of attempts made.
pub async fn initialize_with_retry(
    state: &GatewayState,
    initial: Duration,
    max: Duration,
) -> usize {
    let mut backoff = initial;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let credential = state.credential.get().await;
        let resume = credential.is_some();
        match state.client.initialize(credential).await {
            Ok(()) => {
                info!(attempts, resume, "messaging client started");
                return attempts;
            },
            Err(e) => {
                warn!(
                    error = %e,
                    attempts,
                    retry_in_ms = backoff.as_millis() as u64,
                    "messaging client did not start"
                );
            },
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max);
    }
}

pub fn spawn_initialize(
    state: Arc<GatewayState>,
    initial: Duration,
    max: Duration,
) -> JoinHandle<usize> {
    tokio::spawn(async move { initialize_with_retry(&state, initial, max).await })
}

/// Update the in-memory cell and write the credential to disk. Storage
/// failures are logged, never propagated. Returns whether the file was
/// written.
pub async fn persist_credential(
    store: &SessionStore,
    cell: &CredentialCell,
    credential: SessionCredential,
) -> bool {
    cell.set(credential.clone()).await;

    let store = store.clone();
    let path = store.path().to_path_buf();
    match tokio::task::spawn_blocking(move || store.save(&credential)).await {
        Ok(Ok(())) => {
            info!(path = %path.display(), "session credential saved");
            true
        },
        Ok(Err(e)) => {
            error!(error = %e, "failed to save session credential");
            false
        },
        Err(e) => {
            error!(error = %e, "session save task failed");
            false
        },
    }
}

/// Persist every `authenticated` credential until the event stream closes.
/// Events are handled sequentially, so the file is only ever written by one
/// task at a time. Returns the number of successful saves.
pub async fn run_persistence(
    store: SessionStore,
    cell: CredentialCell,
    mut events: Receiver<ClientEvent>,
) -> usize {
    let mut saved = 0;
    loop {
        match events.recv().await {
            Ok(ClientEvent::Authenticated(credential)) => {
                if persist_credential(&store, &cell, credential).await {
                    saved += 1;
                }
            },
            Ok(_) => {},
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "session persistence fell behind, events skipped");
            },
            Err(RecvError::Closed) => return saved,
        }
    }
}

pub fn spawn_persistence(
    store: SessionStore,
    cell: CredentialCell,
    events: Receiver<ClientEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(run_persistence(store, cell, events))
}
