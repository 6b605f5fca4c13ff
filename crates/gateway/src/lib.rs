//! Gateway: HTTP API and dashboard push channel over the messaging client.
//!
//! Lifecycle:
//! 1. Load the saved session credential
//! 2. Build the messaging client and subscribe the relay, session
//!    persistence, and auto-reply tasks to its events
//! 3. Initialize the client (resuming the saved session when present)
//! 4. Serve `/`, `/ws`, `/health`, `/send-message`, `/send-media`

pub mod api;
pub mod broadcast;
pub mod qr;
pub mod relay;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

pub use server::{build_gateway_app, start_gateway};
