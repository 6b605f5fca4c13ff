//! WhatsApp Web session seam.
//!
//! The protocol itself lives in an external automation component. This crate
//! holds what the gateway needs around it: recipient formatting, session
//! credential persistence, the [`MessagingClient`] trait with its event
//! stream, and the [`BridgeClient`] adapter that implements it.

pub mod bridge;
pub mod client;
pub mod media;
pub mod number;
pub mod session;

pub use {
    bridge::BridgeClient,
    client::{
        ClientError, ClientEvent, InboundMessage, MessageContent, MessagingClient, Receipt,
        SendOptions,
    },
    media::MessageMedia,
    number::{InvalidNumber, RECIPIENT_SUFFIX, RecipientId, format_recipient},
    session::{CredentialCell, SessionCredential, SessionStore, StorageError},
};
