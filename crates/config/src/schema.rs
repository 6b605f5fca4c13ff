//! Config schema types (server, session, whatsapp, bridge, auto-reply).

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize, Serializer},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub whatsapp: WhatsAppConfig,
    pub bridge: BridgeConfig,
    pub auto_reply: AutoReplyConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Overridden by `--port` / `PORT` when set.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Where the session credential is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Relative paths resolve against the working directory.
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("whatsapp-session.json"),
        }
    }
}

/// Recipient formatting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Country code substituted for a leading national `0`.
    pub country_code: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            country_code: "62".into(),
        }
    }
}

/// Connection to the WhatsApp Web automation sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the sidecar's HTTP API. The event stream is served from
    /// the same origin at `/events`.
    pub url: String,

    /// Bearer token sent on every request, if the sidecar requires one.
    #[serde(serialize_with = "serialize_option_secret")]
    pub token: Option<SecretString>,

    /// Upper bound for the event stream reconnect backoff, in seconds.
    pub max_reconnect_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".into(),
            token: None,
            max_reconnect_secs: 30,
        }
    }
}

/// Keyword responder for inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    pub rules: Vec<AutoReplyRule>,
}

/// Exact-match trigger and the text sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReplyRule {
    pub trigger: String,
    pub reply: String,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: vec![
                AutoReplyRule {
                    trigger: "ping".into(),
                    reply: "pong".into(),
                },
                AutoReplyRule {
                    trigger: "good morning".into(),
                    reply: "selamat pagi".into(),
                },
            ],
        }
    }
}

/// Serialize an optional secret as its plain value (used when writing the
/// config file back to disk).
pub fn serialize_option_secret<S: Serializer>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
