//! Messaging client backed by a local WhatsApp Web automation sidecar.
//!
//! The sidecar drives the browser session; this adapter talks to it over a
//! small HTTP API and consumes its event stream over a WebSocket:
//!
//! | Call | Route |
//! |---|---|
//! | start/resume session | `POST /session` `{"session": <credential or null>}` |
//! | registration check | `GET /contacts/{id}/registered` → `{"registered": bool}` |
//! | send | `POST /messages` `{"chatId", "content", "options"}` → receipt |
//! | events | `GET /events` (WebSocket, one JSON frame per event) |

use std::{sync::Mutex, time::Duration};

use {
    async_trait::async_trait,
    futures::StreamExt,
    reqwest::{Method, RequestBuilder, Response},
    secrecy::{ExposeSecret, SecretString},
    serde::Deserialize,
    serde_json::{Value, json},
    tokio::{net::TcpStream, sync::broadcast, task::JoinHandle},
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{Message, client::IntoClientRequest, http::HeaderValue},
    },
    tracing::{debug, info, warn},
    url::Url,
};

use wagate_config::BridgeConfig;

use crate::{
    client::{
        ClientError, ClientEvent, InboundMessage, MessageContent, MessagingClient, Receipt,
        SendOptions,
    },
    number::RecipientId,
    session::SessionCredential,
};

/// Buffered events per subscriber before a slow subscriber starts lagging.
const EVENT_CAPACITY: usize = 64;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

type EventStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One frame of the sidecar's event stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeFrame {
    Qr {
        qr: String,
    },
    Authenticated {
        #[serde(default)]
        session: Value,
    },
    Ready,
    Message {
        message: InboundMessage,
    },
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<BridgeFrame> for ClientEvent {
    fn from(frame: BridgeFrame) -> Self {
        match frame {
            BridgeFrame::Qr { qr } => Self::Qr(qr),
            BridgeFrame::Authenticated { session } => {
                Self::Authenticated(SessionCredential::new(session))
            },
            BridgeFrame::Ready => Self::Ready,
            BridgeFrame::Message { message } => Self::Message(message),
            BridgeFrame::AuthFailure { reason } => Self::AuthFailure(reason),
            BridgeFrame::Disconnected { reason } => Self::Disconnected(reason),
        }
    }
}

fn parse_frame(text: &str) -> Option<ClientEvent> {
    match serde_json::from_str::<BridgeFrame>(text) {
        Ok(frame) => Some(frame.into()),
        Err(e) => {
            debug!(error = %e, "ignoring unrecognised bridge frame");
            None
        },
    }
}

#[derive(Deserialize)]
struct RegisteredResponse {
    registered: bool,
}

/// HTTP + WebSocket client for the automation sidecar.
pub struct BridgeClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    events: broadcast::Sender<ClientEvent>,
    max_backoff: Duration,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, ClientError> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| ClientError::Transport(format!("invalid bridge url {}: {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Transport(format!(
                "invalid bridge url {}",
                config.url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: config.token.clone(),
            events,
            max_backoff: Duration::from_secs(config.max_reconnect_secs.max(1)),
            event_task: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn events_url(&self) -> Result<Url, ClientError> {
        let mut url = self.endpoint(&["events"]);
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::Transport(format!("cannot derive event stream url from {url}")))?;
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    /// Spawn the event stream reader once. Subsequent calls are no-ops.
    fn start_event_loop(&self) -> Result<(), ClientError> {
        let mut task = self.event_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let url = self.events_url()?;
        let token = self.token.clone();
        let events = self.events.clone();
        let max_backoff = self.max_backoff;
        *task = Some(tokio::spawn(async move {
            run_event_loop(url, token, events, max_backoff).await;
        }));
        Ok(())
    }

    async fn start_session(&self, session: Option<SessionCredential>) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, self.endpoint(&["session"]))
            .json(&json!({ "session": session }))
            .send()
            .await
            .map_err(transport)?;
        check_status(resp).await?;
        Ok(())
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        let task = self
            .event_task
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = task {
            handle.abort();
        }
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    async fn initialize(&self, session: Option<SessionCredential>) -> Result<(), ClientError> {
        // Subscribe to events before the session starts so the first QR is
        // not missed.
        self.start_event_loop()?;
        info!(resume = session.is_some(), bridge = %self.base, "starting WhatsApp session");
        self.start_session(session).await
    }

    async fn is_registered_user(&self, recipient: &RecipientId) -> Result<bool, ClientError> {
        let url = self.endpoint(&["contacts", recipient.as_str(), "registered"]);
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp).await?;
        let body: RegisteredResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(body.registered)
    }

    async fn send_message(
        &self,
        to: &RecipientId,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<Receipt, ClientError> {
        let body = json!({
            "chatId": to.as_str(),
            "content": content,
            "options": options,
        });
        let resp = self
            .request(Method::POST, self.endpoint(&["messages"]))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp).await?;

        let text = resp.text().await.map_err(transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

/// Map a non-2xx response to `Rejected`, carrying the body through verbatim
/// (as JSON when it parses, as a string otherwise).
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    warn!(%status, "bridge rejected request");
    Err(ClientError::Rejected(body))
}

async fn run_event_loop(
    url: Url,
    token: Option<SecretString>,
    events: broadcast::Sender<ClientEvent>,
    max_backoff: Duration,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match connect_events(&url, token.as_ref()).await {
            Ok(mut stream) => {
                info!("bridge event stream connected");
                backoff = INITIAL_BACKOFF;
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if let Some(event) = parse_frame(text.as_str()) {
                                debug!(event = event.name(), "bridge event");
                                // No subscribers is fine, events are fire-and-forget.
                                let _ = events.send(event);
                            }
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {},
                        Err(e) => {
                            warn!(error = %e, "bridge event stream error");
                            break;
                        },
                    }
                }
                let _ = events.send(ClientEvent::Disconnected("bridge event stream closed".into()));
            },
            Err(e) => {
                warn!(error = %e, retry_in_secs = backoff.as_secs(), "bridge event stream unavailable");
            },
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn connect_events(
    url: &Url,
    token: Option<&SecretString>,
) -> Result<EventStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| tokio_tungstenite::tungstenite::Error::HttpFormat(e.into()))?;
        request.headers_mut().insert("authorization", value);
    }
    let (stream, _) = connect_async(request).await?;
    Ok(stream)
}
