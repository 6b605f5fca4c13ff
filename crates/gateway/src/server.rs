use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{ConnectInfo, DefaultBodyLimit, State, WebSocketUpgrade},
        response::{Html, IntoResponse, Json},
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tokio::net::TcpListener,
    tracing::info,
};

use {
    wagate_auto_reply::AutoReply,
    wagate_config::WagateConfig,
    wagate_whatsapp::{BridgeClient, CredentialCell, MessagingClient, SessionStore},
};

use crate::{
    api::{MAX_MEDIA_BYTES, send_media, send_message},
    relay::spawn_relay,
    session::{spawn_initialize, spawn_persistence},
    state::GatewayState,
    ws::handle_connection,
};

// ── Server startup ───────────────────────────────────────────────────────────

const INITIAL_INIT_BACKOFF: Duration = Duration::from_secs(1);

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route("/send-message", post(send_message))
        .route(
            "/send-media",
            post(send_media).layer(DefaultBodyLimit::max(MAX_MEDIA_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Wire the messaging client, its subscribers, and the HTTP + WebSocket
/// server, then serve until the listener fails.
pub async fn start_gateway(config: WagateConfig) -> anyhow::Result<()> {
    let store = SessionStore::new(&config.session.path);
    let saved = store.load();
    let resuming = saved.is_some();
    let credential = CredentialCell::new(saved);

    let client: Arc<dyn MessagingClient> = Arc::new(BridgeClient::new(&config.bridge)?);
    let state = GatewayState::new(
        Arc::clone(&client),
        credential.clone(),
        config.whatsapp.country_code.clone(),
    );

    // Subscribe everything before initializing so no early event is missed.
    spawn_relay(Arc::clone(&state), client.subscribe());
    spawn_persistence(store.clone(), credential, client.subscribe());
    let auto_reply = AutoReply::from_config(&config.auto_reply);
    if config.auto_reply.enabled && !auto_reply.is_empty() {
        auto_reply.spawn(Arc::clone(&client));
    }

    let app = build_gateway_app(Arc::clone(&state));

    let listener = bind_listener(&config.server.bind, config.server.port).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("wagate gateway v{}", state.version),
        format!("listening on {addr}"),
        format!("bridge: {}", config.bridge.url),
        format!(
            "session: {} ({})",
            store.path().display(),
            if resuming { "resuming" } else { "new login" }
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    // Retried in the background so the API is up while the bridge starts.
    spawn_initialize(
        Arc::clone(&state),
        INITIAL_INIT_BACKOFF,
        Duration::from_secs(config.bridge.max_reconnect_secs.max(1)),
    );

    // Run the server with ConnectInfo for remote IP extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Bind the listener. `bind` may be an IPv4 or IPv6 address or a hostname.
async fn bind_listener(bind: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((bind, port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {bind} port {port}: {e}"))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "observers": state.observer_count().await,
        "client_state": state.client_state().await,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}

async fn root_handler() -> impl IntoResponse {
    Html(include_str!("assets/index.html"))
}
