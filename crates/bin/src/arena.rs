//! Arena - game server behind an HTTP front door.
//!
//! Serves the WebSocket game endpoint plus a couple of JSON status routes.

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, future};
use serde::Serialize;
use server::server::{Frame, SHUTDOWN_GRACE, drain, run_session, shutdown_signal};
use server::{ArenaStats, Hub, MatchResult};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    hub: Hub,
    started: Instant,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("Blob Arena Server v{}", env!("CARGO_PKG_VERSION"));

    // Load server configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  World: {}x{}", config.world.width, config.world.height);
    info!("  Tick: {}ms, max players: {}", config.server.tick_interval_ms, config.world.max_players);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    // Ended sessions go to the log until a store is attached
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let results_logger = tokio::spawn(log_results(results_rx));

    // Start the game loop
    let (hub, driver) = server::start(config, Some(results_tx))?;

    let state = AppState {
        hub: hub.clone(),
        started: Instant::now(),
    };

    // Build the axum router
    let app = Router::new()
        // WebSocket game endpoint
        .route("/game", get(websocket_handler))
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Game WebSocket endpoint: ws://{}/game", addr);

    let signal_hub = hub.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_hub.shutdown();
        })
        .await?;

    // Let workers report their disconnects and flush the last results
    drain(hub, driver, SHUTDOWN_GRACE).await;
    match tokio::time::timeout(SHUTDOWN_GRACE, results_logger).await {
        Ok(Err(e)) => error!("Result logger failed: {}", e),
        Err(_) => warn!("Result logger still running, exiting anyway"),
        Ok(Ok(())) => {}
    }
    info!("Server stopped");

    Ok(())
}

async fn log_results(mut results: mpsc::UnboundedReceiver<MatchResult>) {
    while let Some(result) = results.recv().await {
        info!(
            "Session ended: '{}' (player {}) score {} rank #{} after {}s ({:?})",
            result.name,
            result.player_id,
            result.final_score,
            result.rank,
            result.duration_ms / 1000,
            result.cause
        );
    }
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<ArenaStats> {
    Json(state.hub.stats())
}

/// Handle WebSocket connections for the game
async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket connection from {}", addr);

    ws.on_upgrade(move |socket| handle_websocket(socket, addr, state.hub))
}

/// Adapt an axum WebSocket to the transport-neutral session worker.
///
/// The connection slot is taken only once the upgrade has completed, so a
/// failed handshake holds nothing.
async fn handle_websocket(mut socket: WebSocket, addr: SocketAddr, hub: Hub) {
    if !hub.admit(addr.ip()).await {
        warn!("Connection rejected (limit reached): {}", addr);
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (write, read) = socket.split();
    let read = read.map(|msg| {
        msg.map(|m| match m {
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        })
    });
    let write = write.with(|payload: Bytes| future::ready(Ok::<_, axum::Error>(Message::Binary(payload))));

    let result = run_session(read, write, addr, hub.clone()).await;
    hub.release(addr.ip()).await;
    if let Err(e) = result {
        error!("Connection error from {}: {}", addr, e);
    }
}
