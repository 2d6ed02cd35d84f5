//! Game server implementation.
//!
//! One driver task owns the [`GameState`]; connection workers talk to it
//! through an intent queue and receive pre-encoded frames on a broadcast
//! channel.

use crate::config::Config;
use crate::report::MatchResult;
use crate::world::WorldBorder;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, future};
use protocol::packets::ServerOpcode;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

pub mod client;
pub mod game;
pub mod intent;
pub mod session;

pub use game::{GameState, run_game_loop};
pub use intent::Intent;
pub use session::{Frame, Session, SessionState, run_session};

/// How long shutdown waits for the game loop to apply the final disconnects.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Which connections an outbound frame is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection in the `Active` state.
    Active,
    /// Every `Active` connection except the given one.
    ActiveExcept(u32),
    /// A single connection, whatever its state.
    Connection(u32),
}

/// A frame encoded once by the driver and filtered by each worker.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub opcode: ServerOpcode,
    pub payload: Bytes,
}

impl Outbound {
    pub fn new(audience: Audience, packet: &protocol::packets::ServerPacket) -> Self {
        Self {
            audience,
            opcode: packet.opcode(),
            payload: packet.build().finish(),
        }
    }
}

/// Live counters published by the driver every tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArenaStats {
    pub tick: u64,
    pub humans: usize,
    pub bots: usize,
    pub food: usize,
    pub connections: usize,
    /// Bots created since start, respawns included.
    pub bots_spawned: u64,
    /// Bot count per AI mode from the last decision pass.
    pub bot_modes: BTreeMap<&'static str, usize>,
    pub avg_tick_ms: f64,
    pub sim_time_ms: u64,
}

/// Limits that connection workers enforce without asking the driver.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub border: WorldBorder,
    pub keepalive_interval: Duration,
    pub timeout: Duration,
    pub max_name_length: usize,
    pub max_chat_length: usize,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            border: WorldBorder::new(config.world.width, config.world.height),
            keepalive_interval: Duration::from_secs(config.server.keepalive_interval_secs.max(1)),
            timeout: Duration::from_secs(config.server.timeout_secs),
            max_name_length: config.player.max_name_length,
            max_chat_length: config.player.max_chat_length,
        }
    }
}

/// Connection tracking state (shared across connection handlers).
#[derive(Debug, Default)]
struct ConnectionState {
    /// Number of connections per IP address.
    ip_connections: HashMap<IpAddr, usize>,
    /// Total number of connections.
    total_connections: usize,
}

impl ConnectionState {
    /// Try to add a connection, returns true if allowed.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total_connections >= max_total {
            return false;
        }
        let current = self.ip_connections.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }
        *self.ip_connections.entry(ip).or_insert(0) += 1;
        self.total_connections += 1;
        true
    }

    /// Remove a connection.
    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.ip_connections.get_mut(&ip) {
            if *count > 0 {
                *count -= 1;
                self.total_connections = self.total_connections.saturating_sub(1);
            }
            if *count == 0 {
                self.ip_connections.remove(&ip);
            }
        }
    }
}

/// Everything a connection worker needs to reach the driver.
#[derive(Debug, Clone)]
pub struct Hub {
    intents: mpsc::UnboundedSender<Intent>,
    outbound: broadcast::Sender<Outbound>,
    stats: watch::Receiver<ArenaStats>,
    next_connection: Arc<AtomicU32>,
    limits: Arc<RwLock<ConnectionState>>,
    max_connections: usize,
    ip_limit: usize,
    shutdown: Arc<watch::Sender<bool>>,
    pub settings: SessionSettings,
}

impl Hub {
    pub fn new(
        config: &Config,
        intents: mpsc::UnboundedSender<Intent>,
        outbound: broadcast::Sender<Outbound>,
        stats: watch::Receiver<ArenaStats>,
    ) -> Self {
        Self {
            intents,
            outbound,
            stats,
            next_connection: Arc::new(AtomicU32::new(1)),
            limits: Arc::new(RwLock::new(ConnectionState::default())),
            max_connections: config.server.max_connections,
            ip_limit: config.server.ip_limit,
            shutdown: Arc::new(watch::channel(false).0),
            settings: SessionSettings::from_config(config),
        }
    }

    /// Allocate an id for a new connection.
    pub fn next_connection_id(&self) -> u32 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue an intent for the driver. Fails only once the driver is gone.
    pub fn send_intent(&self, intent: Intent) -> anyhow::Result<()> {
        self.intents
            .send(intent)
            .map_err(|_| anyhow::anyhow!("game loop has stopped"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound.subscribe()
    }

    /// Latest published stats.
    pub fn stats(&self) -> ArenaStats {
        self.stats.borrow().clone()
    }

    /// Ask every connection worker to close and report its disconnect.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`Hub::shutdown`] has been called.
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives as long as this hub.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Reserve a connection slot for `ip`.
    pub async fn admit(&self, ip: IpAddr) -> bool {
        self.limits
            .write()
            .await
            .try_add_connection(ip, self.max_connections, self.ip_limit)
    }

    /// Release a slot taken by [`Hub::admit`].
    pub async fn release(&self, ip: IpAddr) {
        self.limits.write().await.remove_connection(ip);
    }
}

/// Build the game state, spawn the driver task and return the hub workers
/// connect through, with the driver's handle. Ended human sessions are
/// reported on `results`.
///
/// The driver stops once every hub clone is dropped and the queued intents
/// are applied.
pub fn start(
    config: Config,
    results: Option<mpsc::UnboundedSender<MatchResult>>,
) -> anyhow::Result<(Hub, JoinHandle<()>)> {
    config.validate()?;
    let (intent_tx, intent_rx) = mpsc::unbounded_channel::<Intent>();
    let (outbound_tx, _outbound_rx) = broadcast::channel::<Outbound>(config.server.broadcast_capacity);
    let (stats_tx, stats_rx) = watch::channel(ArenaStats::default());

    let hub = Hub::new(&config, intent_tx, outbound_tx.clone(), stats_rx);
    let mut state = GameState::new(config)?;
    state.results = results;

    let driver = tokio::spawn(async move {
        run_game_loop(state, intent_rx, outbound_tx, stats_tx).await;
    });
    Ok((hub, driver))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Stop the workers, then wait for the driver to apply their disconnects.
pub async fn drain(hub: Hub, driver: JoinHandle<()>, grace: Duration) {
    hub.shutdown();
    drop(hub);
    match tokio::time::timeout(grace, driver).await {
        Ok(Ok(())) => info!("Game loop stopped"),
        Ok(Err(e)) => error!("Game loop task failed: {}", e),
        Err(_) => warn!("Game loop still running after {:?}, exiting anyway", grace),
    }
}

/// Run the plain WebSocket game server.
pub async fn run(config: Config, results: Option<mpsc::UnboundedSender<MatchResult>>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let (hub, driver) = start(config, results)?;
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => break,
        };
        if !hub.admit(addr.ip()).await {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let hub = hub.clone();
        tokio::spawn(async move {
            let result = handle_connection(stream, addr, hub.clone()).await;
            hub.release(addr.ip()).await;
            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }

    drain(hub, driver, SHUTDOWN_GRACE).await;
    Ok(())
}

/// Handle a single WebSocket connection.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: Hub) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (write, read) = ws_stream.split();
    let read = read.map(|msg| {
        msg.map(|m| match m {
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(_) => Frame::Close,
            _ => Frame::Other,
        })
    });
    let write = write.with(|payload: Bytes| future::ready(Ok::<_, tungstenite::Error>(Message::Binary(payload))));

    run_session(read, write, addr, hub).await
}
