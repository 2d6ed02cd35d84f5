//! Per-connection worker.
//!
//! A worker parses and validates client frames, forwards them to the driver
//! as intents and writes out the frames addressed to it. It owns the
//! connection's [`SessionState`].

use super::{Audience, Hub, Intent, Outbound, SessionSettings};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use protocol::packets::{ClientPacket, ServerOpcode, ServerPacket};
use protocol::text::{sanitize, sanitize_name};
use std::fmt::Display;
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// Transport-neutral inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Binary(Bytes),
    Close,
    /// Text, transport pings and the like. Counts as activity only.
    Other,
}

/// Where a connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no player.
    Connecting,
    /// Join forwarded, waiting for the snapshot or an error.
    Joined,
    /// Controls a player and receives broadcasts.
    Active,
    Disconnected,
}

/// Connection state machine, kept separate from the socket so it can be
/// driven directly.
#[derive(Debug)]
pub struct Session {
    pub connection: u32,
    pub state: SessionState,
    settings: SessionSettings,
}

impl Session {
    pub fn new(connection: u32, settings: SessionSettings) -> Self {
        Self {
            connection,
            state: SessionState::Connecting,
            settings,
        }
    }

    /// Validate a client packet against the current state and turn it into
    /// an intent for the driver.
    pub fn on_packet(&mut self, packet: ClientPacket) -> Option<Intent> {
        let connection = self.connection;
        match (self.state, packet) {
            (SessionState::Disconnected, _) => None,
            (_, ClientPacket::Pong { .. }) => Some(Intent::Heartbeat { connection }),
            (SessionState::Connecting, ClientPacket::Join { name, color }) => {
                self.state = SessionState::Joined;
                Some(Intent::Join {
                    connection,
                    name: sanitize_name(&name, self.settings.max_name_length),
                    color,
                })
            }
            // The driver answers with `already_joined`.
            (SessionState::Active, ClientPacket::Join { name, color }) => Some(Intent::Join {
                connection,
                name: sanitize_name(&name, self.settings.max_name_length),
                color,
            }),
            (SessionState::Joined | SessionState::Active, ClientPacket::Leave) => {
                self.state = SessionState::Connecting;
                Some(Intent::Leave { connection })
            }
            (SessionState::Active, ClientPacket::Move { x, y }) => {
                let target = self.settings.border.clamp_point(x, y);
                Some(Intent::Move {
                    connection,
                    x: target.x,
                    y: target.y,
                })
            }
            (SessionState::Active, ClientPacket::EatClaim { food_id }) => Some(Intent::EatClaim { connection, food_id }),
            (SessionState::Active, ClientPacket::Chat { text }) => {
                let text = sanitize(&text, self.settings.max_chat_length);
                (!text.is_empty()).then_some(Intent::Chat { connection, text })
            }
            (state, packet) => {
                debug!("Connection {} ignored {:?} while {:?}", connection, packet.opcode(), state);
                None
            }
        }
    }

    /// Decide whether an outbound frame is written to this connection,
    /// applying the state transitions replies cause.
    pub fn on_outbound(&mut self, out: &Outbound) -> bool {
        match out.audience {
            Audience::Connection(c) if c == self.connection => {
                match (out.opcode, self.state) {
                    (ServerOpcode::Snapshot, SessionState::Joined) => self.state = SessionState::Active,
                    (ServerOpcode::Error, SessionState::Joined) => self.state = SessionState::Connecting,
                    (ServerOpcode::Eliminated, SessionState::Active) => self.state = SessionState::Connecting,
                    _ => {}
                }
                true
            }
            Audience::Connection(_) => false,
            Audience::Active => self.state == SessionState::Active,
            Audience::ActiveExcept(c) => self.state == SessionState::Active && c != self.connection,
        }
    }
}

/// Drive one connection until it closes.
///
/// `read` yields inbound frames and `write` accepts encoded server frames;
/// both are transport adapters around a WebSocket.
pub async fn run_session<S, W, E>(read: S, write: W, addr: SocketAddr, hub: Hub) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Frame, E>>,
    E: Display,
    W: Sink<Bytes>,
    W::Error: Display,
{
    let mut read = std::pin::pin!(read);
    let mut write = std::pin::pin!(write);

    let connection = hub.next_connection_id();
    let mut session = Session::new(connection, hub.settings.clone());
    let mut outbound = hub.subscribe();
    hub.send_intent(Intent::Connect { connection, addr })?;

    let keepalive = hub.settings.keepalive_interval;
    let timeout = hub.settings.timeout;
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();
    let mut nonce = 0u32;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Frame::Binary(data))) => {
                        last_seen = Instant::now();
                        match ClientPacket::parse(&data) {
                            Ok(packet) => {
                                if let Some(intent) = session.on_packet(packet) {
                                    hub.send_intent(intent)?;
                                }
                            }
                            Err(e) => debug!("Bad packet from {}: {}", addr, e),
                        }
                    }
                    Some(Ok(Frame::Other)) => last_seen = Instant::now(),
                    Some(Ok(Frame::Close)) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                }
            }
            out = outbound.recv() => {
                match out {
                    Ok(out) => {
                        if session.on_outbound(&out) {
                            if let Err(e) = write.send(out.payload).await {
                                warn!("Failed to send to {}: {}", addr, e);
                                break;
                            }
                        }
                    }
                    // Dropped frames may include our own snapshot or error reply.
                    Err(RecvError::Lagged(n)) => {
                        warn!("Connection {} lagged behind by {} frames, closing", connection, n);
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = hub.stopped() => {
                info!("Closing connection {} for shutdown", connection);
                break;
            }
            _ = ticker.tick() => {
                if last_seen.elapsed() > timeout {
                    info!("Connection {} from {} timed out", connection, addr);
                    break;
                }
                nonce = nonce.wrapping_add(1);
                let ping = ServerPacket::Ping { nonce }.build().finish();
                if let Err(e) = write.send(ping).await {
                    warn!("Failed to ping {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    session.state = SessionState::Disconnected;
    hub.send_intent(Intent::Disconnect { connection })?;
    Ok(())
}
