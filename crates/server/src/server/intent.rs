//! Requests from connection workers to the tick driver.

use protocol::Color;
use std::net::SocketAddr;

/// A validated request queued for the next tick.
///
/// Workers have already sanitized text and clamped coordinates; the driver
/// only checks the request against the current world.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// A socket opened; the driver answers with `welcome`.
    Connect { connection: u32, addr: SocketAddr },
    Join { connection: u32, name: String, color: Option<Color> },
    Leave { connection: u32 },
    Move { connection: u32, x: f32, y: f32 },
    EatClaim { connection: u32, food_id: u32 },
    Chat { connection: u32, text: String },
    /// Keepalive answered.
    Heartbeat { connection: u32 },
    /// The socket is gone.
    Disconnect { connection: u32 },
}

impl Intent {
    /// Connection the intent came from.
    pub fn connection(&self) -> u32 {
        match self {
            Intent::Connect { connection, .. }
            | Intent::Join { connection, .. }
            | Intent::Leave { connection }
            | Intent::Move { connection, .. }
            | Intent::EatClaim { connection, .. }
            | Intent::Chat { connection, .. }
            | Intent::Heartbeat { connection }
            | Intent::Disconnect { connection } => *connection,
        }
    }
}
