//! Packet definitions for the arena protocol.
//!
//! This module contains both client->server and server->client packet types.
//! Every frame starts with a one-byte opcode.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Join the arena with a display name.
    Join = 0x00,
    /// Leave the arena (connection stays open).
    Leave = 0x01,
    /// New movement target.
    Move = 0x10,
    /// Claim that our blob consumed a food item.
    EatClaim = 0x20,
    /// Chat message.
    Chat = 0x63,
    /// Keepalive acknowledgment.
    Pong = 0xF1,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerOpcode {
    /// Sent on connect: connection id, bounds, population.
    Welcome = 0x01,
    /// Full world state, sent once after a successful join.
    Snapshot = 0x02,
    /// Per-tick state update.
    Update = 0x10,
    /// Movement target changed (never echoed to its origin).
    PlayerMoved = 0x11,
    /// A food item was consumed.
    FoodUpdated = 0x20,
    /// A player entered the arena.
    PlayerJoined = 0x30,
    /// A player left the arena.
    PlayerLeft = 0x31,
    /// Our own blob was absorbed.
    Eliminated = 0x32,
    /// Chat message.
    Chat = 0x63,
    /// Request rejected.
    Error = 0xE0,
    /// Keepalive probe.
    Ping = 0xF0,
}

impl ServerOpcode {
    /// Map a raw byte to an opcode.
    pub fn from_u8(op: u8) -> Option<Self> {
        Some(match op {
            0x01 => Self::Welcome,
            0x02 => Self::Snapshot,
            0x10 => Self::Update,
            0x11 => Self::PlayerMoved,
            0x20 => Self::FoodUpdated,
            0x30 => Self::PlayerJoined,
            0x31 => Self::PlayerLeft,
            0x32 => Self::Eliminated,
            0x63 => Self::Chat,
            0xE0 => Self::Error,
            0xF0 => Self::Ping,
            _ => return None,
        })
    }
}
