//! Driver-side view of a connection.

use std::net::SocketAddr;

/// A connection registered with the driver.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique connection ID.
    pub id: u32,
    /// Remote address.
    pub addr: SocketAddr,
    /// Player currently controlled, if joined.
    pub player: Option<u32>,
    /// Simulation clock (ms) at connect.
    pub connected_at: u64,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, now: u64) -> Self {
        Self {
            id,
            addr,
            player: None,
            connected_at: now,
        }
    }
}
