//! Error types produced by the simulation.

use thiserror::Error;

/// Rejection raised while applying a queued intent.
///
/// None of these abort a tick; the driver either turns them into a typed
/// `error` reply or logs and drops them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("arena is full ({max} players)")]
    CapacityFull { max: usize },
    #[error("connection already controls a player")]
    AlreadyJoined,
    #[error("connection has not joined")]
    NotJoined,
    #[error("unknown connection")]
    UnknownConnection,
    #[error("food {0} is no longer present")]
    StaleClaim(u32),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
