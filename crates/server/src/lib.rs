//! Blob arena game server library.

pub mod ai;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod movement;
pub mod report;
pub mod schedule;
pub mod server;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use report::MatchResult;
pub use server::{ArenaStats, Audience, Hub, Outbound, run, start};
