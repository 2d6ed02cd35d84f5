//! Bot players.
//!
//! The controller re-derives each bot's steering target every tick; the
//! manager creates bots and names them.

mod bot_manager;
mod controller;

pub use bot_manager::{BOT_NAMES, BotManager};
pub use controller::{decide, update};
