//! Results handed to the persistence collaborator.

use crate::entity::Player;
use protocol::packets::LeaveReason;

/// Summary of one ended human session.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub player_id: u32,
    pub name: String,
    pub final_score: u32,
    /// One-based leaderboard position at the moment the session ended.
    pub rank: usize,
    pub duration_ms: u64,
    pub cause: LeaveReason,
}

impl MatchResult {
    pub fn new(player: &Player, rank: usize, now: u64, cause: LeaveReason) -> Self {
        Self {
            player_id: player.id,
            name: player.name.clone(),
            final_score: player.score,
            rank,
            duration_ms: now.saturating_sub(player.joined_at),
            cause,
        }
    }
}
