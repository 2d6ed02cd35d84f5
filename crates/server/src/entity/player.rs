//! Player blob.

use crate::config::PlayerConfig;
use glam::Vec2;
use protocol::Color;
use protocol::packets::{PlayerInfo, PlayerPosition};

/// Behaviour a bot settled on during its last decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiMode {
    Fleeing,
    Seeking,
    Wandering,
}

impl AiMode {
    /// Label used in the published stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            AiMode::Fleeing => "fleeing",
            AiMode::Seeking => "seeking",
            AiMode::Wandering => "wandering",
        }
    }
}

/// A blob in the arena, controlled either by a connection or by the AI.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub position: Vec2,
    /// Always derived from `score`, see [`radius_for_score`].
    pub radius: f32,
    pub velocity: Vec2,
    /// Point the blob steers toward.
    pub target: Vec2,
    pub score: u32,
    pub color: Color,
    pub is_ai: bool,
    /// Last derived AI mode (bots only).
    pub ai_mode: Option<AiMode>,
    /// Owning connection (humans only).
    pub connection: Option<u32>,
    /// Simulation clock (ms) of the last input from the owner.
    pub last_activity: u64,
    /// Simulation clock (ms) at spawn.
    pub joined_at: u64,
}

impl Player {
    /// Create a player at rest with zero score.
    pub fn new(id: u32, name: String, position: Vec2, color: Color, now: u64, config: &PlayerConfig) -> Self {
        Self {
            id,
            name,
            position,
            radius: radius_for_score(0, config),
            velocity: Vec2::ZERO,
            target: position,
            score: 0,
            color,
            is_ai: false,
            ai_mode: None,
            connection: None,
            last_activity: now,
            joined_at: now,
        }
    }

    /// Replace the score and recompute the radius.
    pub fn set_score(&mut self, score: u32, config: &PlayerConfig) {
        self.score = score;
        self.radius = radius_for_score(score, config);
    }

    /// Apply a signed score change, saturating at zero.
    pub fn add_score(&mut self, delta: i64, config: &PlayerConfig) {
        let score = (self.score as i64 + delta).clamp(0, u32::MAX as i64) as u32;
        self.set_score(score, config);
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            x: self.position.x,
            y: self.position.y,
            radius: self.radius,
            score: self.score,
            color: self.color,
            is_ai: self.is_ai,
        }
    }

    pub fn position_info(&self) -> PlayerPosition {
        PlayerPosition {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            radius: self.radius,
            score: self.score,
        }
    }
}

/// `max(min_radius, sqrt(score * radius_factor))`.
#[inline]
pub fn radius_for_score(score: u32, config: &PlayerConfig) -> f32 {
    (score as f32 * config.radius_factor).sqrt().max(config.min_radius)
}

/// Deterministic color derived from a display name.
///
/// The name's UTF-16 units are folded with the usual `h * 31 + c` string
/// hash, which then picks hue, saturation (70-99%) and lightness (45-64%).
pub fn color_from_name(name: &str) -> Color {
    let hash = name
        .encode_utf16()
        .fold(0i32, |h, c| (c as i32).wrapping_add(h.wrapping_shl(5).wrapping_sub(h)));
    let h = hash.unsigned_abs();
    let hue = (h % 360) as f32;
    let saturation = (70 + h % 30) as f32 / 100.0;
    let lightness = (45 + h % 20) as f32 / 100.0;
    hsl_to_rgb(hue, saturation, lightness)
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Color {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Color::new(channel(r), channel(g), channel(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_law() {
        let config = PlayerConfig::default();
        assert_eq!(radius_for_score(0, &config), 20.0);
        assert_eq!(radius_for_score(40, &config), 20.0);
        assert!((radius_for_score(45, &config) - 450f32.sqrt()).abs() < 1e-4);
        assert!(radius_for_score(1000, &config) > radius_for_score(999, &config));
    }

    #[test]
    fn test_score_saturates_at_zero() {
        let config = PlayerConfig::default();
        let mut player = Player::new(1, "a".to_string(), Vec2::ZERO, Color::default(), 0, &config);
        player.set_score(5, &config);
        player.add_score(-10, &config);
        assert_eq!(player.score, 0);
        assert_eq!(player.radius, 20.0);
        player.add_score(90, &config);
        assert_eq!(player.score, 90);
        assert_eq!(player.radius, 30.0);
    }

    #[test]
    fn test_color_from_name_is_stable() {
        assert_eq!(color_from_name("Blobby"), color_from_name("Blobby"));
        assert_ne!(color_from_name("Blobby"), color_from_name("Hunter"));
    }

    #[test]
    fn test_hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), Color::new(255, 0, 0));
        assert_eq!(hsl_to_rgb(120.0, 1.0, 0.5), Color::new(0, 255, 0));
        assert_eq!(hsl_to_rgb(240.0, 1.0, 0.5), Color::new(0, 0, 255));
    }
}
