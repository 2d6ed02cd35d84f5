//! World state management.
//!
//! Owns every player and food item. Both live in ordered maps so that
//! iteration always follows id order.

use crate::config::WorldConfig;
use crate::entity::{Food, Player};
use glam::Vec2;
use protocol::Color;
use rand::Rng;
use std::collections::BTreeMap;

/// The arena containing all entities.
#[derive(Debug)]
pub struct World {
    /// Next entity ID to assign.
    next_entity_id: u32,
    /// World bounds.
    pub border: WorldBorder,
    /// Players by ID.
    pub players: BTreeMap<u32, Player>,
    /// Food items by ID.
    pub food: BTreeMap<u32, Food>,
    /// Food maintenance tops up to this many items.
    pub target_food_count: usize,
    /// Join requests are refused at this many players.
    pub max_players: usize,
}

/// World bounds, spanning `0..=width` by `0..=height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBorder {
    pub width: f32,
    pub height: f32,
}

impl WorldBorder {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Get a uniformly random position within the border.
    #[inline]
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(rng.random_range(0.0..=self.width), rng.random_range(0.0..=self.height))
    }

    /// Clamp a blob center so the blob stays inside, keeping a margin of
    /// `min(radius, half-extent)` on each axis.
    #[inline]
    pub fn clamp(&self, position: Vec2, radius: f32) -> Vec2 {
        let mx = radius.min(self.width / 2.0).max(0.0);
        let my = radius.min(self.height / 2.0).max(0.0);
        Vec2::new(
            position.x.clamp(mx, self.width - mx),
            position.y.clamp(my, self.height - my),
        )
    }

    /// Clamp a point (such as a steering target) onto the bounds.
    #[inline]
    pub fn clamp_point(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    #[inline]
    pub fn contains(&self, position: Vec2) -> bool {
        (0.0..=self.width).contains(&position.x) && (0.0..=self.height).contains(&position.y)
    }
}

/// Population counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldCounts {
    pub humans: usize,
    pub bots: usize,
    pub food: usize,
}

impl World {
    /// Create an empty world from configuration.
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            next_entity_id: 1,
            border: WorldBorder::new(config.width, config.height),
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            target_food_count: config.target_food_count,
            max_players: config.max_players,
        }
    }

    /// Get the next entity ID. Players and food share the counter.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1);
        if self.next_entity_id == 0 {
            self.next_entity_id = 1; // Skip 0
        }
        id
    }

    pub fn add_player(&mut self, player: Player) -> u32 {
        let id = player.id;
        self.players.insert(id, player);
        id
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn add_food(&mut self, food: Food) -> u32 {
        let id = food.id;
        self.food.insert(id, food);
        id
    }

    pub fn remove_food(&mut self, id: u32) -> Option<Food> {
        self.food.remove(&id)
    }

    /// Whether a join would exceed `max_players`.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// Get the count of each population.
    pub fn counts(&self) -> WorldCounts {
        let bots = self.players.values().filter(|p| p.is_ai).count();
        WorldCounts {
            humans: self.players.len() - bots,
            bots,
            food: self.food.len(),
        }
    }

    /// One-based leaderboard position a player with `score` would hold.
    pub fn rank_of(&self, score: u32) -> usize {
        1 + self.players.values().filter(|p| p.score > score).count()
    }

    /// Player controlled by a given connection, if any.
    pub fn player_for_connection(&self, connection: u32) -> Option<u32> {
        self.players
            .values()
            .find(|p| p.connection == Some(connection))
            .map(|p| p.id)
    }

    /// Generate a random color.
    #[inline]
    pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Color {
        Color::new(
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        )
    }
}
