//! Collision detection and the mass economy.
//!
//! This module handles:
//! - Overlap tests between blobs and food
//! - The eat rule (a blob must be clearly larger than what it absorbs)
//! - Resolving a tick's worth of eating in id order

use crate::config::{CollisionConfig, PlayerConfig};
use crate::entity::{FoodKind, Player};
use crate::error::IntentError;
use crate::world::World;
use glam::Vec2;

/// Result of checking two circles against each other.
#[derive(Debug, Clone, Copy)]
pub struct CollisionResult {
    /// Combined radius of both circles
    pub r: f32,
    /// Actual distance
    pub d: f32,
}

impl CollisionResult {
    /// Whether the circles overlap deeply enough to interact.
    #[inline]
    pub fn overlaps(&self, factor: f32) -> bool {
        self.d < self.r * factor
    }
}

/// Measure two circles.
#[inline]
pub fn check_collision(a_pos: Vec2, a_radius: f32, b_pos: Vec2, b_radius: f32) -> CollisionResult {
    CollisionResult {
        r: a_radius + b_radius,
        d: a_pos.distance(b_pos),
    }
}

/// `dist(a, b) < (ra + rb) * factor`.
#[inline]
pub fn overlaps(a: Vec2, ra: f32, b: Vec2, rb: f32, factor: f32) -> bool {
    check_collision(a, ra, b, rb).overlaps(factor)
}

/// Squared radius for `score`.
#[inline]
fn radius_sq(score: u32, config: &PlayerConfig) -> f64 {
    let min = config.min_radius as f64;
    (score as f64 * config.radius_factor as f64).max(min * min)
}

/// A blob with score `larger` can absorb one with score `smaller`:
/// `radius(larger) > radius(smaller) * margin`.
///
/// Compared on squared radii in f64, so a ratio of exactly `margin` never
/// absorbs.
#[inline]
pub fn can_eat(larger: u32, smaller: u32, config: &PlayerConfig, margin: f32) -> bool {
    let margin = margin as f64;
    radius_sq(larger, config) > radius_sq(smaller, config) * margin * margin
}

/// Something that happened while resolving collisions.
#[derive(Debug, Clone)]
pub enum CollisionEvent {
    /// A player consumed a food item. `score` and `radius` are the
    /// player's values right after eating.
    FoodEaten {
        player: u32,
        food: u32,
        kind: FoodKind,
        score: u32,
        radius: f32,
    },
    /// The consumed food was a virus. Follows the matching `FoodEaten`.
    VirusHit { player: u32, food: u32 },
    /// `eater` absorbed `victim`, who is no longer in the world.
    Absorbed { eater: u32, victim: Box<Player> },
}

/// Resolve every collision for this tick.
///
/// Players are visited in id order. Food goes first, then player pairs; a
/// player removed by absorption takes no further part.
pub fn resolve(world: &mut World, player_config: &PlayerConfig, config: &CollisionConfig) -> Vec<CollisionEvent> {
    let mut events = Vec::new();
    let ids: Vec<u32> = world.players.keys().copied().collect();

    for &player_id in &ids {
        let Some(player) = world.players.get(&player_id) else {
            continue;
        };
        let (pos, radius) = (player.position, player.radius);
        let touching: Vec<u32> = world
            .food
            .values()
            .filter(|f| overlaps(pos, radius, f.position, f.radius, config.overlap_factor))
            .map(|f| f.id)
            .collect();
        for food_id in touching {
            consume_food(world, player_id, food_id, player_config, &mut events);
        }
    }

    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            let (Some(pa), Some(pb)) = (world.players.get(&a), world.players.get(&b)) else {
                continue;
            };
            if !overlaps(pa.position, pa.radius, pb.position, pb.radius, config.overlap_factor) {
                continue;
            }
            let (eater, victim) = if can_eat(pa.score, pb.score, player_config, config.eat_margin) {
                (a, b)
            } else if can_eat(pb.score, pa.score, player_config, config.eat_margin) {
                (b, a)
            } else {
                continue;
            };
            absorb(world, eater, victim, player_config, &mut events);
            if victim == a {
                break;
            }
        }
    }

    events
}

/// Apply a client's claim that `player` ate `food_id`.
///
/// The claim is re-checked against the authoritative state; a claim for
/// food that is already gone is stale.
pub fn apply_eat_claim(
    world: &mut World,
    player: u32,
    food_id: u32,
    player_config: &PlayerConfig,
    config: &CollisionConfig,
) -> Result<Vec<CollisionEvent>, IntentError> {
    let food = world.food.get(&food_id).ok_or(IntentError::StaleClaim(food_id))?;
    let p = world.players.get(&player).ok_or(IntentError::NotJoined)?;
    if !overlaps(p.position, p.radius, food.position, food.radius, config.overlap_factor) {
        return Ok(Vec::new());
    }
    let mut events = Vec::new();
    consume_food(world, player, food_id, player_config, &mut events);
    Ok(events)
}

fn consume_food(
    world: &mut World,
    player_id: u32,
    food_id: u32,
    player_config: &PlayerConfig,
    events: &mut Vec<CollisionEvent>,
) {
    let Some(player) = world.players.get_mut(&player_id) else {
        return;
    };
    let Some(food) = world.food.remove(&food_id) else {
        return;
    };
    player.add_score(food.value as i64, player_config);
    events.push(CollisionEvent::FoodEaten {
        player: player_id,
        food: food_id,
        kind: food.kind,
        score: player.score,
        radius: player.radius,
    });
    if food.kind == FoodKind::Virus {
        events.push(CollisionEvent::VirusHit {
            player: player_id,
            food: food_id,
        });
    }
}

fn absorb(world: &mut World, eater: u32, victim: u32, player_config: &PlayerConfig, events: &mut Vec<CollisionEvent>) {
    let Some(victim_player) = world.players.remove(&victim) else {
        return;
    };
    if let Some(p) = world.players.get_mut(&eater) {
        p.add_score(victim_player.score as i64, player_config);
    }
    events.push(CollisionEvent::Absorbed {
        eater,
        victim: Box::new(victim_player),
    });
}
