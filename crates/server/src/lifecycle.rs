//! Food and player lifecycle.
//!
//! Food is drawn from a weighted variant table, ages with the simulation
//! clock and is topped back up to the world's target count. Players enter
//! through [`join`] and leave explicitly, by absorption or by going quiet.

use crate::config::{Config, FoodConfig, FoodVariantConfig};
use crate::entity::{Food, FoodKind, Player, color_from_name};
use crate::error::{ConfigError, IntentError};
use crate::world::World;
use protocol::Color;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Weighted food spawn table.
#[derive(Debug, Clone)]
pub struct FoodTable {
    variants: Vec<FoodVariantConfig>,
    index: WeightedIndex<u32>,
}

impl FoodTable {
    pub fn new(config: &FoodConfig) -> Result<Self, ConfigError> {
        let index = WeightedIndex::new(config.variants.iter().map(|v| v.weight))
            .map_err(|_| ConfigError::Invalid("food.variants needs at least one positive weight"))?;
        Ok(Self {
            variants: config.variants.clone(),
            index,
        })
    }

    /// Draw a variant and place a new food item at a random position.
    pub fn spawn<R: Rng + ?Sized>(&self, world: &mut World, rng: &mut R) -> u32 {
        let variant = &self.variants[self.index.sample(rng)];
        let radius = if variant.max_radius > variant.min_radius {
            rng.random_range(variant.min_radius..variant.max_radius)
        } else {
            variant.min_radius
        };
        let position = world.border.random_position(rng);
        let id = world.next_id();
        let max_age = (variant.max_age_secs * 1000.0) as u64;
        world.add_food(Food::new(id, FoodKind::from(variant.kind), position, radius, variant.value, max_age))
    }
}

/// Age every food item by `dt_ms` and remove the expired ones.
pub fn age_food(world: &mut World, dt_ms: u64) -> Vec<u32> {
    let mut expired = Vec::new();
    for food in world.food.values_mut() {
        food.age += dt_ms;
        if food.is_expired() {
            expired.push(food.id);
        }
    }
    for id in &expired {
        world.remove_food(*id);
    }
    expired
}

/// Spawn food until the world holds `target_food_count` items.
pub fn maintain_food<R: Rng + ?Sized>(world: &mut World, table: &FoodTable, rng: &mut R) -> Vec<u32> {
    let missing = world.target_food_count.saturating_sub(world.food.len());
    (0..missing).map(|_| table.spawn(world, rng)).collect()
}

/// Spawn the immediate replacement for an eaten item, if its kind has one.
pub fn replace_eaten<R: Rng + ?Sized>(world: &mut World, table: &FoodTable, kind: FoodKind, rng: &mut R) -> Option<u32> {
    kind.is_replaced_on_eat().then(|| table.spawn(world, rng))
}

/// Register a human player for `connection`.
///
/// `name` must already be sanitized. Without a preferred color the name's
/// hash color is used.
pub fn join<R: Rng + ?Sized>(
    world: &mut World,
    connection: u32,
    name: String,
    color: Option<Color>,
    config: &Config,
    rng: &mut R,
    now: u64,
) -> Result<u32, IntentError> {
    if world.player_for_connection(connection).is_some() {
        return Err(IntentError::AlreadyJoined);
    }
    if world.is_full() {
        return Err(IntentError::CapacityFull {
            max: world.max_players,
        });
    }
    let id = world.next_id();
    let color = color.unwrap_or_else(|| color_from_name(&name));
    let position = world.border.random_position(rng);
    let mut player = Player::new(id, name, position, color, now, &config.player);
    player.position = world.border.clamp(position, player.radius);
    player.target = player.position;
    player.connection = Some(connection);
    Ok(world.add_player(player))
}

/// Remove humans whose last input is older than `timeout_ms`.
pub fn sweep_inactive(world: &mut World, now: u64, timeout_ms: u64) -> Vec<Player> {
    let stale: Vec<u32> = world
        .players
        .values()
        .filter(|p| !p.is_ai && now.saturating_sub(p.last_activity) > timeout_ms)
        .map(|p| p.id)
        .collect();
    stale.into_iter().filter_map(|id| world.remove_player(id)).collect()
}
