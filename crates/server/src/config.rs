//! Server configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub movement: MovementConfig,
    #[serde(default)]
    pub collision: CollisionConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub food: FoodConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load configuration from `path`, writing the defaults there when the
    /// file does not exist yet.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&contents)?
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("server.tick_interval_ms must be positive"));
        }
        if self.server.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid("server.broadcast_capacity must be positive"));
        }
        if !(self.world.width > 0.0 && self.world.height > 0.0) {
            return Err(ConfigError::Invalid("world extent must be positive"));
        }
        // Counts travel as u16 on the wire.
        if self.world.max_players > u16::MAX as usize || self.world.target_food_count > u16::MAX as usize {
            return Err(ConfigError::Invalid("world.max_players and world.target_food_count must fit in u16"));
        }
        if self.collision.eat_margin < 1.0 {
            return Err(ConfigError::Invalid("collision.eat_margin must be at least 1.0"));
        }
        if !(self.collision.overlap_factor > 0.0) {
            return Err(ConfigError::Invalid("collision.overlap_factor must be positive"));
        }
        if !(self.player.min_radius > 0.0) {
            return Err(ConfigError::Invalid("player.min_radius must be positive"));
        }
        if !(0.0..=1.0).contains(&self.movement.friction) {
            return Err(ConfigError::Invalid("movement.friction must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.ai.wander_chance) {
            return Err(ConfigError::Invalid("ai.wander_chance must be within 0..=1"));
        }
        if self.food.variants.iter().all(|v| v.weight == 0) {
            return Err(ConfigError::Invalid("food.variants needs at least one positive weight"));
        }
        for variant in &self.food.variants {
            if !(variant.min_radius > 0.0 && variant.max_radius >= variant.min_radius) {
                return Err(ConfigError::Invalid("food variant radius range is empty"));
            }
            if !(variant.max_age_secs * 1000.0 >= self.server.tick_interval_ms as f32) {
                return Err(ConfigError::Invalid("food variant max_age_secs must span at least one tick"));
            }
        }
        Ok(())
    }

    /// Ticks per second implied by the tick interval.
    pub fn tick_rate(&self) -> u8 {
        (1000 / self.server.tick_interval_ms.max(1)).min(u8::MAX as u64) as u8
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Server name shown in logs and `/health`.
    #[serde(default = "default_name")]
    pub name: String,
    /// Maximum simultaneous sockets.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum simultaneous sockets per IP address.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Maximum intents applied per tick.
    #[serde(default = "default_intent_budget")]
    pub intent_budget: usize,
    /// Outbound broadcast queue length per connection.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Seconds between keepalive pings.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Seconds of silence before a connection or player is dropped.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            name: default_name(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            tick_interval_ms: default_tick_interval(),
            intent_budget: default_intent_budget(),
            broadcast_capacity: default_broadcast_capacity(),
            keepalive_interval_secs: default_keepalive_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_name() -> String {
    "Blob Arena".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_ip_limit() -> usize {
    5
}
fn default_tick_interval() -> u64 {
    50
}
fn default_intent_budget() -> usize {
    1024
}
fn default_broadcast_capacity() -> usize {
    256
}
fn default_keepalive_interval() -> u64 {
    15
}
fn default_timeout() -> u64 {
    60
}

/// World size and population limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_size")]
    pub width: f32,
    #[serde(default = "default_world_size")]
    pub height: f32,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_target_food_count")]
    pub target_food_count: usize,
    /// Food maintenance cadence (1 = every tick).
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_ticks: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_world_size(),
            height: default_world_size(),
            max_players: default_max_players(),
            target_food_count: default_target_food_count(),
            maintenance_interval_ticks: default_maintenance_interval(),
        }
    }
}

fn default_world_size() -> f32 {
    3000.0
}
fn default_max_players() -> usize {
    50
}
fn default_target_food_count() -> usize {
    200
}
fn default_maintenance_interval() -> u64 {
    1
}

/// Player growth and input limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Radius floor (also the spawn radius at zero score).
    #[serde(default = "default_min_radius")]
    pub min_radius: f32,
    /// `radius = sqrt(score * radius_factor)`.
    #[serde(default = "default_radius_factor")]
    pub radius_factor: f32,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_radius: default_min_radius(),
            radius_factor: default_radius_factor(),
            max_name_length: default_max_name_length(),
            max_chat_length: default_max_chat_length(),
        }
    }
}

fn default_min_radius() -> f32 {
    20.0
}
fn default_radius_factor() -> f32 {
    10.0
}
fn default_max_name_length() -> usize {
    15
}
fn default_max_chat_length() -> usize {
    200
}

/// Movement integrator constants, expressed per reference frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MovementConfig {
    #[serde(default = "default_acceleration")]
    pub acceleration: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default = "default_max_speed_base")]
    pub max_speed_base: f32,
    #[serde(default = "default_reference_radius")]
    pub reference_radius: f32,
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    #[serde(default = "default_reference_fps")]
    pub reference_fps: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            acceleration: default_acceleration(),
            friction: default_friction(),
            max_speed_base: default_max_speed_base(),
            reference_radius: default_reference_radius(),
            deadzone: default_deadzone(),
            reference_fps: default_reference_fps(),
        }
    }
}

impl MovementConfig {
    /// Length of one tick in reference frames.
    pub fn frames_per_tick(&self, tick_interval_ms: u64) -> f32 {
        tick_interval_ms as f32 * self.reference_fps / 1000.0
    }
}

fn default_acceleration() -> f32 {
    0.2
}
fn default_friction() -> f32 {
    0.9
}
fn default_max_speed_base() -> f32 {
    3.0
}
fn default_reference_radius() -> f32 {
    20.0
}
fn default_deadzone() -> f32 {
    5.0
}
fn default_reference_fps() -> f32 {
    60.0
}

/// Eating thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollisionConfig {
    /// Centers must be closer than `(r1 + r2) * overlap_factor`.
    #[serde(default = "default_overlap_factor")]
    pub overlap_factor: f32,
    /// A blob eats another only when `larger > smaller * eat_margin`.
    #[serde(default = "default_eat_margin")]
    pub eat_margin: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            overlap_factor: default_overlap_factor(),
            eat_margin: default_eat_margin(),
        }
    }
}

fn default_overlap_factor() -> f32 {
    0.8
}
fn default_eat_margin() -> f32 {
    1.1
}

/// Bot behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// Number of bots kept in the arena.
    #[serde(default = "default_bots")]
    pub bots: usize,
    #[serde(default = "default_detection_radius")]
    pub detection_radius: f32,
    #[serde(default = "default_search_radius")]
    pub search_radius: f32,
    /// Per-tick chance of picking a new wander target.
    #[serde(default = "default_wander_chance")]
    pub wander_chance: f64,
    #[serde(default = "default_respawn_delay")]
    pub respawn_delay_ms: u64,
    /// Bots start with a random score in `0..=start_score_max`.
    #[serde(default = "default_start_score_max")]
    pub start_score_max: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            bots: default_bots(),
            detection_radius: default_detection_radius(),
            search_radius: default_search_radius(),
            wander_chance: default_wander_chance(),
            respawn_delay_ms: default_respawn_delay(),
            start_score_max: default_start_score_max(),
        }
    }
}

fn default_bots() -> usize {
    5
}
fn default_detection_radius() -> f32 {
    100.0
}
fn default_search_radius() -> f32 {
    150.0
}
fn default_wander_chance() -> f64 {
    0.01
}
fn default_respawn_delay() -> u64 {
    3000
}
fn default_start_score_max() -> u32 {
    100
}

/// Food spawn table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodConfig {
    #[serde(default = "default_food_variants")]
    pub variants: Vec<FoodVariantConfig>,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            variants: default_food_variants(),
        }
    }
}

/// Variant names usable in the spawn table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodVariantKind {
    Small,
    Medium,
    Bonus,
    Virus,
}

/// One weighted row of the spawn table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodVariantConfig {
    pub kind: FoodVariantKind,
    pub weight: u32,
    pub min_radius: f32,
    pub max_radius: f32,
    pub value: i32,
    pub max_age_secs: f32,
}

fn default_food_variants() -> Vec<FoodVariantConfig> {
    vec![
        FoodVariantConfig {
            kind: FoodVariantKind::Small,
            weight: 70,
            min_radius: 2.0,
            max_radius: 4.0,
            value: 1,
            max_age_secs: 60.0,
        },
        FoodVariantConfig {
            kind: FoodVariantKind::Medium,
            weight: 25,
            min_radius: 4.0,
            max_radius: 7.0,
            value: 3,
            max_age_secs: 60.0,
        },
        FoodVariantConfig {
            kind: FoodVariantKind::Bonus,
            weight: 5,
            min_radius: 7.0,
            max_radius: 10.0,
            value: 5,
            max_age_secs: 60.0,
        },
        FoodVariantConfig {
            kind: FoodVariantKind::Virus,
            weight: 0,
            min_radius: 20.0,
            max_radius: 20.0,
            value: -10,
            max_age_secs: 120.0,
        },
    ]
}
