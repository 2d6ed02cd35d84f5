use crate::config::Config;
use crate::entity::Player;
use crate::world::World;
use rand::Rng;
use tracing::debug;

/// Bot names to use.
pub const BOT_NAMES: &[&str] = &[
    "Bot", "Hunter", "Hungry", "Nomnom", "Blob", "Cell", "Eater", "Seeker",
    "Roamer", "Wanderer", "Ghost", "Shadow", "Swift", "Tiny", "Big", "Mega",
];

/// Creates bots and keeps track of how many the arena should hold.
#[derive(Debug, Default)]
pub struct BotManager {
    /// Number of bots kept in the arena.
    pub target: usize,
    /// Bots created so far, respawns included.
    pub spawned: u64,
}

impl BotManager {
    /// Create a new bot manager.
    pub fn new(target: usize) -> Self {
        Self { target, spawned: 0 }
    }

    /// Pick a name for a new bot.
    pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
        let name_idx = rng.random_range(0..BOT_NAMES.len());
        format!("{}{}", BOT_NAMES[name_idx], rng.random_range(0..100))
    }

    /// Add a bot with the given name at a random position and a random
    /// starting score.
    pub fn spawn_bot<R: Rng + ?Sized>(
        &mut self,
        world: &mut World,
        name: String,
        config: &Config,
        rng: &mut R,
        now: u64,
    ) -> u32 {
        let id = world.next_id();
        let position = world.border.random_position(rng);
        let mut bot = Player::new(id, name, position, World::random_color(rng), now, &config.player);
        bot.is_ai = true;
        bot.set_score(rng.random_range(0..=config.ai.start_score_max), &config.player);
        bot.position = world.border.clamp(position, bot.radius);
        bot.target = bot.position;
        debug!("Spawned bot {} '{}' with score {}", id, bot.name, bot.score);
        self.spawned += 1;
        world.add_player(bot)
    }

    /// Fill the arena up to the configured bot count, respecting capacity.
    pub fn spawn_initial<R: Rng + ?Sized>(&mut self, world: &mut World, config: &Config, rng: &mut R, now: u64) -> Vec<u32> {
        let mut ids = Vec::with_capacity(self.target);
        while world.counts().bots < self.target && !world.is_full() {
            let name = Self::random_name(rng);
            ids.push(self.spawn_bot(world, name, config, rng, now));
        }
        ids
    }
}
