//! Game state and main loop.

use crate::ai::{self, BotManager};
use crate::collision::{self, CollisionEvent};
use crate::config::Config;
use crate::entity::Player;
use crate::error::{ConfigError, IntentError};
use crate::lifecycle::{self, FoodTable};
use crate::movement;
use crate::report::MatchResult;
use crate::schedule::{Schedule, ScheduledTask};
use crate::world::World;
use futures_util::FutureExt;
use protocol::packets::{ConsumerStats, ErrorReason, LeaveReason, ServerPacket};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::client::Client;
use super::{ArenaStats, Audience, Intent, Outbound};

/// Main game state. Owned by the driver task; nothing else touches it.
pub struct GameState {
    pub config: Config,
    pub world: World,
    pub bots: BotManager,
    /// Registered connections.
    pub clients: HashMap<u32, Client>,
    pub schedule: Schedule,
    pub tick_count: u64,
    /// Simulation clock in milliseconds, advanced once per tick.
    pub now: u64,
    /// Average tick duration in milliseconds (exponential moving average).
    pub update_time_avg: f64,
    /// Sink for ended human sessions.
    pub results: Option<mpsc::UnboundedSender<MatchResult>>,
    food_table: FoodTable,
    rng: StdRng,
    /// Frames produced since the last flush, in order.
    outbox: Vec<Outbound>,
}

impl GameState {
    /// Create a new game state with an OS-seeded generator.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a new game state with the given generator.
    pub fn with_rng(config: Config, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            world: World::new(&config.world),
            bots: BotManager::new(config.ai.bots),
            food_table: FoodTable::new(&config.food)?,
            config,
            clients: HashMap::new(),
            schedule: Schedule::new(),
            tick_count: 0,
            now: 0,
            update_time_avg: 0.0,
            results: None,
            rng,
            outbox: Vec::new(),
        })
    }

    /// Fill the world with food and the configured bots.
    pub fn populate(&mut self) {
        lifecycle::maintain_food(&mut self.world, &self.food_table, &mut self.rng);
        self.bots
            .spawn_initial(&mut self.world, &self.config, &mut self.rng, self.now);
        let counts = self.world.counts();
        info!("World initialized: {} food, {} bots", counts.food, counts.bots);
    }

    fn push(&mut self, audience: Audience, packet: ServerPacket) {
        self.outbox.push(Outbound::new(audience, &packet));
    }

    /// Player controlled by `connection`.
    fn player_of(&self, connection: u32) -> Result<u32, IntentError> {
        let client = self.clients.get(&connection).ok_or(IntentError::UnknownConnection)?;
        client
            .player
            .filter(|id| self.world.players.contains_key(id))
            .ok_or(IntentError::NotJoined)
    }

    /// Refresh the activity clock of a connection's player.
    fn touch(&mut self, player: u32) {
        if let Some(p) = self.world.players.get_mut(&player) {
            p.last_activity = self.now;
        }
    }

    /// Apply one queued intent. Errors are rejections, never fatal.
    pub fn apply_intent(&mut self, intent: Intent) -> Result<(), IntentError> {
        match intent {
            Intent::Connect { connection, addr } => {
                self.clients.insert(connection, Client::new(connection, addr, self.now));
                info!("Client {} connected from {}", connection, addr);
                let welcome = self.welcome(connection);
                self.push(Audience::Connection(connection), welcome);
            }
            Intent::Join { connection, name, color } => self.handle_join(connection, name, color)?,
            Intent::Leave { connection } => {
                let player = self.player_of(connection)?;
                self.remove_human(player, LeaveReason::Left);
            }
            Intent::Move { connection, x, y } => {
                let player = self.player_of(connection)?;
                let target = self.world.border.clamp_point(x, y);
                let moved = match self.world.players.get_mut(&player) {
                    Some(p) => {
                        p.target = target;
                        p.last_activity = self.now;
                        ServerPacket::PlayerMoved {
                            id: p.id,
                            x: p.position.x,
                            y: p.position.y,
                            target_x: target.x,
                            target_y: target.y,
                        }
                    }
                    None => return Err(IntentError::NotJoined),
                };
                self.push(Audience::ActiveExcept(connection), moved);
            }
            Intent::EatClaim { connection, food_id } => {
                let player = self.player_of(connection)?;
                self.touch(player);
                let events = collision::apply_eat_claim(
                    &mut self.world,
                    player,
                    food_id,
                    &self.config.player,
                    &self.config.collision,
                )?;
                self.handle_collision_events(events);
            }
            Intent::Chat { connection, text } => {
                let player = self.player_of(connection)?;
                self.touch(player);
                let sender_name = self
                    .world
                    .players
                    .get(&player)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                debug!("Chat from {}: {}", sender_name, text);
                self.push(
                    Audience::Active,
                    ServerPacket::Chat {
                        sender_id: player,
                        sender_name,
                        text,
                        timestamp_ms: wall_clock_ms(),
                    },
                );
            }
            Intent::Heartbeat { connection } => {
                if let Ok(player) = self.player_of(connection) {
                    self.touch(player);
                }
            }
            Intent::Disconnect { connection } => {
                let client = self
                    .clients
                    .remove(&connection)
                    .ok_or(IntentError::UnknownConnection)?;
                info!(
                    "Client {} ({}) disconnected after {}ms",
                    client.id,
                    client.addr,
                    self.now.saturating_sub(client.connected_at)
                );
                if let Some(player) = client.player {
                    self.remove_human(player, LeaveReason::Left);
                }
            }
        }
        Ok(())
    }

    fn welcome(&self, connection: u32) -> ServerPacket {
        let counts = self.world.counts();
        ServerPacket::Welcome {
            connection_id: connection,
            width: self.world.border.width,
            height: self.world.border.height,
            humans: clamp_u16(counts.humans),
            bots: clamp_u16(counts.bots),
            food: clamp_u16(counts.food),
            max_players: clamp_u16(self.world.max_players),
            tick_rate: self.config.tick_rate(),
        }
    }

    fn handle_join(&mut self, connection: u32, name: String, color: Option<protocol::Color>) -> Result<(), IntentError> {
        if !self.clients.contains_key(&connection) {
            return Err(IntentError::UnknownConnection);
        }
        let joined = lifecycle::join(
            &mut self.world,
            connection,
            name,
            color,
            &self.config,
            &mut self.rng,
            self.now,
        );
        let id = match joined {
            Ok(id) => id,
            Err(e) => {
                let reason = match e {
                    IntentError::CapacityFull { .. } => ErrorReason::CapacityFull,
                    _ => ErrorReason::AlreadyJoined,
                };
                info!("Join from client {} rejected: {}", connection, e);
                self.push(Audience::Connection(connection), ServerPacket::Error(reason));
                return Err(e);
            }
        };

        if let Some(client) = self.clients.get_mut(&connection) {
            client.player = Some(id);
        }
        let Some(player) = self.world.players.get(&id).map(Player::info) else {
            return Err(IntentError::NotJoined);
        };
        info!("Client {} joined as '{}' (player {})", connection, player.name, id);

        let snapshot = ServerPacket::Snapshot {
            your_id: id,
            width: self.world.border.width,
            height: self.world.border.height,
            players: self.world.players.values().map(Player::info).collect(),
            food: self.world.food.values().map(|f| f.info()).collect(),
        };
        self.push(Audience::Connection(connection), snapshot);
        self.push(Audience::ActiveExcept(connection), ServerPacket::PlayerJoined(player));
        Ok(())
    }

    /// Take a human out of the arena and report the ended session.
    fn remove_human(&mut self, player: u32, reason: LeaveReason) -> Option<Player> {
        let removed = self.world.remove_player(player)?;
        self.detach(&removed);
        self.report(&removed, reason);
        self.push(Audience::Active, ServerPacket::PlayerLeft { id: player, reason });
        info!("Player {} '{}' left ({:?}) with score {}", removed.id, removed.name, reason, removed.score);
        Some(removed)
    }

    /// Forget the player on its owning connection.
    fn detach(&mut self, player: &Player) {
        if let Some(client) = player.connection.and_then(|c| self.clients.get_mut(&c)) {
            client.player = None;
        }
    }

    /// Emit a [`MatchResult`] and return the rank it carries.
    fn report(&self, player: &Player, cause: LeaveReason) -> usize {
        let rank = self.world.rank_of(player.score);
        if let Some(results) = &self.results {
            let _ = results.send(MatchResult::new(player, rank, self.now, cause));
        }
        rank
    }

    fn handle_collision_events(&mut self, events: Vec<CollisionEvent>) {
        for event in events {
            match event {
                CollisionEvent::FoodEaten {
                    player,
                    food,
                    kind,
                    score,
                    radius,
                } => {
                    let replacement = lifecycle::replace_eaten(&mut self.world, &self.food_table, kind, &mut self.rng)
                        .and_then(|id| self.world.food.get(&id))
                        .map(|f| f.info());
                    self.push(
                        Audience::Active,
                        ServerPacket::FoodUpdated {
                            consumed_id: food,
                            consumer: ConsumerStats { id: player, score, radius },
                            replacement,
                        },
                    );
                }
                CollisionEvent::VirusHit { player, food } => {
                    debug!("Player {} hit virus {}", player, food);
                }
                CollisionEvent::Absorbed { eater, victim } => self.on_absorbed(eater, *victim),
            }
        }
    }

    fn on_absorbed(&mut self, eater: u32, victim: Player) {
        let reason = LeaveReason::Absorbed { by: eater };
        self.push(Audience::Active, ServerPacket::PlayerLeft { id: victim.id, reason });

        if victim.is_ai {
            let due = self.now + self.config.ai.respawn_delay_ms;
            debug!("Bot {} '{}' absorbed by {}, respawning at {}ms", victim.id, victim.name, eater, due);
            self.schedule.push(due, ScheduledTask::RespawnBot { name: victim.name });
            return;
        }

        self.detach(&victim);
        let rank = self.report(&victim, reason);
        info!("Player {} '{}' absorbed by {} with score {}", victim.id, victim.name, eater, victim.score);
        if let Some(connection) = victim.connection {
            self.push(
                Audience::Connection(connection),
                ServerPacket::Eliminated {
                    by: eater,
                    final_score: victim.score,
                    rank: clamp_u16(rank),
                    survived_ms: self.now.saturating_sub(victim.joined_at),
                },
            );
        }
    }

    fn process_schedule(&mut self) {
        for task in self.schedule.drain_due(self.now) {
            match task {
                ScheduledTask::RespawnBot { name } => {
                    if self.world.is_full() {
                        let due = self.now + self.config.ai.respawn_delay_ms;
                        debug!("Arena full, postponing respawn of '{}'", name);
                        self.schedule.push(due, ScheduledTask::RespawnBot { name });
                        continue;
                    }
                    let id = self
                        .bots
                        .spawn_bot(&mut self.world, name, &self.config, &mut self.rng, self.now);
                    if let Some(info) = self.world.players.get(&id).map(Player::info) {
                        self.push(Audience::Active, ServerPacket::PlayerJoined(info));
                    }
                }
            }
        }
    }

    /// Run a single game tick and return the frames to publish, in order.
    pub fn tick(&mut self) -> Vec<Outbound> {
        let tick_start = std::time::Instant::now();
        let dt_ms = self.config.server.tick_interval_ms;
        self.tick_count += 1;
        self.now += dt_ms;

        // Scheduled respawns
        self.process_schedule();

        // Movement
        let movement_start = std::time::Instant::now();
        let dt = self.config.movement.frames_per_tick(dt_ms);
        movement::step(&mut self.world, &self.config.movement, dt);
        let movement_time = movement_start.elapsed();

        // Collision detection and eating
        let collision_start = std::time::Instant::now();
        let events = collision::resolve(&mut self.world, &self.config.player, &self.config.collision);
        self.handle_collision_events(events);
        let collision_time = collision_start.elapsed();

        // Bot decisions for the next tick
        let ai_start = std::time::Instant::now();
        ai::update(
            &mut self.world,
            &self.config.ai,
            self.config.collision.eat_margin,
            &mut self.rng,
        );
        let ai_time = ai_start.elapsed();

        // Food aging, top-up and inactivity
        let lifecycle_start = std::time::Instant::now();
        let removed = lifecycle::age_food(&mut self.world, dt_ms);
        let spawned = if self.tick_count % self.config.world.maintenance_interval_ticks.max(1) == 0 {
            lifecycle::maintain_food(&mut self.world, &self.food_table, &mut self.rng)
        } else {
            Vec::new()
        };
        let timeout_ms = self.config.server.timeout_secs * 1000;
        for player in lifecycle::sweep_inactive(&mut self.world, self.now, timeout_ms) {
            self.detach(&player);
            self.report(&player, LeaveReason::Timeout);
            info!("Player {} '{}' timed out", player.id, player.name);
            self.push(
                Audience::Active,
                ServerPacket::PlayerLeft {
                    id: player.id,
                    reason: LeaveReason::Timeout,
                },
            );
        }
        let lifecycle_time = lifecycle_start.elapsed();

        let update = ServerPacket::Update {
            tick: self.tick_count,
            players: self.world.players.values().map(Player::position_info).collect(),
            spawned: spawned
                .iter()
                .filter_map(|id| self.world.food.get(id))
                .map(|f| f.info())
                .collect(),
            removed,
        };
        self.push(Audience::Active, update);

        // Log performance metrics every 400 ticks
        if self.tick_count % 400 == 0 {
            let counts = self.world.counts();
            debug!(
                "Tick #{}: {:.2}ms total | move={:.2}ms collision={:.2}ms ai={:.2}ms lifecycle={:.2}ms | {} humans, {} bots, {} food",
                self.tick_count,
                tick_start.elapsed().as_secs_f64() * 1000.0,
                movement_time.as_secs_f64() * 1000.0,
                collision_time.as_secs_f64() * 1000.0,
                ai_time.as_secs_f64() * 1000.0,
                lifecycle_time.as_secs_f64() * 1000.0,
                counts.humans,
                counts.bots,
                counts.food
            );
        }

        std::mem::take(&mut self.outbox)
    }

    /// Current counters.
    pub fn stats(&self) -> ArenaStats {
        let counts = self.world.counts();
        let mut bot_modes = BTreeMap::new();
        for mode in self.world.players.values().filter_map(|p| p.ai_mode) {
            *bot_modes.entry(mode.as_str()).or_insert(0) += 1;
        }
        ArenaStats {
            tick: self.tick_count,
            humans: counts.humans,
            bots: counts.bots,
            food: counts.food,
            connections: self.clients.len(),
            bots_spawned: self.bots.spawned,
            bot_modes,
            avg_tick_ms: self.update_time_avg,
            sim_time_ms: self.now,
        }
    }
}

fn clamp_u16(value: usize) -> u16 {
    value.min(u16::MAX as usize) as u16
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Run the main game loop.
pub async fn run_game_loop(
    mut state: GameState,
    mut intents: mpsc::UnboundedReceiver<Intent>,
    outbound: broadcast::Sender<Outbound>,
    stats: watch::Sender<ArenaStats>,
) {
    let tick_interval_ms = state.config.server.tick_interval_ms;
    let intent_budget = state.config.server.intent_budget;
    let start = Instant::now() + Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(tick_interval_ms));
    // Use Skip to catch up on missed ticks - ensures consistent game speed.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Initial world spawn...");
    state.populate();

    loop {
        let scheduled = ticker.tick().await;

        // Drain any backlog of tick events so we always process the most recent tick.
        let mut skipped = 0u32;
        while ticker.tick().now_or_never().is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Skipped {} ticks to stay current (lag: {:?})", skipped, Instant::now().saturating_duration_since(scheduled));
        }

        // Apply queued intents, leaving the excess for the next tick
        let mut applied = 0;
        while applied < intent_budget {
            match intents.try_recv() {
                Ok(intent) => {
                    applied += 1;
                    let connection = intent.connection();
                    if let Err(e) = state.apply_intent(intent) {
                        debug!("Intent from client {} rejected: {}", connection, e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Intent queue closed, stopping game loop");
                    return;
                }
            }
        }

        let tick_start = std::time::Instant::now();
        let frames = state.tick();
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        state.update_time_avg = state.update_time_avg * 0.5 + tick_ms * 0.5;

        let tick_budget = tick_interval_ms as f64 * 0.9;
        if tick_ms > tick_budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} players, {} food",
                state.tick_count,
                tick_ms,
                tick_budget,
                state.world.players.len(),
                state.world.food.len()
            );
        }

        // Sending only fails when no worker is subscribed.
        for frame in frames {
            let _ = outbound.send(frame);
        }
        stats.send_replace(state.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::radius_for_score;
    use crate::server::{Session, SessionSettings};
    use glam::Vec2;
    use protocol::Color;
    use std::net::SocketAddr;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.ai.bots = 0;
        config.world.target_food_count = 0;
        config
    }

    fn state(config: Config) -> GameState {
        GameState::with_rng(config, StdRng::seed_from_u64(42)).unwrap()
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn connect_and_join(state: &mut GameState, connection: u32, name: &str) -> u32 {
        state.apply_intent(Intent::Connect { connection, addr: addr() }).unwrap();
        state
            .apply_intent(Intent::Join {
                connection,
                name: name.to_string(),
                color: None,
            })
            .unwrap();
        state.clients[&connection].player.unwrap()
    }

    fn decode(frames: &[Outbound]) -> Vec<(Audience, ServerPacket)> {
        frames
            .iter()
            .map(|f| (f.audience, ServerPacket::parse(&f.payload).unwrap()))
            .collect()
    }

    fn add_bot(state: &mut GameState, score: u32, at: Vec2) -> u32 {
        let id = state
            .bots
            .spawn_bot(&mut state.world, "Bot".to_string(), &state.config, &mut state.rng, state.now);
        let bot = state.world.players.get_mut(&id).unwrap();
        bot.set_score(score, &state.config.player);
        bot.position = at;
        bot.target = at;
        id
    }

    #[test]
    fn test_connect_gets_welcome() {
        let mut state = state(quiet_config());
        state.apply_intent(Intent::Connect { connection: 1, addr: addr() }).unwrap();
        let frames = decode(&state.tick());
        match &frames[0] {
            (Audience::Connection(1), ServerPacket::Welcome { connection_id, width, max_players, tick_rate, .. }) => {
                assert_eq!(*connection_id, 1);
                assert_eq!(*width, 3000.0);
                assert_eq!(*max_players, 50);
                assert_eq!(*tick_rate, 20);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_join_snapshot_precedes_update() {
        let mut state = state(quiet_config());
        let player = connect_and_join(&mut state, 1, "Ann");
        let frames = decode(&state.tick());

        assert_eq!(frames.len(), 4);
        assert!(matches!(frames[0], (Audience::Connection(1), ServerPacket::Welcome { .. })));
        match &frames[1] {
            (Audience::Connection(1), ServerPacket::Snapshot { your_id, players, .. }) => {
                assert_eq!(*your_id, player);
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Ann");
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(matches!(frames[2], (Audience::ActiveExcept(1), ServerPacket::PlayerJoined(_))));
        assert!(matches!(frames[3], (Audience::Active, ServerPacket::Update { tick: 1, .. })));
    }

    #[test]
    fn test_capacity_full_rejected() {
        let mut config = quiet_config();
        config.world.max_players = 1;
        let mut state = state(config);
        connect_and_join(&mut state, 1, "Ann");
        state.apply_intent(Intent::Connect { connection: 2, addr: addr() }).unwrap();
        let result = state.apply_intent(Intent::Join {
            connection: 2,
            name: "Bob".to_string(),
            color: None,
        });
        assert_eq!(result, Err(IntentError::CapacityFull { max: 1 }));
        assert_eq!(state.world.players.len(), 1);

        let frames = decode(&state.tick());
        assert!(frames.iter().any(|f| matches!(
            f,
            (Audience::Connection(2), ServerPacket::Error(ErrorReason::CapacityFull))
        )));
    }

    #[test]
    fn test_move_last_write_wins() {
        let mut state = state(quiet_config());
        let player = connect_and_join(&mut state, 1, "Ann");
        state.tick();

        state.apply_intent(Intent::Move { connection: 1, x: 100.0, y: 100.0 }).unwrap();
        state.apply_intent(Intent::Move { connection: 1, x: 2000.0, y: 900.0 }).unwrap();
        let frames = decode(&state.tick());

        assert_eq!(state.world.players[&player].target, Vec2::new(2000.0, 900.0));
        let echoes: Vec<_> = frames
            .iter()
            .filter(|(_, p)| matches!(p, ServerPacket::PlayerMoved { .. }))
            .collect();
        assert_eq!(echoes.len(), 2);
        assert!(echoes.iter().all(|(audience, _)| *audience == Audience::ActiveExcept(1)));
    }

    #[test]
    fn test_move_before_join_is_rejected() {
        let mut state = state(quiet_config());
        state.apply_intent(Intent::Connect { connection: 1, addr: addr() }).unwrap();
        assert_eq!(
            state.apply_intent(Intent::Move { connection: 1, x: 1.0, y: 1.0 }),
            Err(IntentError::NotJoined)
        );
        assert_eq!(
            state.apply_intent(Intent::Move { connection: 9, x: 1.0, y: 1.0 }),
            Err(IntentError::UnknownConnection)
        );
    }

    #[test]
    fn test_food_population_restored_after_consumption() {
        let mut config = quiet_config();
        config.world.target_food_count = 200;
        let mut state = state(config);
        state.populate();
        let player = connect_and_join(&mut state, 1, "Ann");
        let (food_id, food_pos) = state
            .world
            .food
            .values()
            .find(|f| f.kind.is_replaced_on_eat())
            .map(|f| (f.id, f.position))
            .unwrap();
        let p = state.world.players.get_mut(&player).unwrap();
        p.position = food_pos;
        p.target = food_pos;

        let frames = decode(&state.tick());
        assert!(!state.world.food.contains_key(&food_id));
        assert_eq!(state.world.food.len(), 200);
        assert!(frames.iter().any(|(_, p)| matches!(
            p,
            ServerPacket::FoodUpdated { consumed_id, replacement: Some(_), .. } if *consumed_id == food_id
        )));
    }

    #[test]
    fn test_stale_claim_is_ignored() {
        let mut state = state(quiet_config());
        let player = connect_and_join(&mut state, 1, "Ann");
        assert_eq!(
            state.apply_intent(Intent::EatClaim { connection: 1, food_id: 9999 }),
            Err(IntentError::StaleClaim(9999))
        );
        assert_eq!(state.world.players[&player].score, 0);
    }

    #[test]
    fn test_inactive_player_times_out() {
        let mut config = quiet_config();
        config.server.timeout_secs = 1;
        let mut viewer = Session::new(2, SessionSettings::from_config(&config));
        let mut state = state(config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.results = Some(tx);
        let player = connect_and_join(&mut state, 1, "Ann");
        viewer.on_packet(protocol::packets::ClientPacket::Join { name: "Bob".to_string(), color: None });
        connect_and_join(&mut state, 2, "Bob");

        // Only Bob stays active; frames go through his session filter.
        let mut seen = Vec::new();
        let mut run_tick = |state: &mut GameState| {
            state.apply_intent(Intent::Heartbeat { connection: 2 }).unwrap();
            for out in state.tick() {
                if viewer.on_outbound(&out) {
                    seen.push(ServerPacket::parse(&out.payload).unwrap());
                }
            }
        };
        for _ in 0..20 {
            run_tick(&mut state);
        }
        assert!(state.world.players.contains_key(&player));

        run_tick(&mut state);
        assert!(!state.world.players.contains_key(&player));
        assert_eq!(state.world.players.len(), 1);
        assert!(seen.iter().any(|p| matches!(
            p,
            ServerPacket::PlayerLeft { id, reason: LeaveReason::Timeout } if *id == player
        )));
        let result = rx.try_recv().unwrap();
        assert_eq!(result.cause, LeaveReason::Timeout);
        assert_eq!(result.player_id, player);
        assert_eq!(state.clients[&1].player, None);
    }

    #[test]
    fn test_heartbeat_keeps_player() {
        let mut config = quiet_config();
        config.server.timeout_secs = 1;
        let mut state = state(config);
        let player = connect_and_join(&mut state, 1, "Ann");
        for _ in 0..60 {
            state.apply_intent(Intent::Heartbeat { connection: 1 }).unwrap();
            state.tick();
        }
        assert!(state.world.players.contains_key(&player));
    }

    #[test]
    fn test_absorbed_human_is_eliminated() {
        let mut state = state(quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.results = Some(tx);
        let human = connect_and_join(&mut state, 1, "Ann");
        let spot = Vec2::new(1500.0, 1500.0);
        let p = state.world.players.get_mut(&human).unwrap();
        p.position = spot;
        p.target = spot;
        let bot = add_bot(&mut state, 400, spot);

        let frames = decode(&state.tick());
        assert!(!state.world.players.contains_key(&human));
        assert!(frames.iter().any(|f| matches!(
            f,
            (Audience::Connection(1), ServerPacket::Eliminated { by, rank: 2, .. }) if *by == bot
        )));
        assert!(frames.iter().any(|(_, p)| matches!(
            p,
            ServerPacket::PlayerLeft { reason: LeaveReason::Absorbed { by }, .. } if *by == bot
        )));
        let result = rx.try_recv().unwrap();
        assert_eq!(result.cause, LeaveReason::Absorbed { by: bot });
        assert_eq!(result.name, "Ann");
        assert!(state.schedule.is_empty());

        // Rejoining is allowed after elimination.
        state
            .apply_intent(Intent::Join {
                connection: 1,
                name: "Ann".to_string(),
                color: None,
            })
            .unwrap();
    }

    #[test]
    fn test_bot_respawns_after_delay() {
        let mut state = state(quiet_config());
        let spot = Vec2::new(1500.0, 1500.0);
        let big = add_bot(&mut state, 1000, spot);
        let small = add_bot(&mut state, 10, spot);

        state.tick();
        assert!(!state.world.players.contains_key(&small));
        assert_eq!(state.schedule.len(), 1);

        // Absorbed at 50ms; due at 3050ms (tick 61).
        for _ in 0..59 {
            state.tick();
        }
        assert_eq!(state.world.counts().bots, 1);

        let frames = decode(&state.tick());
        assert_eq!(state.world.counts().bots, 2);
        assert!(state.world.players.keys().all(|&id| id == big || id > small));
        assert!(frames.iter().any(|(_, p)| matches!(p, ServerPacket::PlayerJoined(info) if info.is_ai)));
    }

    #[test]
    fn test_invariants_hold_over_many_ticks() {
        let mut state = state(Config::default());
        state.populate();
        connect_and_join(&mut state, 1, "Ann");
        for _ in 0..200 {
            state.tick();
            for player in state.world.players.values() {
                assert_eq!(player.radius, radius_for_score(player.score, &state.config.player));
                assert!(state.world.border.contains(player.position));
            }
            assert!(state.world.food.values().all(|f| f.age < f.max_age));
            assert_eq!(state.world.food.len(), state.world.target_food_count);
        }
    }

    #[test]
    fn test_chat_and_disconnect() {
        let mut state = state(quiet_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.results = Some(tx);
        let player = connect_and_join(&mut state, 1, "Ann");
        state.apply_intent(Intent::Chat { connection: 1, text: "hello".to_string() }).unwrap();
        state.apply_intent(Intent::Disconnect { connection: 1 }).unwrap();

        let frames = decode(&state.tick());
        assert!(frames.iter().any(|f| matches!(
            f,
            (Audience::Active, ServerPacket::Chat { sender_name, text, .. }) if sender_name == "Ann" && text == "hello"
        )));
        assert!(frames.iter().any(|(_, p)| matches!(
            p,
            ServerPacket::PlayerLeft { id, reason: LeaveReason::Left } if *id == player
        )));
        assert!(state.clients.is_empty());
        assert!(state.world.players.is_empty());
        assert_eq!(rx.try_recv().unwrap().cause, LeaveReason::Left);
    }

    #[test]
    fn test_preferred_color_is_kept() {
        let mut state = state(quiet_config());
        state.apply_intent(Intent::Connect { connection: 1, addr: addr() }).unwrap();
        state
            .apply_intent(Intent::Join {
                connection: 1,
                name: "Ann".to_string(),
                color: Some(Color::new(9, 8, 7)),
            })
            .unwrap();
        let player = state.clients[&1].player.unwrap();
        assert_eq!(state.world.players[&player].color, Color::new(9, 8, 7));
    }

    #[tokio::test]
    async fn test_game_loop_publishes_frames() {
        let mut config = quiet_config();
        config.server.tick_interval_ms = 10;
        let state = state(config);
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = broadcast::channel(64);
        let (stats_tx, mut stats_rx) = watch::channel(ArenaStats::default());
        let driver = tokio::spawn(run_game_loop(state, intent_rx, outbound_tx, stats_tx));

        intent_tx.send(Intent::Connect { connection: 5, addr: addr() }).unwrap();
        let first = outbound_rx.recv().await.unwrap();
        assert_eq!(first.audience, Audience::Connection(5));
        assert!(matches!(ServerPacket::parse(&first.payload), Ok(ServerPacket::Welcome { .. })));

        stats_rx.changed().await.unwrap();
        assert!(stats_rx.borrow().tick >= 1);

        drop(intent_tx);
        driver.await.unwrap();
    }

    #[tokio::test]
    async fn test_game_loop_applies_final_disconnects() {
        let mut config = quiet_config();
        config.server.tick_interval_ms = 10;
        let mut state = state(config);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        state.results = Some(results_tx);
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (outbound_tx, _) = broadcast::channel(64);
        let (stats_tx, _stats_rx) = watch::channel(ArenaStats::default());
        let driver = tokio::spawn(run_game_loop(state, intent_rx, outbound_tx, stats_tx));

        intent_tx.send(Intent::Connect { connection: 3, addr: addr() }).unwrap();
        intent_tx
            .send(Intent::Join { connection: 3, name: "Ann".to_string(), color: None })
            .unwrap();
        intent_tx.send(Intent::Disconnect { connection: 3 }).unwrap();
        drop(intent_tx);

        driver.await.unwrap();
        let result = results_rx.recv().await.unwrap();
        assert_eq!(result.name, "Ann");
        assert_eq!(result.cause, LeaveReason::Left);
        assert!(results_rx.recv().await.is_none());
    }

    #[test]
    fn test_stats_report_bots() {
        let mut config = quiet_config();
        config.ai.bots = 3;
        let mut state = state(config);
        state.populate();
        state.tick();
        let stats = state.stats();
        assert_eq!(stats.bots, 3);
        assert_eq!(stats.bots_spawned, 3);
        assert_eq!(stats.bot_modes.values().sum::<usize>(), 3);
        assert_eq!(stats.tick, 1);
    }
}
