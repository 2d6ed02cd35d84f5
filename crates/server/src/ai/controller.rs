use crate::config::AiConfig;
use crate::entity::{AiMode, Player};
use crate::world::World;
use glam::Vec2;
use rand::Rng;

/// Pick a mode and steering target for one bot.
///
/// Priority is fleeing, then seeking, then wandering. Nothing is remembered
/// between ticks except the previous target, which a wandering bot keeps
/// unless it rolls a new one.
pub fn decide<R: Rng + ?Sized>(
    bot: &Player,
    world: &World,
    config: &AiConfig,
    eat_margin: f32,
    rng: &mut R,
) -> (AiMode, Vec2) {
    let me = bot.position;

    let threat = world
        .players
        .values()
        .filter(|p| p.id != bot.id && p.radius > bot.radius * eat_margin)
        .map(|p| (p.position, p.position.distance(me)))
        .filter(|&(_, d)| d <= config.detection_radius)
        .min_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((threat_pos, dist)) = threat {
        let away = if dist > 0.0 {
            me - (threat_pos - me)
        } else {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            me + Vec2::new(angle.cos(), angle.sin()) * config.detection_radius
        };
        return (AiMode::Fleeing, world.border.clamp_point(away.x, away.y));
    }

    // Strict comparison keeps the lowest id on equal distances.
    let mut nearest: Option<(Vec2, f32)> = None;
    for food in world.food.values().filter(|f| f.value > 0) {
        let d = food.position.distance(me);
        if d <= config.search_radius && nearest.is_none_or(|(_, best)| d < best) {
            nearest = Some((food.position, d));
        }
    }
    if let Some((food_pos, _)) = nearest {
        return (AiMode::Seeking, food_pos);
    }

    let target = if rng.random_bool(config.wander_chance) {
        world.border.random_position(rng)
    } else {
        bot.target
    };
    (AiMode::Wandering, target)
}

/// Update every bot in id order.
pub fn update<R: Rng + ?Sized>(world: &mut World, config: &AiConfig, eat_margin: f32, rng: &mut R) {
    let bots: Vec<u32> = world.players.values().filter(|p| p.is_ai).map(|p| p.id).collect();
    for id in bots {
        let Some(bot) = world.players.get(&id) else {
            continue;
        };
        let (mode, target) = decide(bot, world, config, eat_margin, rng);
        if let Some(bot) = world.players.get_mut(&id) {
            bot.ai_mode = Some(mode);
            bot.target = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlayerConfig, WorldConfig};
    use crate::entity::{Food, FoodKind};
    use protocol::Color;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn world() -> World {
        World::new(&WorldConfig::default())
    }

    fn add_player(world: &mut World, x: f32, y: f32, score: u32, is_ai: bool) -> u32 {
        let config = PlayerConfig::default();
        let id = world.next_id();
        let mut p = Player::new(id, format!("p{id}"), Vec2::new(x, y), Color::default(), 0, &config);
        p.set_score(score, &config);
        p.is_ai = is_ai;
        world.add_player(p)
    }

    fn add_food(world: &mut World, x: f32, y: f32, value: i32) -> u32 {
        let id = world.next_id();
        let kind = if value < 0 { FoodKind::Virus } else { FoodKind::Bonus };
        world.add_food(Food::new(id, kind, Vec2::new(x, y), 5.0, value, 60_000))
    }

    #[test]
    fn test_flee_points_away_from_threat() {
        let mut world = world();
        let bot = add_player(&mut world, 1000.0, 1000.0, 0, true);
        add_player(&mut world, 1060.0, 1030.0, 400, false);
        add_food(&mut world, 1010.0, 1000.0, 5);
        let mut rng = StdRng::seed_from_u64(1);

        let (mode, target) = decide(&world.players[&bot], &world, &AiConfig::default(), 1.1, &mut rng);
        assert_eq!(mode, AiMode::Fleeing);
        let me = world.players[&bot].position;
        let to_threat = Vec2::new(60.0, 30.0);
        assert!((target - me).dot(to_threat) < 0.0);
        assert_eq!(target, Vec2::new(940.0, 970.0));
    }

    #[test]
    fn test_flee_from_coincident_threat() {
        let mut world = world();
        let bot = add_player(&mut world, 1000.0, 1000.0, 0, true);
        add_player(&mut world, 1000.0, 1000.0, 400, false);
        let mut rng = StdRng::seed_from_u64(2);
        let (mode, target) = decide(&world.players[&bot], &world, &AiConfig::default(), 1.1, &mut rng);
        assert_eq!(mode, AiMode::Fleeing);
        assert!((target.distance(Vec2::new(1000.0, 1000.0)) - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_similar_sized_neighbor_is_not_a_threat() {
        let mut world = world();
        let bot = add_player(&mut world, 1000.0, 1000.0, 40, true);
        add_player(&mut world, 1050.0, 1000.0, 45, false);
        let food = add_food(&mut world, 1100.0, 1000.0, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let (mode, target) = decide(&world.players[&bot], &world, &AiConfig::default(), 1.1, &mut rng);
        assert_eq!(mode, AiMode::Seeking);
        assert_eq!(target, world.food[&food].position);
    }

    #[test]
    fn test_seek_nearest_positive_food() {
        let mut world = world();
        let bot = add_player(&mut world, 500.0, 500.0, 0, true);
        add_food(&mut world, 520.0, 500.0, -10);
        let far = add_food(&mut world, 600.0, 500.0, 1);
        let near = add_food(&mut world, 500.0, 560.0, 1);
        add_food(&mut world, 500.0, 440.0, 1);
        add_food(&mut world, 800.0, 500.0, 5);
        let mut rng = StdRng::seed_from_u64(4);
        let (mode, target) = decide(&world.players[&bot], &world, &AiConfig::default(), 1.1, &mut rng);
        assert_eq!(mode, AiMode::Seeking);
        // Two items at distance 60: the lower id wins.
        assert_eq!(target, world.food[&near].position);
        assert_ne!(target, world.food[&far].position);
    }

    #[test]
    fn test_wander_keeps_or_rerolls_target() {
        let mut world = world();
        let bot = add_player(&mut world, 500.0, 500.0, 0, true);
        world.players.get_mut(&bot).unwrap().target = Vec2::new(42.0, 43.0);
        let mut rng = StdRng::seed_from_u64(5);

        let never = AiConfig { wander_chance: 0.0, ..AiConfig::default() };
        let (mode, target) = decide(&world.players[&bot], &world, &never, 1.1, &mut rng);
        assert_eq!(mode, AiMode::Wandering);
        assert_eq!(target, Vec2::new(42.0, 43.0));

        let always = AiConfig { wander_chance: 1.0, ..AiConfig::default() };
        let (_, target) = decide(&world.players[&bot], &world, &always, 1.1, &mut rng);
        assert!(world.border.contains(target));
        assert_ne!(target, Vec2::new(42.0, 43.0));
    }

    #[test]
    fn test_update_only_touches_bots() {
        let mut world = world();
        let bot = add_player(&mut world, 500.0, 500.0, 0, true);
        let human = add_player(&mut world, 2000.0, 2000.0, 0, false);
        let food = add_food(&mut world, 550.0, 500.0, 1);
        let mut rng = StdRng::seed_from_u64(6);
        update(&mut world, &AiConfig::default(), 1.1, &mut rng);
        assert_eq!(world.players[&bot].ai_mode, Some(AiMode::Seeking));
        assert_eq!(world.players[&bot].target, world.food[&food].position);
        assert_eq!(world.players[&human].ai_mode, None);
    }
}
