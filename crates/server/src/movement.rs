//! Movement integrator.
//!
//! Blobs steer toward their target with a fixed acceleration, lose speed to
//! friction every frame and are capped at a speed that shrinks as they grow.
//! All rates are expressed per reference frame; `dt` is the tick length in
//! those frames.

use crate::config::MovementConfig;
use crate::entity::Player;
use crate::world::{World, WorldBorder};

/// Smallest radius used when computing the speed cap.
const MIN_SPEED_RADIUS: f32 = 1.0;

/// Speed cap for a blob of the given radius.
#[inline]
pub fn max_speed(radius: f32, config: &MovementConfig) -> f32 {
    config.max_speed_base * config.reference_radius / radius.max(MIN_SPEED_RADIUS)
}

/// Advance one player by `dt` reference frames.
pub fn integrate(player: &mut Player, border: &WorldBorder, config: &MovementConfig, dt: f32) {
    let delta = player.target - player.position;
    let dist = delta.length();
    if dist > config.deadzone {
        player.velocity += delta / dist * config.acceleration * dt;
    }

    player.velocity *= config.friction.powf(dt);
    player.velocity = player.velocity.clamp_length_max(max_speed(player.radius, config));

    player.position = border.clamp(player.position + player.velocity * dt, player.radius);
}

/// Advance every player in id order.
pub fn step(world: &mut World, config: &MovementConfig, dt: f32) {
    let border = world.border;
    for player in world.players.values_mut() {
        integrate(player, &border, config, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use glam::Vec2;
    use protocol::Color;

    fn player_at(x: f32, y: f32) -> Player {
        Player::new(1, "p".to_string(), Vec2::new(x, y), Color::default(), 0, &PlayerConfig::default())
    }

    #[test]
    fn test_at_target_and_at_rest_is_noop() {
        let border = WorldBorder::new(3000.0, 3000.0);
        let mut player = player_at(500.0, 500.0);
        integrate(&mut player, &border, &MovementConfig::default(), 3.0);
        assert_eq!(player.position, Vec2::new(500.0, 500.0));
        assert_eq!(player.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_inside_deadzone_only_decelerates() {
        let border = WorldBorder::new(3000.0, 3000.0);
        let config = MovementConfig::default();
        let mut player = player_at(500.0, 500.0);
        player.target = Vec2::new(503.0, 500.0);
        player.velocity = Vec2::new(1.0, 0.0);
        integrate(&mut player, &border, &config, 1.0);
        assert!((player.velocity.x - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_accelerates_toward_target() {
        let border = WorldBorder::new(3000.0, 3000.0);
        let mut player = player_at(500.0, 500.0);
        player.target = Vec2::new(500.0, 900.0);
        integrate(&mut player, &border, &MovementConfig::default(), 3.0);
        assert_eq!(player.velocity.x, 0.0);
        assert!(player.velocity.y > 0.0);
        assert!(player.position.y > 500.0);
    }

    #[test]
    fn test_speed_cap_shrinks_with_radius() {
        let config = MovementConfig::default();
        assert_eq!(max_speed(20.0, &config), 3.0);
        assert_eq!(max_speed(40.0, &config), 1.5);
        assert_eq!(max_speed(0.0, &config), 60.0);

        let border = WorldBorder::new(3000.0, 3000.0);
        let mut player = player_at(1500.0, 1500.0);
        player.radius = 40.0;
        player.target = Vec2::new(0.0, 1500.0);
        player.velocity = Vec2::new(-10.0, 0.0);
        integrate(&mut player, &border, &config, 1.0);
        assert!(player.velocity.length() <= 1.5 + 1e-5);
    }

    #[test]
    fn test_position_clamped_into_bounds() {
        let border = WorldBorder::new(1000.0, 1000.0);
        let config = MovementConfig::default();
        let mut player = player_at(21.0, 500.0);
        player.target = Vec2::new(-500.0, 500.0);
        player.velocity = Vec2::new(-3.0, 0.0);
        for _ in 0..20 {
            integrate(&mut player, &border, &config, 3.0);
            assert!(player.position.x >= player.radius);
        }
        assert_eq!(player.position.x, 20.0);
    }

    #[test]
    fn test_step_moves_every_player() {
        let mut world = World::new(&crate::config::WorldConfig::default());
        for i in 0..3 {
            let id = world.next_id();
            let mut p = player_at(100.0 * (i + 1) as f32, 100.0);
            p.id = id;
            p.target = Vec2::new(p.position.x, 1000.0);
            world.add_player(p);
        }
        step(&mut world, &MovementConfig::default(), 3.0);
        assert!(world.players.values().all(|p| p.position.y > 100.0));
    }
}
