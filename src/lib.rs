use bevy::app::PluginGroupBuilder;
use bevy::prelude::*;

pub mod camera;
pub mod ecs;
pub mod game_state;
pub mod health;
pub mod input;
pub mod net;
pub mod physics;
pub mod projectile;
pub mod shield;
pub mod ship;
pub mod testing;
pub mod world;

use camera::CameraPlugin;
use ecs::DespawnPlugin;
use game_state::GameStatePlugin;
use health::HealthPlugin;
use input::InputPlugin;
use net::NetworkPlugin;
use physics::PhysicsPlugin;
use projectile::ProjectilePlugin;
use shield::ShieldPlugin;
use ship::ShipPlugin;
use world::WorldPlugin;

/// Fixed simulation rate. The host tick, client prediction, and
/// reconciliation replay all advance in steps of this size.
pub const TICK_RATE: f64 = 60.0;
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

pub struct ArenaPlugins;

impl PluginGroup for ArenaPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::start::<Self>()
            .add(DefaultResources)
            .add(GameStatePlugin)
            .add(DespawnPlugin)
            .add(WorldPlugin)
            .add(PhysicsPlugin)
            .add(InputPlugin)
            .add(CameraPlugin)
            .add(ShipPlugin)
            .add(ProjectilePlugin)
            .add(ShieldPlugin)
            .add(HealthPlugin)
            .add(NetworkPlugin)
    }
}

pub struct DefaultResources;

impl Plugin for DefaultResources {
    fn build(&self, app: &mut App) {
        app.insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.06)))
            .insert_resource(Time::<Fixed>::from_hz(TICK_RATE));
    }
}
