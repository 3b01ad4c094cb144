//! The authoritative rigid-body simulation: integration, broad-phase grid,
//! AABB maintenance, and narrow-phase contact resolution, staged strictly
//! in sequence every fixed tick.

use bevy::prelude::*;

use crate::game_state::GameState;
use crate::net::is_authoritative;

pub mod aabb;
pub mod body;
pub mod broad;
pub mod grid;
pub mod integrate;
pub mod narrow;
pub mod shape;

pub use aabb::Aabb;
pub use body::{
    Acceleration, AngularVelocity, BodyBundle, Collider, LastMoved, LastPose, LinearVelocity,
    MassProperties, Position, RigidBody, Rotation,
};
pub use integrate::{step_body, BodyState};
pub use narrow::{CollisionEvent, Collisions};
pub use shape::Shape;

/// Monotonic simulation tick counter, incremented once per fixed update on
/// the authority.
#[derive(Resource, Default)]
pub struct SimTick(pub u64);

/// One tick runs these phases in strict sequence. The grid and the per-tick
/// contact list are only ever touched by their own phase, which is the
/// whole concurrency story.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicsSet {
    ApplyForces,
    Integrate,
    SyncGrid,
    RefreshAabbs,
    BroadPhase,
    NarrowPhase,
}

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimTick>()
            .init_resource::<grid::SpatialGrid>()
            .init_resource::<broad::BroadPhasePairs>()
            .init_resource::<narrow::Collisions>()
            .add_message::<narrow::CollisionEvent>()
            .configure_sets(
                FixedUpdate,
                (
                    PhysicsSet::ApplyForces,
                    PhysicsSet::Integrate,
                    PhysicsSet::SyncGrid,
                    PhysicsSet::RefreshAabbs,
                    PhysicsSet::BroadPhase,
                    PhysicsSet::NarrowPhase,
                )
                    .chain(),
            )
            .add_systems(
                FixedUpdate,
                (advance_tick, body::derive_mass_properties)
                    .in_set(PhysicsSet::ApplyForces)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                FixedUpdate,
                integrate::integrate
                    .in_set(PhysicsSet::Integrate)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                FixedUpdate,
                (grid_sync, grid_prune)
                    .in_set(PhysicsSet::SyncGrid)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                FixedUpdate,
                aabb::refresh
                    .in_set(PhysicsSet::RefreshAabbs)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                FixedUpdate,
                broad::collect_pairs
                    .in_set(PhysicsSet::BroadPhase)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(
                FixedUpdate,
                narrow::resolve
                    .in_set(PhysicsSet::NarrowPhase)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(Update, sync_transforms);
    }
}

fn advance_tick(mut tick: ResMut<SimTick>) {
    tick.0 += 1;
}

/// Re-homes bodies whose position changed this tick; new bodies are
/// inserted by the same path since `update` falls back to insert.
fn grid_sync(
    mut grid: ResMut<grid::SpatialGrid>,
    moved: Query<(Entity, &Position), Changed<Position>>,
) {
    for (entity, position) in moved.iter() {
        grid.update(entity, position.0);
    }
}

fn grid_prune(
    mut grid: ResMut<grid::SpatialGrid>,
    mut removed: RemovedComponents<Position>,
) {
    for entity in removed.read() {
        grid.remove(entity);
    }
}

/// Mirrors simulation transforms into render transforms, preserving the
/// sprite layer.
fn sync_transforms(mut bodies: Query<(&Position, &Rotation, &mut Transform)>) {
    for (position, rotation, mut transform) in bodies.iter_mut() {
        let target = Vec3::new(position.0.x, position.0.y, transform.translation.z);
        if transform.translation != target {
            transform.translation = target;
        }
        let target_rot = Quat::from_rotation_z(rotation.0);
        if transform.rotation != target_rot {
            transform.rotation = target_rot;
        }
    }
}
