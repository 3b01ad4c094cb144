use bevy::prelude::*;

use crate::ecs::DespawnEvent;
use crate::game_state::GameState;
use crate::net::is_authoritative;
use crate::net::protocol::InputButtons;
use crate::physics::{
    BodyBundle, Collider, LinearVelocity, PhysicsSet, Position, RigidBody, Rotation, Shape,
};
use crate::ship::{PilotInput, ShipTag};
use crate::TICK_DT;

pub struct ProjectilePlugin;

impl Plugin for ProjectilePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (fire, expire)
                .in_set(PhysicsSet::ApplyForces)
                .run_if(is_authoritative)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

pub const PROJECTILE_RADIUS: f32 = 3.0;
pub const PROJECTILE_SPEED: f32 = 420.0;
pub const PROJECTILE_LIFETIME: f32 = 2.5;
pub const MINE_RADIUS: f32 = 8.0;
pub const MINE_LIFETIME: f32 = 30.0;

const FIRE_INTERVAL: f32 = 0.25;
const MINE_INTERVAL: f32 = 1.5;

/// Something launched by a ship. The firer back-reference drives the
/// narrow-phase ownership exclusions (no self-hits, sibling shots pass
/// through each other).
#[derive(Component, Clone, Copy)]
pub struct Projectile {
    pub firer: Entity,
}

#[derive(Component, Clone, Copy)]
pub struct MineTag;

/// Remaining seconds before the entity is despawned.
#[derive(Component, Clone, Copy)]
pub struct Lifetime(pub f32);

/// Per-ship weapon cooldowns, counted down each tick.
#[derive(Component, Clone, Copy, Default)]
pub struct Armament {
    pub fire_cooldown: f32,
    pub mine_cooldown: f32,
}

pub fn projectile_body(position: Vec2, rotation: f32, radius: f32) -> BodyBundle {
    BodyBundle::new(
        RigidBody::Dynamic,
        Collider {
            shape: Shape::Circle { radius },
            density: 4.0,
            elasticity: 0.2,
            drag: 0.0,
        },
        position,
        rotation,
    )
}

pub fn mine_body(position: Vec2, radius: f32) -> BodyBundle {
    BodyBundle::new(
        RigidBody::Dynamic,
        Collider {
            shape: Shape::Circle { radius },
            density: 2.0,
            elasticity: 0.4,
            drag: 0.02,
        },
        position,
        0.0,
    )
}

fn fire(
    mut commands: Commands,
    mut ships: Query<
        (
            Entity,
            &PilotInput,
            &Position,
            &Rotation,
            &LinearVelocity,
            &mut Armament,
        ),
        With<ShipTag>,
    >,
) {
    for (entity, pilot, position, rotation, velocity, mut armament) in ships.iter_mut() {
        if armament.fire_cooldown > 0.0 {
            armament.fire_cooldown -= TICK_DT;
        }
        if armament.mine_cooldown > 0.0 {
            armament.mine_cooldown -= TICK_DT;
        }

        let aim = if pilot.mouse_dir != Vec2::ZERO {
            pilot.mouse_dir.normalize()
        } else {
            Vec2::from_angle(rotation.0)
        };

        if pilot.buttons.pressed(InputButtons::FIRE) && armament.fire_cooldown <= 0.0 {
            armament.fire_cooldown = FIRE_INTERVAL;
            let muzzle = position.0 + aim * 20.0;
            commands.spawn((
                projectile_body(muzzle, aim.to_angle(), PROJECTILE_RADIUS)
                    .with_velocity(aim * PROJECTILE_SPEED + velocity.0),
                Projectile { firer: entity },
                Lifetime(PROJECTILE_LIFETIME),
            ));
        }

        if pilot.buttons.pressed(InputButtons::DROP) && armament.mine_cooldown <= 0.0 {
            armament.mine_cooldown = MINE_INTERVAL;
            // Mines drop behind the ship, inheriting a little of its speed.
            let behind = position.0 - Vec2::from_angle(rotation.0) * 24.0;
            commands.spawn((
                mine_body(behind, MINE_RADIUS).with_velocity(velocity.0 * 0.25),
                Projectile { firer: entity },
                MineTag,
                Lifetime(MINE_LIFETIME),
            ));
        }
    }
}

fn expire(
    mut timed: Query<(Entity, &mut Lifetime)>,
    mut despawn: MessageWriter<DespawnEvent>,
) {
    for (entity, mut lifetime) in timed.iter_mut() {
        lifetime.0 -= TICK_DT;
        if lifetime.0 <= 0.0 {
            despawn.write(DespawnEvent(entity));
        }
    }
}
