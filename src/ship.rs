use bevy::prelude::*;

use crate::game_state::GameState;
use crate::input::PlayerTag;
use crate::net::is_authoritative;
use crate::net::protocol::InputButtons;
use crate::health::Health;
use crate::physics::{
    Acceleration, AngularVelocity, BodyBundle, BodyState, Collider, PhysicsSet, RigidBody,
    Rotation, Shape,
};
use crate::projectile::Armament;
use crate::shield::Shield;
use crate::world::ArenaConfig;
use crate::TICK_DT;

pub struct ShipPlugin;

impl Plugin for ShipPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            OnEnter(GameState::Playing),
            spawn_local_ship.run_if(is_authoritative),
        )
        .add_systems(
            FixedUpdate,
            ship_controls
                .in_set(PhysicsSet::ApplyForces)
                .run_if(is_authoritative)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

#[derive(Component, Clone, Copy)]
pub struct ShipTag;

/// Thruster tuning for one ship.
#[derive(Component, Clone, Copy)]
pub struct Engine {
    pub thrust: f32,
    pub reverse_thrust: f32,
    /// Turn speed in radians per second while a turn key is held.
    pub turn_rate: f32,
    pub boost_multiplier: f32,
    pub rcs_thrust: f32,
}

impl Default for Engine {
    fn default() -> Self {
        Engine {
            thrust: 260.0,
            reverse_thrust: 140.0,
            turn_rate: 3.2,
            boost_multiplier: 2.0,
            rcs_thrust: 180.0,
        }
    }
}

#[derive(Component, Clone, Copy)]
pub struct Energy {
    pub max: f32,
    pub current: f32,
    pub recharge: f32,
    pub boost_drain: f32,
}

impl Default for Energy {
    fn default() -> Self {
        Energy {
            max: 100.0,
            current: 100.0,
            recharge: 8.0,
            boost_drain: 30.0,
        }
    }
}

/// The last input applied to a ship. On the host this comes either from
/// the local sampler or from a guest's input frames; the sequence number
/// is echoed back so the guest knows how far its history is acknowledged.
#[derive(Component, Clone, Copy, Default)]
pub struct PilotInput {
    pub buttons: InputButtons,
    pub mouse_dir: Vec2,
    pub sequence: u32,
}

#[derive(Bundle, Clone)]
pub struct ShipBundle {
    pub body: BodyBundle,
    pub tag: ShipTag,
    pub engine: Engine,
    pub energy: Energy,
    pub pilot: PilotInput,
    pub health: Health,
    pub shield: Shield,
    pub armament: Armament,
}

impl ShipBundle {
    pub fn new(position: Vec2, rotation: f32) -> Self {
        ShipBundle {
            body: BodyBundle::new(
                RigidBody::Dynamic,
                Collider {
                    shape: Shape::Triangle {
                        vertices: [
                            Vec2::new(14.0, 0.0),
                            Vec2::new(-10.0, 8.0),
                            Vec2::new(-10.0, -8.0),
                        ],
                    },
                    density: 1.0,
                    elasticity: 0.5,
                    drag: 0.015,
                },
                position,
                rotation,
            ),
            tag: ShipTag,
            engine: Engine::default(),
            energy: Energy::default(),
            pilot: PilotInput::default(),
            health: Health::from_max(100.0),
            shield: Shield::default(),
            armament: Armament::default(),
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.body = self.body.with_velocity(velocity);
        self
    }
}

/// Translates held buttons into acceleration and turn rate on a body
/// state. Pure so the host tick, client prediction, and reconciliation
/// replay produce the same trajectory from the same inputs.
pub fn apply_controls(state: &mut BodyState, buttons: InputButtons, engine: &Engine, boost: bool) {
    let facing = Vec2::from_angle(state.rotation);
    let thrust_scale = if boost { engine.boost_multiplier } else { 1.0 };

    if buttons.pressed(InputButtons::THRUST) {
        state.acceleration += facing * engine.thrust * thrust_scale;
    }
    if buttons.pressed(InputButtons::REVERSE) {
        state.acceleration -= facing * engine.reverse_thrust;
    }

    if buttons.pressed(InputButtons::RCS) {
        // RCS mode: the turn keys strafe laterally instead of rotating.
        if buttons.pressed(InputButtons::LEFT) {
            state.acceleration += facing.perp() * engine.rcs_thrust;
        }
        if buttons.pressed(InputButtons::RIGHT) {
            state.acceleration -= facing.perp() * engine.rcs_thrust;
        }
        state.angular_velocity = 0.0;
    } else if buttons.pressed(InputButtons::LEFT) {
        state.angular_velocity = engine.turn_rate;
    } else if buttons.pressed(InputButtons::RIGHT) {
        state.angular_velocity = -engine.turn_rate;
    } else {
        state.angular_velocity = 0.0;
    }
}

/// Applies each piloted ship's input as forces for this tick and settles
/// the energy budget (boost drains, idling recharges).
fn ship_controls(
    mut ships: Query<
        (
            &PilotInput,
            &Engine,
            &mut Energy,
            &Rotation,
            &mut AngularVelocity,
            &mut Acceleration,
        ),
        With<ShipTag>,
    >,
) {
    for (pilot, engine, mut energy, rotation, mut angular_velocity, mut acceleration) in
        ships.iter_mut()
    {
        let boost = pilot.buttons.pressed(InputButtons::BOOST) && energy.current > 0.0;

        let mut state = BodyState {
            position: Vec2::ZERO,
            rotation: rotation.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: angular_velocity.0,
            acceleration: acceleration.0,
        };
        apply_controls(&mut state, pilot.buttons, engine, boost);
        acceleration.0 = state.acceleration;
        angular_velocity.0 = state.angular_velocity;

        if boost {
            energy.current = (energy.current - energy.boost_drain * TICK_DT).max(0.0);
        } else if energy.current < energy.max {
            energy.current = (energy.current + energy.recharge * TICK_DT).min(energy.max);
        }
    }
}

fn spawn_local_ship(mut commands: Commands, config: Res<ArenaConfig>) {
    commands.spawn((ShipBundle::new(config.center(), 0.0), PlayerTag));
}
