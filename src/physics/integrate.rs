use bevy::prelude::*;
use std::f32::consts::TAU;

use crate::world::ArenaConfig;
use crate::TICK_DT;

use super::body::{
    Acceleration, AngularVelocity, Collider, LastMoved, LastPose, LinearVelocity, MassProperties,
    Position, RigidBody, Rotation,
};
use super::SimTick;

/// Velocity components below these are zeroed so resting bodies don't
/// jitter.
pub const LINEAR_SLEEP_EPSILON: f32 = 0.01;
pub const ANGULAR_SLEEP_EPSILON: f32 = 0.001;

/// Mutable transform and motion of one body, detached from the ECS so the
/// same step runs on the server, in client prediction, and in
/// reconciliation replay.
#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub position: Vec2,
    pub rotation: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub acceleration: Vec2,
}

pub struct StepOutcome {
    pub moved: bool,
    /// A non-finite acceleration or velocity was reset to zero.
    pub nan_reset: bool,
}

/// Advances one body by one fixed tick.
///
/// The order here is load-bearing: rotation before translation, and bounds
/// clamp before the velocity reflection, so boundary bounces behave the
/// same everywhere this runs.
pub fn step_body(
    state: &mut BodyState,
    mass: f32,
    drag: f32,
    elasticity: f32,
    extent: f32,
    config: &ArenaConfig,
) -> StepOutcome {
    let mut nan_reset = false;
    let start_position = state.position;
    let start_rotation = state.rotation;

    // Gravity wells pull inside their falloff radius.
    for well in &config.gravity {
        let offset = well.position() - state.position;
        let dist = offset.length();
        if dist > f32::EPSILON && dist < well.falloff {
            state.acceleration += offset / dist * well.strength * mass;
        }
    }

    // One bad force contribution must not poison the whole tick.
    if !state.acceleration.is_finite() {
        state.acceleration = Vec2::ZERO;
        nan_reset = true;
    }

    state.rotation += state.angular_velocity * TICK_DT;
    state.angular_velocity *= 1.0 - drag;
    state.rotation = state.rotation.rem_euclid(TAU);
    if state.angular_velocity.abs() < ANGULAR_SLEEP_EPSILON {
        state.angular_velocity = 0.0;
    }

    state.linear_velocity += state.acceleration * TICK_DT;
    if !state.linear_velocity.is_finite() {
        state.linear_velocity = Vec2::ZERO;
        nan_reset = true;
    }
    let speed = state.linear_velocity.length();
    if speed > config.speed_limit {
        state.linear_velocity *= config.speed_limit / speed;
    }
    state.linear_velocity *= 1.0 - drag;
    state.acceleration = Vec2::ZERO;
    if state.linear_velocity.x.abs() < LINEAR_SLEEP_EPSILON {
        state.linear_velocity.x = 0.0;
    }
    if state.linear_velocity.y.abs() < LINEAR_SLEEP_EPSILON {
        state.linear_velocity.y = 0.0;
    }

    state.position += state.linear_velocity * TICK_DT;

    // Clamp to the arena, then reflect velocity on any axis where the
    // clamp was active.
    let lo = extent;
    let hi = config.map_size - extent;
    if state.position.x < lo {
        state.position.x = lo;
        state.linear_velocity.x = -state.linear_velocity.x * elasticity;
    } else if state.position.x > hi {
        state.position.x = hi;
        state.linear_velocity.x = -state.linear_velocity.x * elasticity;
    }
    if state.position.y < lo {
        state.position.y = lo;
        state.linear_velocity.y = -state.linear_velocity.y * elasticity;
    } else if state.position.y > hi {
        state.position.y = hi;
        state.linear_velocity.y = -state.linear_velocity.y * elasticity;
    }

    StepOutcome {
        moved: state.position != start_position || state.rotation != start_rotation,
        nan_reset,
    }
}

pub(super) fn integrate(
    tick: Res<SimTick>,
    config: Res<ArenaConfig>,
    mut bodies: Query<(
        &RigidBody,
        &Collider,
        &MassProperties,
        &mut Position,
        &mut Rotation,
        &mut LinearVelocity,
        &mut AngularVelocity,
        &mut Acceleration,
        &mut LastPose,
        &mut LastMoved,
    )>,
) {
    for (
        body,
        collider,
        mass,
        mut position,
        mut rotation,
        mut linear_velocity,
        mut angular_velocity,
        mut acceleration,
        mut last_pose,
        mut last_moved,
    ) in bodies.iter_mut()
    {
        if body.is_static() {
            continue;
        }

        let mut state = BodyState {
            position: position.0,
            rotation: rotation.0,
            linear_velocity: linear_velocity.0,
            angular_velocity: angular_velocity.0,
            acceleration: acceleration.0,
        };
        let outcome = step_body(
            &mut state,
            mass.mass,
            collider.drag,
            collider.elasticity,
            collider.shape.bounding_radius(),
            &config,
        );
        if outcome.nan_reset {
            warn!("non-finite acceleration or velocity reset to zero");
        }

        // Write back through change detection only for values that moved,
        // so downstream Changed<> filters stay meaningful.
        if state.position != position.0 {
            position.0 = state.position;
        }
        if state.rotation != rotation.0 {
            rotation.0 = state.rotation;
        }
        if state.linear_velocity != linear_velocity.0 {
            linear_velocity.0 = state.linear_velocity;
        }
        if state.angular_velocity != angular_velocity.0 {
            angular_velocity.0 = state.angular_velocity;
        }
        if state.acceleration != acceleration.0 {
            acceleration.0 = state.acceleration;
        }
        if outcome.moved {
            last_moved.0 = tick.0;
            last_pose.position = state.position;
            last_pose.rotation = state.rotation;
        }
    }
}
