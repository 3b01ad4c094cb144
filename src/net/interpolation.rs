use std::f32::consts::TAU;

use bevy::prelude::*;

use crate::game_state::GameState;
use crate::physics::{Position, Rotation};

use super::prediction::{wrap_angle, Predicted};
use super::is_guest;

/// Latest authoritative transform sample for an entity the local instance
/// does not control. Remote entities are never predicted from local input;
/// they are eased toward this target instead. Velocity is not part of the
/// target: movement frames carry only the transform, so the replicated
/// velocity is set once at spawn and position easing does the rest.
#[derive(Component, Clone, Copy, Debug)]
pub struct RemoteLerp {
    pub position: Vec2,
    pub rotation: f32,
}

/// Fraction of the remaining error closed per fixed tick.
pub const LERP_RATE: f32 = 0.25;

pub struct InterpolationPlugin;

impl Plugin for InterpolationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            interpolate_remote
                .run_if(is_guest)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

fn interpolate_remote(
    mut bodies: Query<(&RemoteLerp, &mut Position, &mut Rotation), Without<Predicted>>,
) {
    for (target, mut position, mut rotation) in bodies.iter_mut() {
        let next = position.0.lerp(target.position, LERP_RATE);
        if next != position.0 {
            position.0 = next;
        }
        // Rotation eases through the shortest path so a 359° → 1° update
        // doesn't spin the long way around.
        let delta = wrap_angle(target.rotation - rotation.0);
        if delta != 0.0 {
            rotation.0 = (rotation.0 + delta * LERP_RATE).rem_euclid(TAU);
        }
    }
}
