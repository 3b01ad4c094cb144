use bevy::prelude::*;

use crate::game_state::GameState;
use crate::net::is_authoritative;
use crate::net::protocol::InputButtons;
use crate::physics::PhysicsSet;
use crate::ship::PilotInput;
use crate::TICK_DT;

pub struct ShieldPlugin;

impl Plugin for ShieldPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            regulate
                .in_set(PhysicsSet::ApplyForces)
                .run_if(is_authoritative)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

/// A deflector bubble. While raised and charged it extends the entity's
/// collidable extent to `radius` without changing the underlying shape.
#[derive(Component, Clone, Copy)]
pub struct Shield {
    pub radius: f32,
    pub charge: f32,
    pub max_charge: f32,
    pub drain: f32,
    pub recharge: f32,
    pub raised: bool,
}

impl Default for Shield {
    fn default() -> Self {
        Shield {
            radius: 26.0,
            charge: 100.0,
            max_charge: 100.0,
            drain: 35.0,
            recharge: 10.0,
            raised: false,
        }
    }
}

impl Shield {
    pub fn active(&self) -> bool {
        self.raised && self.charge > 0.0
    }
}

/// Raises the shield while the button is held, draining charge; lowered
/// shields trickle back up.
fn regulate(mut shields: Query<(&mut Shield, Option<&PilotInput>)>) {
    for (mut shield, pilot) in shields.iter_mut() {
        let want_raised = pilot
            .map(|pilot| pilot.buttons.pressed(InputButtons::SHIELD))
            .unwrap_or(false);
        if shield.raised != want_raised {
            shield.raised = want_raised;
        }

        if shield.active() {
            shield.charge = (shield.charge - shield.drain * TICK_DT).max(0.0);
        } else if shield.charge < shield.max_charge {
            shield.charge = (shield.charge + shield.recharge * TICK_DT).min(shield.max_charge);
        }
    }
}
