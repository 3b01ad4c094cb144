use bevy::prelude::*;

use crate::ecs::DespawnEvent;
use crate::game_state::GameState;
use crate::net::is_authoritative;
use crate::physics::{CollisionEvent, PhysicsSet};
use crate::shield::Shield;

pub struct HealthPlugin;

/// Runs after the narrow phase so this tick's collision events are
/// already written.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HealthSet;

impl Plugin for HealthPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(FixedUpdate, HealthSet.after(PhysicsSet::NarrowPhase))
            .add_systems(
                FixedUpdate,
                (damage, health_despawner)
                    .chain()
                    .in_set(HealthSet)
                    .run_if(is_authoritative)
                    .run_if(in_state(GameState::Playing)),
            );
    }
}

#[derive(Component, Clone, Copy)]
pub struct Health {
    pub max: f32,
    pub current: f32,
}

impl Health {
    pub fn from_max(max: f32) -> Self {
        Health { max, current: max }
    }
}

/// Converts accumulated contact impulse into hit points.
const DAMAGE_PER_IMPULSE: f32 = 0.001;
/// Contacts softer than this are scrapes, not hits.
const DAMAGE_FLOOR: f32 = 1.0;

fn damage(
    mut events: MessageReader<CollisionEvent>,
    mut targets: Query<(&mut Health, Option<&mut Shield>)>,
) {
    for event in events.read() {
        let amount = event.impulse * DAMAGE_PER_IMPULSE;
        if amount < DAMAGE_FLOOR {
            continue;
        }
        for entity in [event.a, event.b] {
            // One side of the pair may be indestructible or already gone.
            let Ok((mut health, shield)) = targets.get_mut(entity) else {
                continue;
            };
            let mut remaining = amount;
            if let Some(mut shield) = shield {
                if shield.active() {
                    let absorbed = remaining.min(shield.charge);
                    shield.charge -= absorbed;
                    remaining -= absorbed;
                }
            }
            if remaining > 0.0 {
                health.current -= remaining;
            }
        }
    }
}

fn health_despawner(
    q: Query<(Entity, &Health), Changed<Health>>,
    mut despawn: MessageWriter<DespawnEvent>,
) {
    for (entity, health) in q.iter() {
        if health.current <= 0.0 {
            despawn.write(DespawnEvent(entity));
        }
    }
}
