use bevy::prelude::*;

pub struct DespawnPlugin;

impl Plugin for DespawnPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<DespawnEvent>().add_systems(Last, despawn);
    }
}

/// Request to remove an entity at the end of the frame. Going through a
/// message instead of despawning inline lets interested systems (the host
/// broadcast, damage bookkeeping) still read the entity this frame.
#[derive(Message)]
pub struct DespawnEvent(pub Entity);

fn despawn(mut commands: Commands, mut ev: MessageReader<DespawnEvent>) {
    for DespawnEvent(entity) in ev.read() {
        // The same entity can be requested twice in one frame.
        if let Ok(mut entity_commands) = commands.get_entity(*entity) {
            entity_commands.despawn();
        }
    }
}
