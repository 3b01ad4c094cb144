use bevy::prelude::*;
use tokio::io::AsyncWriteExt;

use crate::game_state::GameState;
use crate::health::Health;
use crate::input::PlayerTag;
use crate::net::protocol::{BodyKind, SpawnFrame, StatusKind, WireMessage};
use crate::physics::{BodyBundle, Collider, RigidBody, Shape};
use crate::projectile;
use crate::shield::Shield;
use crate::ship::{Energy, ShipBundle};

use super::interpolation::RemoteLerp;
use super::prediction::{AuthoritativeUpdate, InputBuffer, Predicted, ReconciliationState};
use super::sync::ServerTickEstimate;
use super::{
    is_guest, read_frame, GuestChannels, LocalNetId, NetEntityMap, NetId, NetworkRole,
};

pub struct GuestPlugin;

impl Plugin for GuestPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            guest_apply_updates
                .run_if(is_guest)
                .run_if(not(in_state(GameState::MainMenu))),
        )
        .add_systems(
            Update,
            guest_apply_welcome.run_if(resource_exists::<PendingWelcome>),
        );
    }
}

/// Welcome payload queued for a Bevy system to apply (spawning needs
/// `Commands`, which `start_guest_connection` does not have).
#[derive(Resource)]
struct PendingWelcome {
    bodies: Vec<SpawnFrame>,
}

/// Connect to the host, send the join request, adopt the welcome snapshot.
pub fn start_guest_connection(world: &mut World, addr: String) {
    info!("Connecting to host at {addr}...");

    let (update_tx, update_rx) = crossbeam_channel::unbounded();
    let (input_tx, mut input_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);

    // The streaming halves stay async, but the join handshake is awaited
    // here so the world can be populated before the first frame.
    let (init_tx, init_rx) = std::sync::mpsc::channel();

    let addr_clone = addr.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime for guest");

        rt.block_on(async move {
            let stream = match tokio::net::TcpStream::connect(&addr_clone).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to connect to host: {e}");
                    let _ = init_tx.send(Err(format!("Connection failed: {e}")));
                    return;
                }
            };
            let (mut read_half, mut write_half) = stream.into_split();

            let join = WireMessage::Join {
                name: "Guest".to_string(),
            }
            .encode();
            if let Err(e) = write_half.write_all(&join).await {
                error!("Join send failed: {e}");
                let _ = init_tx.send(Err(format!("Join failed: {e}")));
                return;
            }

            // The first frame back must be the welcome.
            let Some((type_id, payload)) = read_frame(&mut read_half).await else {
                let _ = init_tx.send(Err("Host closed during join".to_string()));
                return;
            };
            match WireMessage::decode(type_id, &payload) {
                Ok(WireMessage::Welcome { assigned_id, tick, bodies }) => {
                    let _ = init_tx.send(Ok((assigned_id, tick, bodies)));
                }
                other => {
                    error!("Expected welcome, got {other:?}");
                    let _ = init_tx.send(Err("Bad welcome".to_string()));
                    return;
                }
            }

            // Forward locally sampled input frames to the host.
            tokio::spawn(async move {
                while let Some(frame) = input_rx.recv().await {
                    if write_half.write_all(&frame).await.is_err() {
                        break;
                    }
                }
            });

            // Read world updates and forward to Bevy. Dropping update_tx on
            // exit lets the ECS side observe the disconnect.
            loop {
                match read_frame(&mut read_half).await {
                    Some((type_id, payload)) => match WireMessage::decode(type_id, &payload) {
                        Ok(update) => {
                            let _ = update_tx.send(update);
                        }
                        Err(e) => {
                            warn!("Dropping malformed frame: {e}");
                        }
                    },
                    None => {
                        info!("Host stream ended");
                        break;
                    }
                }
            }
        });
    });

    match init_rx.recv() {
        Ok(Ok((assigned_id, tick, bodies))) => {
            info!("Joined as guest {assigned_id}");
            world.insert_resource(GuestChannels { update_rx, input_tx });
            world.insert_resource(LocalNetId(assigned_id));
            world.insert_resource(NetEntityMap::default());
            world.insert_resource(ServerTickEstimate::starting_at(tick as u64));
            world.insert_resource(NetworkRole::Guest { addr });
            world.insert_resource(PendingWelcome { bodies });
        }
        Ok(Err(e)) => {
            error!("Failed to join: {e}");
        }
        Err(_) => {
            error!("Connection thread died");
        }
    }
}

/// Builds the local entity for a replicated body. The guest's own ship
/// gets the prediction components; everything else is smoothed toward
/// authoritative samples.
fn spawn_replicated(commands: &mut Commands, frame: &SpawnFrame, is_local: bool) -> Entity {
    let lerp = RemoteLerp {
        position: frame.position,
        rotation: frame.rotation,
    };
    match frame.kind {
        BodyKind::Ship => {
            let ship = ShipBundle::new(frame.position, frame.rotation)
                .with_velocity(frame.velocity);
            let mut entity = commands.spawn((ship, NetId(frame.entity_id)));
            if is_local {
                entity.insert((
                    PlayerTag,
                    Predicted,
                    InputBuffer::default(),
                    ReconciliationState::default(),
                ));
            } else {
                entity.insert(lerp);
            }
            entity.id()
        }
        BodyKind::Projectile => commands
            .spawn((
                projectile::projectile_body(frame.position, frame.rotation, frame.param_a)
                    .with_velocity(frame.velocity),
                NetId(frame.entity_id),
                lerp,
            ))
            .id(),
        BodyKind::Mine => commands
            .spawn((
                projectile::mine_body(frame.position, frame.param_a),
                NetId(frame.entity_id),
                lerp,
            ))
            .id(),
        BodyKind::Obstacle => commands
            .spawn((
                BodyBundle::new(
                    RigidBody::Static,
                    Collider {
                        shape: Shape::Box {
                            half_extents: Vec2::new(frame.param_a, frame.param_b),
                        },
                        density: 1.0,
                        elasticity: 0.6,
                        drag: 0.0,
                    },
                    frame.position,
                    frame.rotation,
                ),
                NetId(frame.entity_id),
            ))
            .id(),
    }
}

fn guest_apply_welcome(
    mut commands: Commands,
    pending: Res<PendingWelcome>,
    local: Res<LocalNetId>,
    mut map: ResMut<NetEntityMap>,
) {
    info!("Applying welcome snapshot: {} bodies", pending.bodies.len());
    for frame in &pending.bodies {
        if map.0.contains_key(&frame.entity_id) {
            continue;
        }
        let entity = spawn_replicated(&mut commands, frame, frame.entity_id == local.0);
        map.0.insert(frame.entity_id, entity);
    }
    commands.remove_resource::<PendingWelcome>();
}

#[allow(clippy::too_many_arguments, clippy::type_complexity)]
fn guest_apply_updates(
    mut commands: Commands,
    channels: Option<Res<GuestChannels>>,
    local: Option<Res<LocalNetId>>,
    mut map: Option<ResMut<NetEntityMap>>,
    mut server_tick: Option<ResMut<ServerTickEstimate>>,
    mut authoritative: MessageWriter<AuthoritativeUpdate>,
    mut lerps: Query<&mut RemoteLerp>,
    predicted: Query<(), With<Predicted>>,
    mut healths: Query<&mut Health>,
    mut energies: Query<&mut Energy>,
    mut shields: Query<&mut Shield>,
    replicated: Query<Entity, With<NetId>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    let Some(channels) = channels else {
        return;
    };
    let Some(local) = local else {
        return;
    };
    let Some(ref mut map) = map else {
        return;
    };

    loop {
        let update = match channels.update_rx.try_recv() {
            Ok(update) => update,
            Err(crossbeam_channel::TryRecvError::Empty) => break,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                warn!("Host disconnected, returning to main menu");
                commands.remove_resource::<GuestChannels>();
                commands.remove_resource::<LocalNetId>();
                commands.remove_resource::<NetEntityMap>();
                commands.insert_resource(NetworkRole::Offline);
                for entity in replicated.iter() {
                    if let Ok(mut entity_commands) = commands.get_entity(entity) {
                        entity_commands.despawn();
                    }
                }
                next_state.set(GameState::MainMenu);
                return;
            }
        };

        match update {
            WireMessage::Movement(frame) => {
                if let Some(ref mut sync) = server_tick {
                    sync.observe(frame.tick as u64);
                }
                let Some(&entity) = map.0.get(&frame.entity_id) else {
                    continue;
                };
                // The locally controlled entity is corrected through
                // reconciliation, never through the remote path.
                if predicted.get(entity).is_ok() {
                    continue;
                }
                if let Ok(mut lerp) = lerps.get_mut(entity) {
                    lerp.position = frame.position;
                    lerp.rotation = frame.rotation;
                }
            }
            WireMessage::PlayerState(frame) => {
                if let Some(ref mut sync) = server_tick {
                    sync.observe(frame.tick as u64);
                }
                if frame.entity_id == local.0 {
                    authoritative.write(AuthoritativeUpdate(frame));
                }
            }
            WireMessage::Status(frame) => {
                let Some(&entity) = map.0.get(&frame.entity_id) else {
                    continue;
                };
                match frame.kind {
                    StatusKind::Health => {
                        if let Ok(mut health) = healths.get_mut(entity) {
                            health.current = frame.value as f32;
                        }
                    }
                    StatusKind::Energy => {
                        if let Ok(mut energy) = energies.get_mut(entity) {
                            energy.current = frame.value as f32;
                        }
                    }
                    StatusKind::ShieldCharge => {
                        if let Ok(mut shield) = shields.get_mut(entity) {
                            shield.charge = frame.value as f32;
                        }
                    }
                }
            }
            WireMessage::Spawn(frame) => {
                if map.0.contains_key(&frame.entity_id) {
                    continue;
                }
                let entity =
                    spawn_replicated(&mut commands, &frame, frame.entity_id == local.0);
                map.0.insert(frame.entity_id, entity);
            }
            WireMessage::Despawn { entity_id } => {
                if let Some(entity) = map.0.remove(&entity_id) {
                    if let Ok(mut entity_commands) = commands.get_entity(entity) {
                        entity_commands.despawn();
                    }
                }
            }
            other => {
                warn!("Unexpected message from host: {other:?}");
            }
        }
    }
}
