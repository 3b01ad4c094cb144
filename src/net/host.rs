use bevy::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::ecs::DespawnEvent;
use crate::game_state::GameState;
use crate::health::{Health, HealthSet};
use crate::net::protocol::{
    BodyKind, MovementFrame, PlayerStateFrame, SpawnFrame, StatusFrame, StatusKind, WireMessage,
};
use crate::physics::{
    Collider, LastMoved, LinearVelocity, PhysicsSet, Position, RigidBody, Rotation, Shape, SimTick,
};
use crate::projectile::{MineTag, Projectile};
use crate::shield::Shield;
use crate::ship::{Energy, PilotInput, ShipBundle, ShipTag};
use crate::world::ArenaConfig;

use super::{
    is_host, read_frame, GuestInputEvent, GuestSenders, GuestTag, HostChannels, JoinEvent,
    LeaveEvent, NetId, NetIdAllocator, NetworkRole, WelcomeData,
};

pub struct HostPlugin;

impl Plugin for HostPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (
                host_handle_joins,
                host_handle_leaves,
                host_receive_input,
                host_broadcast_despawns,
            )
                .chain()
                .run_if(is_host)
                .run_if(in_state(GameState::Playing)),
        )
        .add_systems(
            FixedUpdate,
            (
                assign_net_ids,
                host_broadcast_spawns,
                host_broadcast_movement,
                host_broadcast_status,
            )
                .chain()
                .after(PhysicsSet::NarrowPhase)
                .after(HealthSet)
                .run_if(is_host)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

/// Starts hosting: binds the listener on a dedicated runtime thread and
/// inserts the bridge resources.
pub fn start_hosting(world: &mut World, port: u16) {
    let channels = HostChannels::default();
    let join_tx = channels.join_tx.clone();
    let input_tx = channels.input_tx.clone();
    let leave_tx = channels.leave_tx.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime for host");

        rt.block_on(async move {
            let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind port {port}: {e}");
                    return;
                }
            };
            info!("Hosting on port {port}");

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!("Connection from {peer}");
                        tokio::spawn(handle_connection(
                            stream,
                            join_tx.clone(),
                            input_tx.clone(),
                            leave_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("Accept failed: {e}");
                    }
                }
            }
        });
    });

    world.insert_resource(channels);
    world.insert_resource(GuestSenders::default());
    world.insert_resource(NetworkRole::Host { port });
}

/// Per-connection task: a framed read loop into the bridge channels and a
/// write task draining the outgoing queue.
async fn handle_connection(
    stream: TcpStream,
    join_tx: crossbeam_channel::Sender<JoinEvent>,
    input_tx: crossbeam_channel::Sender<GuestInputEvent>,
    leave_tx: crossbeam_channel::Sender<LeaveEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);

    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut assigned: Option<u32> = None;
    loop {
        let Some((type_id, payload)) = read_frame(&mut read_half).await else {
            break;
        };
        match WireMessage::decode(type_id, &payload) {
            Ok(WireMessage::Join { name }) => {
                let (response_tx, response_rx) = tokio::sync::oneshot::channel();
                if join_tx
                    .send(JoinEvent {
                        name,
                        response_tx,
                        outgoing: out_tx.clone(),
                    })
                    .is_err()
                {
                    break;
                }
                match response_rx.await {
                    Ok(welcome) => {
                        assigned = Some(welcome.assigned_id);
                        let _ = out_tx.send(welcome.bytes).await;
                    }
                    Err(_) => break,
                }
            }
            Ok(WireMessage::Input(frame)) => {
                if let Some(guest_id) = assigned {
                    let _ = input_tx.send(GuestInputEvent { guest_id, frame });
                }
            }
            Ok(other) => {
                warn!("Unexpected message from guest: {other:?}");
            }
            Err(e) => {
                warn!("Dropping malformed frame: {e}");
            }
        }
    }

    if let Some(guest_id) = assigned {
        let _ = leave_tx.send(LeaveEvent { guest_id });
    }
}

/// Every replicated body gets a wire id as soon as it exists.
fn assign_net_ids(
    mut commands: Commands,
    mut allocator: ResMut<NetIdAllocator>,
    unassigned: Query<Entity, (With<RigidBody>, Without<NetId>)>,
) {
    for entity in unassigned.iter() {
        commands.entity(entity).insert(NetId(allocator.next()));
    }
}

fn spawn_frame(
    net_id: &NetId,
    position: &Position,
    rotation: &Rotation,
    velocity: &LinearVelocity,
    collider: &Collider,
    ship: Option<&ShipTag>,
    projectile: Option<&Projectile>,
    mine: Option<&MineTag>,
    net_ids: &Query<&NetId>,
) -> SpawnFrame {
    let kind = if ship.is_some() {
        BodyKind::Ship
    } else if mine.is_some() {
        BodyKind::Mine
    } else if projectile.is_some() {
        BodyKind::Projectile
    } else {
        BodyKind::Obstacle
    };
    let owner_id = projectile
        .and_then(|p| net_ids.get(p.firer).ok())
        .map(|id| id.0)
        .unwrap_or(0);
    let (param_a, param_b) = match collider.shape {
        Shape::Circle { radius } => (radius, 0.0),
        Shape::Box { half_extents } => (half_extents.x, half_extents.y),
        Shape::Triangle { .. } => (collider.shape.bounding_radius(), 0.0),
    };
    SpawnFrame {
        entity_id: net_id.0,
        kind,
        owner_id,
        position: position.0,
        rotation: rotation.0,
        velocity: velocity.0,
        param_a,
        param_b,
    }
}

#[allow(clippy::type_complexity)]
fn host_handle_joins(
    mut commands: Commands,
    channels: Option<Res<HostChannels>>,
    mut allocator: ResMut<NetIdAllocator>,
    mut senders: ResMut<GuestSenders>,
    tick: Res<SimTick>,
    config: Res<ArenaConfig>,
    bodies: Query<(
        &NetId,
        &Position,
        &Rotation,
        &LinearVelocity,
        &Collider,
        Option<&ShipTag>,
        Option<&Projectile>,
        Option<&MineTag>,
    )>,
    net_ids: Query<&NetId>,
) {
    let Some(channels) = channels else {
        return;
    };

    while let Ok(join) = channels.join_rx.try_recv() {
        let guest_id = allocator.next();
        info!("Guest '{}' joining with id {guest_id}", join.name);

        let spawn_pos =
            config.center() + Vec2::new(96.0, 0.0) * (senders.0.len() as f32 + 1.0);
        let ship = ShipBundle::new(spawn_pos, 0.0);
        let ship_frame = SpawnFrame {
            entity_id: guest_id,
            kind: BodyKind::Ship,
            owner_id: 0,
            position: spawn_pos,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            param_a: ship.body.collider.shape.bounding_radius(),
            param_b: 0.0,
        };
        commands.spawn((ship, GuestTag(guest_id), NetId(guest_id)));

        // Snapshot the live world, then append the just-spawned ship
        // manually since it isn't visible to queries yet.
        let mut frames = Vec::new();
        for (net_id, position, rotation, velocity, collider, ship, projectile, mine) in
            bodies.iter()
        {
            frames.push(spawn_frame(
                net_id, position, rotation, velocity, collider, ship, projectile, mine, &net_ids,
            ));
        }
        frames.push(ship_frame);

        let welcome = WireMessage::Welcome {
            assigned_id: guest_id,
            tick: tick.0 as u32,
            bodies: frames,
        };
        senders.0.push((guest_id, join.outgoing));
        let _ = join.response_tx.send(WelcomeData {
            assigned_id: guest_id,
            bytes: welcome.encode(),
        });
    }
}

fn host_handle_leaves(
    channels: Option<Res<HostChannels>>,
    mut senders: ResMut<GuestSenders>,
    mut despawn: MessageWriter<DespawnEvent>,
    guests: Query<(Entity, &GuestTag)>,
) {
    let Some(channels) = channels else {
        return;
    };

    while let Ok(leave) = channels.leave_rx.try_recv() {
        info!("Guest {} leaving", leave.guest_id);
        senders.0.retain(|(id, _)| *id != leave.guest_id);
        for (entity, tag) in guests.iter() {
            if tag.0 == leave.guest_id {
                despawn.write(DespawnEvent(entity));
            }
        }
    }
}

fn host_receive_input(
    channels: Option<Res<HostChannels>>,
    mut guests: Query<(&GuestTag, &NetId, &mut PilotInput)>,
) {
    let Some(channels) = channels else {
        return;
    };

    while let Ok(input) = channels.input_rx.try_recv() {
        for (tag, net_id, mut pilot) in guests.iter_mut() {
            if tag.0 != input.guest_id {
                continue;
            }
            if input.frame.entity_id != net_id.0 {
                warn!(
                    "Guest {} sent input for entity {}, ignoring",
                    input.guest_id, input.frame.entity_id
                );
                continue;
            }
            // Inputs can arrive batched; apply in sequence order only.
            if input.frame.sequence >= pilot.sequence {
                pilot.buttons = input.frame.buttons;
                pilot.mouse_dir = input.frame.mouse_dir;
                pilot.sequence = input.frame.sequence;
            }
        }
    }
}

fn broadcast(senders: &GuestSenders, bytes: &[u8]) {
    for (_, sender) in &senders.0 {
        let _ = sender.try_send(bytes.to_vec());
    }
}

#[allow(clippy::type_complexity)]
fn host_broadcast_spawns(
    senders: Res<GuestSenders>,
    spawned: Query<
        (
            &NetId,
            &Position,
            &Rotation,
            &LinearVelocity,
            &Collider,
            Option<&ShipTag>,
            Option<&Projectile>,
            Option<&MineTag>,
        ),
        Added<NetId>,
    >,
    net_ids: Query<&NetId>,
) {
    if senders.0.is_empty() {
        return;
    }
    for (net_id, position, rotation, velocity, collider, ship, projectile, mine) in spawned.iter()
    {
        let frame = spawn_frame(
            net_id, position, rotation, velocity, collider, ship, projectile, mine, &net_ids,
        );
        broadcast(&senders, &WireMessage::Spawn(frame).encode());
    }
}

/// Serializes this tick's movers. Bodies whose transform did not change
/// this tick are skipped entirely; that stamp is the signal the sync layer
/// keys on. Guest-controlled ships additionally get the richer per-owner
/// state frame used for reconciliation.
fn host_broadcast_movement(
    tick: Res<SimTick>,
    senders: Res<GuestSenders>,
    movers: Query<(&NetId, &Position, &Rotation, &LastMoved)>,
    guests: Query<(&NetId, &GuestTag, &Position, &Rotation, &LinearVelocity, &PilotInput)>,
) {
    if senders.0.is_empty() {
        return;
    }

    for (net_id, position, rotation, last_moved) in movers.iter() {
        if last_moved.0 != tick.0 {
            continue;
        }
        let frame = WireMessage::Movement(MovementFrame {
            entity_id: net_id.0,
            tick: tick.0 as u32,
            position: position.0,
            rotation: rotation.0,
        });
        broadcast(&senders, &frame.encode());
    }

    for (net_id, tag, position, rotation, velocity, pilot) in guests.iter() {
        let frame = WireMessage::PlayerState(PlayerStateFrame {
            entity_id: net_id.0,
            tick: tick.0 as u32,
            acked_sequence: pilot.sequence,
            position: position.0,
            velocity: velocity.0,
            rotation: rotation.0,
        })
        .encode();
        for (guest_id, sender) in &senders.0 {
            if *guest_id == tag.0 {
                let _ = sender.try_send(frame.clone());
            }
        }
    }
}

fn host_broadcast_status(
    senders: Res<GuestSenders>,
    healths: Query<(&NetId, &Health), Changed<Health>>,
    energies: Query<(&NetId, &Energy), Changed<Energy>>,
    shields: Query<(&NetId, &Shield), Changed<Shield>>,
) {
    if senders.0.is_empty() {
        return;
    }
    for (net_id, health) in healths.iter() {
        let frame = WireMessage::Status(StatusFrame {
            entity_id: net_id.0,
            value: health.current as f64,
            kind: StatusKind::Health,
        });
        broadcast(&senders, &frame.encode());
    }
    for (net_id, energy) in energies.iter() {
        let frame = WireMessage::Status(StatusFrame {
            entity_id: net_id.0,
            value: energy.current as f64,
            kind: StatusKind::Energy,
        });
        broadcast(&senders, &frame.encode());
    }
    for (net_id, shield) in shields.iter() {
        let frame = WireMessage::Status(StatusFrame {
            entity_id: net_id.0,
            value: shield.charge as f64,
            kind: StatusKind::ShieldCharge,
        });
        broadcast(&senders, &frame.encode());
    }
}

/// Runs before the end-of-frame despawn executes, while the net id is
/// still readable.
fn host_broadcast_despawns(
    senders: Res<GuestSenders>,
    mut despawns: MessageReader<DespawnEvent>,
    net_ids: Query<&NetId>,
) {
    for DespawnEvent(entity) in despawns.read() {
        let Ok(net_id) = net_ids.get(*entity) else {
            continue;
        };
        let frame = WireMessage::Despawn { entity_id: net_id.0 };
        broadcast(&senders, &frame.encode());
    }
}
