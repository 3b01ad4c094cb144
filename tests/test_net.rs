mod common;

use bevy::prelude::*;
use bevy_arena::net::protocol::{
    read_header, InputButtons, InputFrame, WireMessage, HEADER_LEN,
};
use bevy_arena::net::{
    GuestInputEvent, GuestSenders, GuestTag, JoinEvent, LeaveEvent, NetId, NetIdAllocator,
};
use bevy_arena::physics::LinearVelocity;
use bevy_arena::ship::PilotInput;
use common::{empty_arena, TestApp};

fn host_app() -> (TestApp, bevy_arena::net::HostChannels) {
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    let channels = app.setup_host_mode();
    app.start_game();
    // Let the fixed schedule assign net ids to the pre-existing bodies.
    app.step_fixed();
    (app, channels)
}

/// Drives the join handshake the way a connection task would: send the
/// event, run a frame, read back the welcome.
fn join(
    app: &mut TestApp,
    channels: &bevy_arena::net::HostChannels,
    name: &str,
) -> (u32, tokio::sync::mpsc::Receiver<Vec<u8>>, Vec<u8>) {
    let (response_tx, mut response_rx) = tokio::sync::oneshot::channel();
    let (out_tx, out_rx) = tokio::sync::mpsc::channel(64);
    channels
        .join_tx
        .send(JoinEvent {
            name: name.to_string(),
            response_tx,
            outgoing: out_tx,
        })
        .unwrap();
    app.tick();
    let welcome = response_rx
        .try_recv()
        .expect("join should be answered within one frame");
    (welcome.assigned_id, out_rx, welcome.bytes)
}

fn decode(bytes: &[u8]) -> WireMessage {
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let (_, type_id) = read_header(header);
    WireMessage::decode(type_id, &bytes[HEADER_LEN..]).expect("frame should decode")
}

#[test]
fn join_spawns_ship_and_sends_world_snapshot() {
    let (mut app, channels) = host_app();
    let ships_before = app.count::<GuestTag>();
    assert_eq!(ships_before, 0);

    let (assigned_id, _out_rx, bytes) = join(&mut app, &channels, "tester");
    assert!(assigned_id > 0, "assigned net id must be nonzero");

    match decode(&bytes) {
        WireMessage::Welcome {
            assigned_id: welcome_id,
            bodies,
            ..
        } => {
            assert_eq!(welcome_id, assigned_id);
            // At least the host's own ship and the new guest ship.
            assert!(
                bodies.len() >= 2,
                "welcome should snapshot the world, got {} bodies",
                bodies.len()
            );
            assert!(
                bodies.iter().any(|b| b.entity_id == assigned_id),
                "welcome must include the guest's own ship"
            );
        }
        other => panic!("expected welcome, got {other:?}"),
    }

    assert_eq!(app.count::<GuestTag>(), 1, "a ship is spawned for the guest");
    assert_eq!(app.resource::<GuestSenders>().0.len(), 1);
}

#[test]
fn guest_input_applies_in_sequence_order() {
    let (mut app, channels) = host_app();
    let (assigned_id, _out_rx, _bytes) = join(&mut app, &channels, "tester");

    let mut buttons = InputButtons::default();
    buttons.set(InputButtons::THRUST, true);
    channels
        .input_tx
        .send(GuestInputEvent {
            guest_id: assigned_id,
            frame: InputFrame {
                entity_id: assigned_id,
                sequence: 5,
                buttons,
                mouse_dir: Vec2::X,
            },
        })
        .unwrap();
    app.tick();

    let world = app.app.world_mut();
    let mut q = world.query::<(&GuestTag, &PilotInput)>();
    let (_, pilot) = q.iter(world).next().expect("guest ship should exist");
    assert!(pilot.buttons.pressed(InputButtons::THRUST));
    assert_eq!(pilot.sequence, 5);

    // A late, older frame must not roll the input back.
    channels
        .input_tx
        .send(GuestInputEvent {
            guest_id: assigned_id,
            frame: InputFrame {
                entity_id: assigned_id,
                sequence: 3,
                buttons: InputButtons::default(),
                mouse_dir: Vec2::X,
            },
        })
        .unwrap();
    app.tick();

    let world = app.app.world_mut();
    let mut q = world.query::<(&GuestTag, &PilotInput)>();
    let (_, pilot) = q.iter(world).next().expect("guest ship should exist");
    assert!(
        pilot.buttons.pressed(InputButtons::THRUST),
        "an out-of-order input frame must be ignored"
    );
    assert_eq!(pilot.sequence, 5);
}

#[test]
fn input_for_someone_elses_entity_is_ignored() {
    let (mut app, channels) = host_app();
    let (assigned_id, _out_rx, _bytes) = join(&mut app, &channels, "tester");

    let mut buttons = InputButtons::default();
    buttons.set(InputButtons::THRUST, true);
    channels
        .input_tx
        .send(GuestInputEvent {
            guest_id: assigned_id,
            frame: InputFrame {
                entity_id: assigned_id + 999,
                sequence: 1,
                buttons,
                mouse_dir: Vec2::X,
            },
        })
        .unwrap();
    app.tick();

    let world = app.app.world_mut();
    let mut q = world.query::<(&GuestTag, &PilotInput)>();
    let (_, pilot) = q.iter(world).next().expect("guest ship should exist");
    assert!(
        !pilot.buttons.pressed(InputButtons::THRUST),
        "input naming a different entity must not apply"
    );
}

#[test]
fn leave_despawns_guest_ship() {
    let (mut app, channels) = host_app();
    let (assigned_id, _out_rx, _bytes) = join(&mut app, &channels, "tester");
    assert_eq!(app.count::<GuestTag>(), 1);

    channels
        .leave_tx
        .send(LeaveEvent {
            guest_id: assigned_id,
        })
        .unwrap();
    app.tick();

    assert_eq!(app.count::<GuestTag>(), 0, "guest ship should be despawned");
    assert!(
        app.resource::<GuestSenders>().0.is_empty(),
        "guest sender should be dropped"
    );
}

#[test]
fn net_id_allocator_increments() {
    let mut allocator = NetIdAllocator::default();
    assert_eq!(allocator.next(), 1);
    assert_eq!(allocator.next(), 2);
    assert_eq!(allocator.next(), 3);
}

#[test]
fn movement_broadcast_covers_movers_only() {
    let (mut app, channels) = host_app();
    let (assigned_id, mut out_rx, _bytes) = join(&mut app, &channels, "tester");

    // Flush the spawn backlog from the join.
    app.step_fixed();
    while out_rx.try_recv().is_ok() {}

    // Set the guest ship moving; the host ship stays parked.
    let world = app.app.world_mut();
    let mut q = world.query::<(Entity, &GuestTag)>();
    let (guest_entity, _) = q.iter(world).next().expect("guest ship should exist");
    world.get_mut::<LinearVelocity>(guest_entity).unwrap().0 = Vec2::new(120.0, 0.0);

    let mut host_ship_id = None;
    let mut q = world.query_filtered::<&NetId, Without<GuestTag>>();
    for net_id in q.iter(world) {
        host_ship_id = Some(net_id.0);
    }

    app.step_fixed();

    let mut movement_ids = Vec::new();
    let mut player_state_ids = Vec::new();
    while let Ok(frame) = out_rx.try_recv() {
        match decode(&frame) {
            WireMessage::Movement(m) => movement_ids.push(m.entity_id),
            WireMessage::PlayerState(p) => player_state_ids.push(p.entity_id),
            _ => {}
        }
    }

    assert!(
        movement_ids.contains(&assigned_id),
        "the moving ship must be serialized, got {movement_ids:?}"
    );
    if let Some(host_id) = host_ship_id {
        assert!(
            !movement_ids.contains(&host_id),
            "a body that did not move this tick must be skipped"
        );
    }
    assert!(
        player_state_ids.contains(&assigned_id),
        "the guest always gets its own reconciliation frame"
    );
}
