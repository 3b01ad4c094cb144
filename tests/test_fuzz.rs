mod common;

use bevy::prelude::*;
use bevy_arena::net::protocol::{InputButtons, InputFrame, WireMessage};
use bevy_arena::net::GuestInputEvent;
use bevy_arena::physics::{BodyBundle, Collider, Position, RigidBody, Shape};
use common::{empty_arena, TestApp};
use rand::prelude::*;

const FUZZ_ITERATIONS: usize = 100;
const FUZZ_SEED: u64 = 42;

/// All keys the game handles.
const ALL_KEYS: &[KeyCode] = &[
    KeyCode::KeyW,
    KeyCode::KeyA,
    KeyCode::KeyS,
    KeyCode::KeyD,
    KeyCode::ArrowUp,
    KeyCode::ArrowDown,
    KeyCode::ArrowLeft,
    KeyCode::ArrowRight,
    KeyCode::ShiftLeft,
    KeyCode::ControlLeft,
    KeyCode::Space,
    KeyCode::KeyQ,
    KeyCode::KeyE,
    KeyCode::Escape,
];

#[test]
fn fuzz_random_key_sequences() {
    let mut rng = StdRng::seed_from_u64(FUZZ_SEED);
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    app.start_game();

    for _ in 0..FUZZ_ITERATIONS {
        // Press 1–3 random keys
        let num_keys = rng.random_range(1..=3);
        let mut pressed_keys = Vec::new();
        for _ in 0..num_keys {
            let key = ALL_KEYS[rng.random_range(0..ALL_KEYS.len())];
            app.press_key(key);
            pressed_keys.push(key);
        }

        // Advance a mix of frames and simulation ticks
        app.tick_n(rng.random_range(1..=3));
        app.step_fixed_n(rng.random_range(0..=3));

        for key in &pressed_keys {
            app.release_key(*key);
        }
        app.tick();
    }
    // If we got here without panic, the test passes.
}

#[test]
fn fuzz_random_guest_input_frames() {
    let mut rng = StdRng::seed_from_u64(FUZZ_SEED + 1);
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    let channels = app.setup_host_mode();
    app.start_game();

    for _ in 0..FUZZ_ITERATIONS {
        channels
            .input_tx
            .send(GuestInputEvent {
                guest_id: rng.random_range(0..=10),
                frame: InputFrame {
                    entity_id: rng.random_range(0..=1000),
                    sequence: rng.random_range(0..=10_000),
                    buttons: InputButtons(rng.random()),
                    mouse_dir: Vec2::new(
                        rng.random_range(-1.0f32..=1.0),
                        rng.random_range(-1.0f32..=1.0),
                    ),
                },
            })
            .unwrap();

        app.tick();
        if rng.random_bool(0.3) {
            app.step_fixed();
        }
    }
    // No panic = pass
}

#[test]
fn fuzz_random_wire_bytes_never_panic() {
    let mut rng = StdRng::seed_from_u64(FUZZ_SEED + 2);

    for _ in 0..2000 {
        let type_id = rng.random_range(0..=12u16);
        let len = rng.random_range(0..=48usize);
        let payload: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        // Decoding arbitrary bytes must return, never panic.
        let _ = WireMessage::decode(type_id, &payload);
    }
}

#[test]
fn fuzz_random_bodies_stay_stable() {
    let mut rng = StdRng::seed_from_u64(FUZZ_SEED + 3);
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    app.start_game();

    let mut bodies = Vec::new();
    for i in 0..24 {
        let size = rng.random_range(5.0f32..=20.0);
        let shape = match rng.random_range(0..3) {
            0 => Shape::Circle { radius: size },
            1 => Shape::Box {
                half_extents: Vec2::new(size, rng.random_range(5.0f32..=20.0)),
            },
            _ => Shape::Triangle {
                vertices: [
                    Vec2::new(size, 0.0),
                    Vec2::new(-size * 0.6, size * 0.7),
                    Vec2::new(-size * 0.6, -size * 0.7),
                ],
            },
        };
        // A few immovable bodies mixed in.
        let kind = if i % 8 == 0 {
            RigidBody::Static
        } else {
            RigidBody::Dynamic
        };
        let velocity = if kind == RigidBody::Static {
            Vec2::ZERO
        } else {
            Vec2::new(
                rng.random_range(-400.0f32..=400.0),
                rng.random_range(-400.0f32..=400.0),
            )
        };
        let position = Vec2::new(
            rng.random_range(200.0f32..=3800.0),
            rng.random_range(200.0f32..=3800.0),
        );
        let entity = app
            .app
            .world_mut()
            .spawn(
                BodyBundle::new(
                    kind,
                    Collider {
                        shape,
                        density: rng.random_range(0.5f32..=4.0),
                        elasticity: rng.random_range(0.0f32..=1.0),
                        drag: rng.random_range(0.0f32..=0.05),
                    },
                    position,
                    rng.random_range(0.0f32..=6.0),
                )
                .with_velocity(velocity),
            )
            .id();
        bodies.push(entity);
    }

    for round in 0..6 {
        app.step_fixed_n(30);
        for &entity in &bodies {
            let position = app.app.world().get::<Position>(entity).unwrap().0;
            assert!(
                position.is_finite(),
                "position went non-finite in round {round}: {position:?}"
            );
            assert!(
                (0.0..=4096.0).contains(&position.x) && (0.0..=4096.0).contains(&position.y),
                "body escaped the arena in round {round}: {position:?}"
            );
        }
    }
}
