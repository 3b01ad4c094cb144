mod common;

use bevy::prelude::*;
use bevy_arena::input::{LocalInput, PlayerTag};
use bevy_arena::net::protocol::InputButtons;
use bevy_arena::physics::LinearVelocity;
use bevy_arena::projectile::{MineTag, Projectile};
use bevy_arena::ship::PilotInput;
use common::{empty_arena, TestApp};

fn setup() -> TestApp {
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    app.start_game();
    app
}

#[test]
fn keys_map_to_button_bits() {
    let cases: &[(KeyCode, u16)] = &[
        (KeyCode::KeyW, InputButtons::THRUST),
        (KeyCode::ArrowUp, InputButtons::THRUST),
        (KeyCode::KeyS, InputButtons::REVERSE),
        (KeyCode::KeyA, InputButtons::LEFT),
        (KeyCode::KeyD, InputButtons::RIGHT),
        (KeyCode::ShiftLeft, InputButtons::BOOST),
        (KeyCode::ControlLeft, InputButtons::RCS),
        (KeyCode::Space, InputButtons::FIRE),
        (KeyCode::KeyQ, InputButtons::DROP),
        (KeyCode::KeyE, InputButtons::SHIELD),
    ];

    for &(key, mask) in cases {
        let mut app = setup();
        app.press_key(key);
        app.tick();
        assert!(
            app.resource::<LocalInput>().buttons.pressed(mask),
            "{key:?} should set button bit {mask:#b}"
        );

        app.release_key(key);
        app.tick();
        assert!(
            !app.resource::<LocalInput>().buttons.pressed(mask),
            "{key:?} release should clear button bit {mask:#b}"
        );
    }
}

#[test]
fn multiple_keys_combine() {
    let mut app = setup();
    app.press_key(KeyCode::KeyW);
    app.press_key(KeyCode::KeyA);
    app.tick();

    let buttons = app.resource::<LocalInput>().buttons;
    assert!(buttons.pressed(InputButtons::THRUST));
    assert!(buttons.pressed(InputButtons::LEFT));
    assert!(!buttons.pressed(InputButtons::RIGHT));
}

#[test]
fn local_input_reaches_the_piloted_ship() {
    let mut app = setup();
    app.press_key(KeyCode::KeyW);
    app.tick_n(2);

    let world = app.app.world_mut();
    let mut q = world.query_filtered::<&PilotInput, With<PlayerTag>>();
    let pilot = q.iter(world).next().expect("local ship should exist");
    assert!(
        pilot.buttons.pressed(InputButtons::THRUST),
        "the hosted ship's pilot input should mirror the local sampler"
    );
    assert!(pilot.sequence > 0, "the input sequence should be advancing");
}

#[test]
fn thrust_accelerates_the_ship_along_its_facing() {
    let mut app = setup();
    app.press_key(KeyCode::KeyW);
    app.tick_n(2);
    app.step_fixed_n(5);

    let world = app.app.world_mut();
    let mut q = world.query_filtered::<&LinearVelocity, With<PlayerTag>>();
    let velocity = q.iter(world).next().expect("local ship should exist");
    assert!(
        velocity.0.x > 0.0,
        "a ship facing +x under thrust should gain +x velocity, got {:?}",
        velocity.0
    );
    assert!(
        velocity.0.y.abs() < 0.01,
        "straight thrust should not drift sideways, got {:?}",
        velocity.0
    );
}

#[test]
fn fire_button_spawns_one_projectile_per_cooldown() {
    let mut app = setup();
    app.press_key(KeyCode::Space);
    app.tick_n(2);
    app.step_fixed();

    assert_eq!(app.count::<Projectile>(), 1, "one shot on the first tick");

    // Holding fire inside the cooldown window adds nothing.
    app.step_fixed_n(5);
    assert_eq!(
        app.count::<Projectile>(),
        1,
        "cooldown must suppress followup shots"
    );
}

#[test]
fn drop_button_lays_a_mine() {
    let mut app = setup();
    app.press_key(KeyCode::KeyQ);
    app.tick_n(2);
    app.step_fixed();

    assert_eq!(app.count::<MineTag>(), 1);
}
