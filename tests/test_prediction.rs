mod common;

use bevy::prelude::*;
use bevy_arena::net::prediction::{
    classify_error, wrap_angle, AuthoritativeUpdate, Correction, InputBuffer, Predicted,
    ReconciliationState, INPUT_BUFFER_CAPACITY, RECONCILE_THRESHOLD, SNAP_MULTIPLIER,
    VELOCITY_SNAP_THRESHOLD,
};
use bevy_arena::net::protocol::{InputButtons, PlayerStateFrame};
use bevy_arena::net::sync::ServerTickEstimate;
use bevy_arena::net::NetworkRole;
use bevy_arena::physics::{step_body, BodyState, LinearVelocity, Position};
use bevy_arena::ship::{apply_controls, Engine, ShipBundle};
use common::{empty_arena, TestApp};
use std::f32::consts::PI;

// =============================================================================
// Input buffer: sequencing, eviction, acknowledgement
// =============================================================================
#[test]
fn buffer_assigns_monotonic_sequences() {
    let mut buffer = InputBuffer::default();
    let first = buffer.push(0.0, InputButtons::default(), Vec2::X);
    let second = buffer.push(0.016, InputButtons::default(), Vec2::X);
    assert_eq!(second, first + 1);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn buffer_evicts_oldest_when_full() {
    let mut buffer = InputBuffer::default();
    for _ in 0..INPUT_BUFFER_CAPACITY + 60 {
        buffer.push(0.0, InputButtons::default(), Vec2::X);
    }
    assert_eq!(buffer.len(), INPUT_BUFFER_CAPACITY);
    assert!(
        !buffer.contains(59),
        "the oldest 60 snapshots should have been evicted"
    );
    assert!(buffer.contains(60));
}

#[test]
fn ack_drops_acknowledged_prefix() {
    let mut buffer = InputBuffer::default();
    for _ in 0..10 {
        buffer.push(0.0, InputButtons::default(), Vec2::X);
    }
    buffer.ack(6);
    assert_eq!(buffer.len(), 3);
    assert!(!buffer.contains(6));
    assert!(buffer.contains(7));

    let remaining: Vec<u32> = buffer.after(6).map(|s| s.sequence).collect();
    assert_eq!(remaining, vec![7, 8, 9], "replay order is oldest first");
}

// =============================================================================
// Correction bands
// =============================================================================
#[test]
fn small_error_needs_no_correction() {
    assert_eq!(
        classify_error(RECONCILE_THRESHOLD, 0.3, 0.0),
        Correction::None
    );
}

#[test]
fn medium_error_smooths() {
    assert_eq!(
        classify_error(RECONCILE_THRESHOLD, 1.0, 0.0),
        Correction::Smooth
    );
}

#[test]
fn large_error_snaps() {
    let just_over = RECONCILE_THRESHOLD * SNAP_MULTIPLIER + 0.01;
    assert_eq!(
        classify_error(RECONCILE_THRESHOLD, just_over, 0.0),
        Correction::Snap
    );
}

/// Predicted (100,100) vs server (400,100) is a 300-unit error, far past
/// 3× the threshold. That must snap, never lerp.
#[test]
fn three_hundred_unit_error_hard_snaps() {
    assert_eq!(classify_error(RECONCILE_THRESHOLD, 300.0, 0.0), Correction::Snap);
}

#[test]
fn velocity_divergence_alone_forces_snap() {
    assert_eq!(
        classify_error(RECONCILE_THRESHOLD, 0.1, VELOCITY_SNAP_THRESHOLD + 1.0),
        Correction::Snap
    );
}

// =============================================================================
// Angle wrapping
// =============================================================================
#[test]
fn wrap_angle_takes_shortest_path() {
    assert!((wrap_angle(6.2) - (6.2 - 2.0 * PI)).abs() < 1e-5);
    assert!((wrap_angle(-0.1) - -0.1).abs() < 1e-5);
    for raw in [-10.0f32, -3.0, 0.0, 3.0, 10.0, 100.0] {
        assert!(
            wrap_angle(raw).abs() <= PI + 1e-5,
            "wrapped angle must land in [-π, π], got {} for {raw}",
            wrap_angle(raw)
        );
    }
}

// =============================================================================
// Reconciliation convergence: replaying buffered inputs from the server
// state reproduces the prediction when no collision intervened
// =============================================================================
#[test]
fn replay_reproduces_collision_free_prediction() {
    let config = empty_arena();
    let engine = Engine::default();
    let mass = 192.0;
    let drag = 0.015;
    let elasticity = 0.5;
    let extent = 14.0;

    let mut inputs = Vec::new();
    for tick in 0..40u32 {
        let mut buttons = InputButtons::default();
        buttons.set(InputButtons::THRUST, true);
        buttons.set(InputButtons::LEFT, tick >= 20);
        inputs.push(buttons);
    }

    // Ground truth: the trajectory from applying every input in order.
    let mut state = BodyState {
        position: Vec2::new(2000.0, 2000.0),
        rotation: 0.0,
        linear_velocity: Vec2::ZERO,
        angular_velocity: 0.0,
        acceleration: Vec2::ZERO,
    };
    let mut states = Vec::new();
    for &buttons in &inputs {
        apply_controls(&mut state, buttons, &engine, false);
        step_body(&mut state, mass, drag, elasticity, extent, &config);
        states.push(state);
    }
    let predicted = states[39];

    // Server acknowledged input 24; replay 25..40 from its state.
    let mut replayed = states[24];
    for &buttons in &inputs[25..] {
        apply_controls(&mut replayed, buttons, &engine, false);
        step_body(&mut replayed, mass, drag, elasticity, extent, &config);
    }

    let error = replayed.position.distance(predicted.position);
    assert!(
        error < RECONCILE_THRESHOLD,
        "replay must reproduce the prediction within the smoothing threshold, error {error}"
    );
    assert!(
        replayed.linear_velocity.distance(predicted.linear_velocity) < 1e-3,
        "replayed velocity must match"
    );
}

// =============================================================================
// Reconcile system: adoption and staleness guards
// =============================================================================
fn guest_app_with_ship(position: Vec2) -> (TestApp, Entity) {
    let mut app = TestApp::new();
    app.app.world_mut().insert_resource(empty_arena());
    app.app.world_mut().insert_resource(NetworkRole::Guest {
        addr: "test".to_string(),
    });
    app.start_game();
    let ship = app
        .app
        .world_mut()
        .spawn((
            ShipBundle::new(position, 0.0),
            Predicted,
            InputBuffer::default(),
            ReconciliationState::default(),
        ))
        .id();
    (app, ship)
}

#[test]
fn first_update_adopts_server_state() {
    let (mut app, ship) = guest_app_with_ship(Vec2::new(100.0, 100.0));

    app.app.world_mut().write_message(AuthoritativeUpdate(PlayerStateFrame {
        entity_id: 1,
        tick: 1,
        acked_sequence: 0,
        position: Vec2::new(400.0, 100.0),
        velocity: Vec2::ZERO,
        rotation: 0.0,
    }));
    app.step_fixed();

    let position = app.app.world().get::<Position>(ship).unwrap().0;
    assert_eq!(
        position,
        Vec2::new(400.0, 100.0),
        "with no acknowledged history the server state is adopted wholesale"
    );
    let recon = app.app.world().get::<ReconciliationState>(ship).unwrap();
    assert!(recon.has_ack);
    assert_eq!(recon.server_tick, 1);
}

#[test]
fn stale_update_is_skipped() {
    let (mut app, ship) = guest_app_with_ship(Vec2::new(100.0, 100.0));
    app.app
        .world_mut()
        .insert_resource(ServerTickEstimate::starting_at(100));

    // More than 5 ticks behind the estimated server tick.
    app.app.world_mut().write_message(AuthoritativeUpdate(PlayerStateFrame {
        entity_id: 1,
        tick: 90,
        acked_sequence: 0,
        position: Vec2::new(900.0, 900.0),
        velocity: Vec2::ZERO,
        rotation: 0.0,
    }));
    app.step_fixed();

    let position = app.app.world().get::<Position>(ship).unwrap().0;
    assert_eq!(
        position,
        Vec2::new(100.0, 100.0),
        "an update 10 ticks stale must not correct the prediction"
    );
}

#[test]
fn prediction_moves_ship_and_buffers_input() {
    use bevy_arena::input::LocalInput;

    let (mut app, ship) = guest_app_with_ship(Vec2::new(500.0, 500.0));
    {
        let mut local = app.app.world_mut().resource_mut::<LocalInput>();
        local.buttons.set(InputButtons::THRUST, true);
        local.mouse_dir = Vec2::X;
    }

    app.step_fixed_n(10);

    let position = app.app.world().get::<Position>(ship).unwrap().0;
    let velocity = app.app.world().get::<LinearVelocity>(ship).unwrap().0;
    assert!(
        position.x > 500.0,
        "thrust along +x should move the predicted ship, got {position:?}"
    );
    assert!(velocity.x > 0.0, "predicted velocity should be along +x");

    let buffer = app.app.world().get::<InputBuffer>(ship).unwrap();
    assert_eq!(buffer.len(), 10, "one snapshot is buffered per predicted tick");
}
