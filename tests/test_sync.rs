use bevy_arena::net::sync::ServerTickEstimate;

#[test]
fn no_adjustment_when_no_host_data() {
    let sync = ServerTickEstimate::default();
    assert_eq!(sync.last_server_tick, 0);
    assert_eq!(sync.current_speed, 1.0, "Speed should stay at 1.0 when no host data");
}

#[test]
fn starting_at_seeds_both_clocks() {
    let sync = ServerTickEstimate::starting_at(500);
    assert_eq!(sync.last_server_tick, 500);
    assert_eq!(sync.local_tick, 500);
    assert_eq!(sync.current(), 500);
}

#[test]
fn observe_only_moves_forward() {
    let mut sync = ServerTickEstimate::starting_at(100);
    sync.ticks_since_update = 7;

    sync.observe(120);
    assert_eq!(sync.last_server_tick, 120);
    assert_eq!(sync.ticks_since_update, 0, "a newer tick resets the age counter");

    sync.ticks_since_update = 3;
    sync.observe(90);
    assert_eq!(sync.last_server_tick, 120, "an older tick must be ignored");
    assert_eq!(sync.ticks_since_update, 3);
}

#[test]
fn current_extrapolates_by_local_ticks() {
    let mut sync = ServerTickEstimate::starting_at(100);
    sync.ticks_since_update = 4;
    assert_eq!(sync.current(), 104);
}

#[test]
fn slows_when_ahead() {
    let mut sync = ServerTickEstimate::default();
    // Simulate being 15 ticks ahead of the host.
    sync.local_tick = 100;
    sync.last_server_tick = 85;

    let drift = sync.local_tick as i64 - sync.last_server_tick as i64;
    assert_eq!(drift, 15, "Drift should be +15 (local ahead)");

    // Drift of 15 is past the aggressive threshold of 10; the slew ladder
    // should pick the 0.85 speed.
    let abs_drift = drift.unsigned_abs() as i64;
    let target_speed = if abs_drift > 30 {
        0.80
    } else if abs_drift > 10 {
        0.85
    } else if abs_drift > 2 {
        0.95
    } else {
        1.0
    };
    assert!(target_speed < 1.0, "Speed should be < 1.0 when ahead: {target_speed}");
    assert_eq!(target_speed, 0.85);
}

#[test]
fn speeds_up_when_behind() {
    let mut sync = ServerTickEstimate::default();
    // Simulate being 15 ticks behind the host.
    sync.local_tick = 85;
    sync.last_server_tick = 100;

    let drift = sync.local_tick as i64 - sync.last_server_tick as i64;
    assert_eq!(drift, -15, "Drift should be -15 (local behind)");

    let abs_drift = drift.unsigned_abs() as i64;
    let target_speed = if abs_drift > 30 {
        1.20
    } else if abs_drift > 10 {
        1.15
    } else if abs_drift > 2 {
        1.05
    } else {
        1.0
    };
    assert!(target_speed > 1.0, "Speed should be > 1.0 when behind: {target_speed}");
    assert_eq!(target_speed, 1.15);
}

#[test]
fn gentle_adjustment_for_small_drift() {
    let drift: i64 = 5; // 5 ticks ahead
    let abs_drift = drift.unsigned_abs() as i64;

    assert!(abs_drift > 2 && abs_drift <= 10, "Should be in gentle range");

    let target_speed = if drift > 0 { 0.95 } else { 1.05 };
    assert_eq!(target_speed, 0.95, "Should gently slow down when slightly ahead");
}
