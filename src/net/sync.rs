use std::collections::VecDeque;

use bevy::prelude::*;

use crate::game_state::GameState;

use super::is_guest;

pub struct SyncPlugin;

impl Plugin for SyncPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            tick_sync
                .run_if(is_guest)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

const DRIFT_WINDOW: usize = 30;
const GENTLE_THRESHOLD: i64 = 2;
const AGGRESSIVE_THRESHOLD: i64 = 10;
const RESYNC_THRESHOLD: i64 = 30;

/// Tracks the host tick stream and keeps the guest's fixed clock aligned
/// with it by slewing virtual time.
#[derive(Resource)]
pub struct ServerTickEstimate {
    /// Highest tick seen in any authoritative frame.
    pub last_server_tick: u64,
    /// Local fixed ticks elapsed since that frame arrived.
    pub ticks_since_update: u64,
    pub local_tick: u64,
    pub drift_samples: VecDeque<i64>,
    pub current_speed: f64,
}

impl Default for ServerTickEstimate {
    fn default() -> Self {
        ServerTickEstimate {
            last_server_tick: 0,
            ticks_since_update: 0,
            local_tick: 0,
            drift_samples: VecDeque::with_capacity(DRIFT_WINDOW),
            current_speed: 1.0,
        }
    }
}

impl ServerTickEstimate {
    pub fn starting_at(tick: u64) -> Self {
        ServerTickEstimate {
            last_server_tick: tick,
            local_tick: tick,
            ..Default::default()
        }
    }

    /// Records a tick seen in an authoritative frame.
    pub fn observe(&mut self, tick: u64) {
        if tick > self.last_server_tick {
            self.last_server_tick = tick;
            self.ticks_since_update = 0;
        }
    }

    /// Best estimate of the server's current tick, used by the staleness
    /// guard on reconciliation updates.
    pub fn current(&self) -> u64 {
        self.last_server_tick + self.ticks_since_update
    }
}

fn tick_sync(
    sync: Option<ResMut<ServerTickEstimate>>,
    mut virtual_time: ResMut<Time<Virtual>>,
) {
    let Some(mut sync) = sync else {
        return;
    };
    sync.local_tick += 1;
    sync.ticks_since_update += 1;

    if sync.last_server_tick == 0 {
        return; // No data from the host yet.
    }

    let drift = sync.local_tick as i64 - sync.last_server_tick as i64;

    // Rolling window keeps one late packet from yanking the clock.
    if sync.drift_samples.len() >= DRIFT_WINDOW {
        sync.drift_samples.pop_front();
    }
    sync.drift_samples.push_back(drift);

    let avg_drift: f64 =
        sync.drift_samples.iter().sum::<i64>() as f64 / sync.drift_samples.len() as f64;
    let abs_drift = avg_drift.abs() as i64;

    let target_speed = if abs_drift > RESYNC_THRESHOLD {
        if avg_drift > 0.0 {
            0.80
        } else {
            1.20
        }
    } else if abs_drift > AGGRESSIVE_THRESHOLD {
        if avg_drift > 0.0 {
            0.85 // Ahead of the host, slow down.
        } else {
            1.15 // Behind, speed up.
        }
    } else if abs_drift > GENTLE_THRESHOLD {
        if avg_drift > 0.0 {
            0.95
        } else {
            1.05
        }
    } else {
        // Within tolerance, ease back toward real time.
        sync.current_speed + (1.0 - sync.current_speed) * 0.1
    };

    sync.current_speed = target_speed;
    virtual_time.set_relative_speed(target_speed as f32);
}
