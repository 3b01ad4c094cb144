//! Client-side prediction and reconciliation for the locally controlled
//! ship.
//!
//! The ship is advanced through the same integration step the server runs,
//! immediately on input, and every sampled input is buffered under a
//! monotonic sequence number. Authoritative state frames are then compared
//! against a replay of the not-yet-acknowledged inputs; small errors are
//! smoothed away, collision-scale errors snap.

use std::collections::VecDeque;
use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use crate::game_state::GameState;
use crate::input::LocalInput;
use crate::net::protocol::{InputButtons, InputFrame, PlayerStateFrame, WireMessage};
use crate::physics::{
    step_body, Acceleration, AngularVelocity, BodyState, Collider, LinearVelocity, MassProperties,
    Position, Rotation,
};
use crate::ship::{apply_controls, Energy, Engine};
use crate::world::ArenaConfig;

use super::sync::ServerTickEstimate;
use super::{is_guest, GuestChannels, LocalNetId};

/// Four seconds of history at the fixed tick rate.
pub const INPUT_BUFFER_CAPACITY: usize = 240;
/// Positional error below this needs no correction at all.
pub const RECONCILE_THRESHOLD: f32 = 0.5;
/// Past `threshold × SNAP_MULTIPLIER` the prediction is abandoned.
pub const SNAP_MULTIPLIER: f32 = 3.0;
/// Velocity error gets nudged only past this.
pub const VELOCITY_NUDGE_THRESHOLD: f32 = 0.5;
/// Velocity error past this alone forces a snap; collision outcomes are
/// not reliably predictable client-side.
pub const VELOCITY_SNAP_THRESHOLD: f32 = 15.0;
/// Dead-zone guard: both speeds under LOW_SPEED but differing by more than
/// the disagreement bound forces a velocity reset.
pub const LOW_SPEED: f32 = 1.0;
pub const LOW_SPEED_DISAGREEMENT: f32 = 0.2;
/// Updates this many ticks behind the estimated server tick are skipped.
pub const STALE_TICK_SLACK: u64 = 5;
/// Cap on the per-tick smoothing rate.
const MAX_LERP_RATE: f32 = 0.6;

#[derive(Clone, Copy, Debug)]
pub struct InputSnapshot {
    pub sequence: u32,
    pub timestamp: f64,
    pub buttons: InputButtons,
    pub mouse_dir: Vec2,
}

/// Ring buffer of sent-but-unacknowledged input snapshots.
#[derive(Component, Default)]
pub struct InputBuffer {
    entries: VecDeque<InputSnapshot>,
    next_sequence: u32,
}

impl InputBuffer {
    /// Appends a snapshot under the next sequence number, evicting the
    /// oldest entry when full. Returns the assigned sequence.
    pub fn push(&mut self, timestamp: f64, buttons: InputButtons, mouse_dir: Vec2) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        if self.entries.len() >= INPUT_BUFFER_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(InputSnapshot {
            sequence,
            timestamp,
            buttons,
            mouse_dir,
        });
        sequence
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.entries.iter().any(|s| s.sequence == sequence)
    }

    /// Snapshots strictly after `sequence`, oldest first.
    pub fn after(&self, sequence: u32) -> impl Iterator<Item = &InputSnapshot> {
        self.entries.iter().filter(move |s| s.sequence > sequence)
    }

    /// Drops everything up to and including the acknowledged sequence.
    pub fn ack(&mut self, sequence: u32) {
        while let Some(front) = self.entries.front() {
            if front.sequence <= sequence {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Marks the locally controlled, client-side predicted body.
#[derive(Component)]
pub struct Predicted;

#[derive(Component, Clone, Copy, Debug)]
pub struct ReconciliationState {
    pub last_acked_sequence: u32,
    pub server_position: Vec2,
    pub server_velocity: Vec2,
    pub server_rotation: f32,
    pub server_tick: u64,
    pub has_ack: bool,
    /// Positional error above which correction kicks in.
    pub threshold: f32,
}

impl Default for ReconciliationState {
    fn default() -> Self {
        ReconciliationState {
            last_acked_sequence: 0,
            server_position: Vec2::ZERO,
            server_velocity: Vec2::ZERO,
            server_rotation: 0.0,
            server_tick: 0,
            has_ack: false,
            threshold: RECONCILE_THRESHOLD,
        }
    }
}

/// An authoritative state frame for the local entity, routed from the
/// transport by the guest update system.
#[derive(Message, Clone, Copy)]
pub struct AuthoritativeUpdate(pub PlayerStateFrame);

pub struct PredictionPlugin;

impl Plugin for PredictionPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<AuthoritativeUpdate>().add_systems(
            FixedUpdate,
            (reconcile, predict)
                .chain()
                .run_if(is_guest)
                .run_if(in_state(GameState::Playing)),
        );
    }
}

/// One correction decision, separated from the ECS so it can be tested
/// directly against known inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    None,
    Smooth,
    Snap,
}

pub fn classify_error(threshold: f32, position_error: f32, velocity_error: f32) -> Correction {
    if position_error > threshold * SNAP_MULTIPLIER || velocity_error > VELOCITY_SNAP_THRESHOLD {
        Correction::Snap
    } else if position_error > threshold {
        Correction::Smooth
    } else {
        Correction::None
    }
}

/// Wraps an angle difference onto the shortest path in `[-π, π]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

#[allow(clippy::type_complexity)]
fn predict(
    time: Res<Time>,
    local: Res<LocalInput>,
    config: Res<ArenaConfig>,
    channels: Option<Res<GuestChannels>>,
    local_id: Option<Res<LocalNetId>>,
    mut ships: Query<
        (
            &mut InputBuffer,
            &Engine,
            &Energy,
            &Collider,
            &MassProperties,
            &mut Position,
            &mut Rotation,
            &mut LinearVelocity,
            &mut AngularVelocity,
            &mut Acceleration,
        ),
        With<Predicted>,
    >,
) {
    for (
        mut buffer,
        engine,
        energy,
        collider,
        mass,
        mut position,
        mut rotation,
        mut linear_velocity,
        mut angular_velocity,
        mut acceleration,
    ) in ships.iter_mut()
    {
        let sequence = buffer.push(time.elapsed_secs_f64(), local.buttons, local.mouse_dir);

        let mut state = BodyState {
            position: position.0,
            rotation: rotation.0,
            linear_velocity: linear_velocity.0,
            angular_velocity: angular_velocity.0,
            acceleration: acceleration.0,
        };
        let boost = local.buttons.pressed(InputButtons::BOOST) && energy.current > 0.0;
        apply_controls(&mut state, local.buttons, engine, boost);
        step_body(
            &mut state,
            mass.mass,
            collider.drag,
            collider.elasticity,
            collider.shape.bounding_radius(),
            &config,
        );

        position.0 = state.position;
        rotation.0 = state.rotation;
        linear_velocity.0 = state.linear_velocity;
        angular_velocity.0 = state.angular_velocity;
        acceleration.0 = state.acceleration;

        if let (Some(channels), Some(local_id)) = (channels.as_ref(), local_id.as_ref()) {
            let frame = WireMessage::Input(InputFrame {
                entity_id: local_id.0,
                sequence,
                buttons: local.buttons,
                mouse_dir: local.mouse_dir,
            });
            let _ = channels.input_tx.try_send(frame.encode());
        }
    }
}

#[allow(clippy::type_complexity)]
fn reconcile(
    mut updates: MessageReader<AuthoritativeUpdate>,
    server_tick: Option<Res<ServerTickEstimate>>,
    config: Res<ArenaConfig>,
    mut ships: Query<
        (
            &mut InputBuffer,
            &mut ReconciliationState,
            &Engine,
            &Energy,
            &Collider,
            &MassProperties,
            &mut Position,
            &mut Rotation,
            &mut LinearVelocity,
            &mut AngularVelocity,
            &mut Acceleration,
        ),
        With<Predicted>,
    >,
) {
    let Some(update) = updates.read().last().copied() else {
        return;
    };
    let frame = update.0;

    // The entity may have despawned since the frame was routed.
    let Ok((
        mut buffer,
        mut recon,
        engine,
        energy,
        collider,
        mass,
        mut position,
        mut rotation,
        mut linear_velocity,
        mut angular_velocity,
        mut acceleration,
    )) = ships.single_mut()
    else {
        return;
    };

    // Updates long since superseded cause false-positive corrections.
    if let Some(ref estimate) = server_tick {
        if estimate.current().saturating_sub(frame.tick as u64) > STALE_TICK_SLACK {
            return;
        }
    }

    let record_ack = |recon: &mut ReconciliationState| {
        recon.has_ack = true;
        recon.last_acked_sequence = frame.acked_sequence;
        recon.server_position = frame.position;
        recon.server_velocity = frame.velocity;
        recon.server_rotation = frame.rotation;
        recon.server_tick = frame.tick as u64;
    };

    // Without usable history (first update, or the acknowledged input was
    // already evicted) the server state is adopted wholesale.
    if !recon.has_ack || !buffer.contains(frame.acked_sequence) {
        position.0 = frame.position;
        rotation.0 = frame.rotation;
        linear_velocity.0 = frame.velocity;
        angular_velocity.0 = 0.0;
        acceleration.0 = Vec2::ZERO;
        buffer.clear();
        record_ack(&mut recon);
        return;
    }

    // Replay everything the server has not seen yet on top of its state;
    // the result is where the prediction should be standing now.
    let mut replayed = BodyState {
        position: frame.position,
        rotation: frame.rotation,
        linear_velocity: frame.velocity,
        angular_velocity: angular_velocity.0,
        acceleration: Vec2::ZERO,
    };
    for snapshot in buffer.after(frame.acked_sequence) {
        let boost = snapshot.buttons.pressed(InputButtons::BOOST) && energy.current > 0.0;
        apply_controls(&mut replayed, snapshot.buttons, engine, boost);
        step_body(
            &mut replayed,
            mass.mass,
            collider.drag,
            collider.elasticity,
            collider.shape.bounding_radius(),
            &config,
        );
    }

    let position_error = position.0.distance(replayed.position);
    let velocity_error = linear_velocity.0.distance(frame.velocity);

    match classify_error(recon.threshold, position_error, velocity_error) {
        Correction::None => {}
        Correction::Smooth => {
            // Larger error corrects faster, capped to avoid teleporting.
            let rate = (position_error / (recon.threshold * SNAP_MULTIPLIER)).min(1.0)
                * MAX_LERP_RATE;
            position.0 = position.0.lerp(replayed.position, rate);
            let delta = wrap_angle(replayed.rotation - rotation.0);
            rotation.0 = (rotation.0 + delta * rate).rem_euclid(TAU);
            if velocity_error > VELOCITY_NUDGE_THRESHOLD {
                linear_velocity.0 = linear_velocity
                    .0
                    .lerp(replayed.linear_velocity, rate);
            }
        }
        Correction::Snap => {
            // Collision-scale divergence: the server outcome is the only
            // truth, and the predicted history is worthless.
            position.0 = frame.position;
            rotation.0 = frame.rotation;
            linear_velocity.0 = frame.velocity;
            angular_velocity.0 = 0.0;
            acceleration.0 = Vec2::ZERO;
            buffer.clear();
            record_ack(&mut recon);
            return;
        }
    }

    // Dead-zone guard: both nearly at rest but still disagreeing reads as
    // visible jitter, so hard-reset the velocity.
    if linear_velocity.0.length() < LOW_SPEED
        && frame.velocity.length() < LOW_SPEED
        && linear_velocity.0.distance(frame.velocity) > LOW_SPEED_DISAGREEMENT
    {
        linear_velocity.0 = frame.velocity;
    }

    buffer.ack(frame.acked_sequence);
    record_ack(&mut recon);
}
