//! Binary wire protocol.
//!
//! Every message is framed as a 2-byte little-endian payload length
//! followed by a 2-byte type id; the length counts only the payload bytes
//! after the 4-byte header.

use std::fmt;

use bevy::prelude::*;

pub const HEADER_LEN: usize = 4;

pub const MSG_INPUT: u16 = 1;
pub const MSG_MOVEMENT: u16 = 2;
pub const MSG_STATUS: u16 = 3;
pub const MSG_JOIN: u16 = 4;
pub const MSG_WELCOME: u16 = 5;
pub const MSG_SPAWN: u16 = 6;
pub const MSG_DESPAWN: u16 = 7;
pub const MSG_PLAYER_STATE: u16 = 8;

/// Button bitmask carried in input frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputButtons(pub u16);

impl InputButtons {
    pub const THRUST: u16 = 1 << 0;
    pub const REVERSE: u16 = 1 << 1;
    pub const LEFT: u16 = 1 << 2;
    pub const RIGHT: u16 = 1 << 3;
    pub const BOOST: u16 = 1 << 4;
    pub const RCS: u16 = 1 << 5;
    pub const FIRE: u16 = 1 << 6;
    pub const DROP: u16 = 1 << 7;
    pub const SHIELD: u16 = 1 << 8;

    pub fn pressed(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    pub fn set(&mut self, mask: u16, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

/// Client → server: one sampled input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputFrame {
    pub entity_id: u32,
    pub sequence: u32,
    pub buttons: InputButtons,
    pub mouse_dir: Vec2,
}

/// Server → client: compact transform update for a remote entity.
/// 24 bytes on the wire including the header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementFrame {
    pub entity_id: u32,
    pub tick: u32,
    pub position: Vec2,
    pub rotation: f32,
}

/// Server → client: the richer update for the receiver's own entity,
/// carrying what reconciliation needs on top of the transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerStateFrame {
    pub entity_id: u32,
    pub tick: u32,
    pub acked_sequence: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Health,
    Energy,
    ShieldCharge,
}

impl StatusKind {
    fn to_byte(self) -> u8 {
        match self {
            StatusKind::Health => 0,
            StatusKind::Energy => 1,
            StatusKind::ShieldCharge => 2,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(StatusKind::Health),
            1 => Ok(StatusKind::Energy),
            2 => Ok(StatusKind::ShieldCharge),
            _ => Err(DecodeError::BadValue),
        }
    }
}

/// Server → client: a non-transform scalar field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusFrame {
    pub entity_id: u32,
    pub value: f64,
    pub kind: StatusKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Ship,
    Projectile,
    Mine,
    Obstacle,
}

impl BodyKind {
    fn to_byte(self) -> u8 {
        match self {
            BodyKind::Ship => 0,
            BodyKind::Projectile => 1,
            BodyKind::Mine => 2,
            BodyKind::Obstacle => 3,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(BodyKind::Ship),
            1 => Ok(BodyKind::Projectile),
            2 => Ok(BodyKind::Mine),
            3 => Ok(BodyKind::Obstacle),
            _ => Err(DecodeError::BadValue),
        }
    }
}

/// Server → client: a replicated body entering the world. `param_a` /
/// `param_b` are shape parameters interpreted per kind (circle radius, or
/// box half-extents).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnFrame {
    pub entity_id: u32,
    pub kind: BodyKind,
    pub owner_id: u32,
    pub position: Vec2,
    pub rotation: f32,
    pub velocity: Vec2,
    pub param_a: f32,
    pub param_b: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WireMessage {
    Input(InputFrame),
    Movement(MovementFrame),
    PlayerState(PlayerStateFrame),
    Status(StatusFrame),
    Join { name: String },
    Welcome { assigned_id: u32, tick: u32, bodies: Vec<SpawnFrame> },
    Spawn(SpawnFrame),
    Despawn { entity_id: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    UnknownType(u16),
    BadValue,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated payload"),
            DecodeError::UnknownType(id) => write!(f, "unknown message type {id}"),
            DecodeError::BadValue => write!(f, "invalid field value"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Splits a raw 4-byte frame header into (payload length, type id).
pub fn read_header(bytes: [u8; HEADER_LEN]) -> (u16, u16) {
    (
        u16::from_le_bytes([bytes[0], bytes[1]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
    )
}

impl WireMessage {
    /// Serializes into a complete frame, header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(32);
        let type_id = match self {
            WireMessage::Input(frame) => {
                put_u32(&mut payload, frame.entity_id);
                put_u32(&mut payload, frame.sequence);
                put_u16(&mut payload, frame.buttons.0);
                put_f32(&mut payload, frame.mouse_dir.x);
                put_f32(&mut payload, frame.mouse_dir.y);
                MSG_INPUT
            }
            WireMessage::Movement(frame) => {
                put_u32(&mut payload, frame.entity_id);
                put_u32(&mut payload, frame.tick);
                put_f32(&mut payload, frame.position.x);
                put_f32(&mut payload, frame.position.y);
                put_f32(&mut payload, frame.rotation);
                MSG_MOVEMENT
            }
            WireMessage::PlayerState(frame) => {
                put_u32(&mut payload, frame.entity_id);
                put_u32(&mut payload, frame.tick);
                put_u32(&mut payload, frame.acked_sequence);
                put_f32(&mut payload, frame.position.x);
                put_f32(&mut payload, frame.position.y);
                put_f32(&mut payload, frame.velocity.x);
                put_f32(&mut payload, frame.velocity.y);
                put_f32(&mut payload, frame.rotation);
                MSG_PLAYER_STATE
            }
            WireMessage::Status(frame) => {
                put_u32(&mut payload, frame.entity_id);
                payload.extend_from_slice(&frame.value.to_le_bytes());
                payload.push(frame.kind.to_byte());
                MSG_STATUS
            }
            WireMessage::Join { name } => {
                payload.extend_from_slice(name.as_bytes());
                MSG_JOIN
            }
            WireMessage::Welcome { assigned_id, tick, bodies } => {
                put_u32(&mut payload, *assigned_id);
                put_u32(&mut payload, *tick);
                put_u16(&mut payload, bodies.len() as u16);
                for body in bodies {
                    put_spawn(&mut payload, body);
                }
                MSG_WELCOME
            }
            WireMessage::Spawn(frame) => {
                put_spawn(&mut payload, frame);
                MSG_SPAWN
            }
            WireMessage::Despawn { entity_id } => {
                put_u32(&mut payload, *entity_id);
                MSG_DESPAWN
            }
        };

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&type_id.to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    /// Decodes one message from a type id plus payload (header already
    /// split off by the transport read loop).
    pub fn decode(type_id: u16, payload: &[u8]) -> Result<WireMessage, DecodeError> {
        let mut reader = Reader::new(payload);
        let message = match type_id {
            MSG_INPUT => WireMessage::Input(InputFrame {
                entity_id: reader.u32()?,
                sequence: reader.u32()?,
                buttons: InputButtons(reader.u16()?),
                mouse_dir: Vec2::new(reader.f32()?, reader.f32()?),
            }),
            MSG_MOVEMENT => WireMessage::Movement(MovementFrame {
                entity_id: reader.u32()?,
                tick: reader.u32()?,
                position: Vec2::new(reader.f32()?, reader.f32()?),
                rotation: reader.f32()?,
            }),
            MSG_PLAYER_STATE => WireMessage::PlayerState(PlayerStateFrame {
                entity_id: reader.u32()?,
                tick: reader.u32()?,
                acked_sequence: reader.u32()?,
                position: Vec2::new(reader.f32()?, reader.f32()?),
                velocity: Vec2::new(reader.f32()?, reader.f32()?),
                rotation: reader.f32()?,
            }),
            MSG_STATUS => WireMessage::Status(StatusFrame {
                entity_id: reader.u32()?,
                value: reader.f64()?,
                kind: StatusKind::from_byte(reader.u8()?)?,
            }),
            MSG_JOIN => {
                let name = String::from_utf8(payload.to_vec())
                    .map_err(|_| DecodeError::BadValue)?;
                return Ok(WireMessage::Join { name });
            }
            MSG_WELCOME => {
                let assigned_id = reader.u32()?;
                let tick = reader.u32()?;
                let count = reader.u16()?;
                let mut bodies = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    bodies.push(read_spawn(&mut reader)?);
                }
                WireMessage::Welcome { assigned_id, tick, bodies }
            }
            MSG_SPAWN => WireMessage::Spawn(read_spawn(&mut reader)?),
            MSG_DESPAWN => WireMessage::Despawn {
                entity_id: reader.u32()?,
            },
            other => return Err(DecodeError::UnknownType(other)),
        };
        if !reader.is_empty() {
            return Err(DecodeError::BadValue);
        }
        Ok(message)
    }
}

fn put_spawn(payload: &mut Vec<u8>, frame: &SpawnFrame) {
    put_u32(payload, frame.entity_id);
    payload.push(frame.kind.to_byte());
    put_u32(payload, frame.owner_id);
    put_f32(payload, frame.position.x);
    put_f32(payload, frame.position.y);
    put_f32(payload, frame.rotation);
    put_f32(payload, frame.velocity.x);
    put_f32(payload, frame.velocity.y);
    put_f32(payload, frame.param_a);
    put_f32(payload, frame.param_b);
}

fn read_spawn(reader: &mut Reader<'_>) -> Result<SpawnFrame, DecodeError> {
    Ok(SpawnFrame {
        entity_id: reader.u32()?,
        kind: BodyKind::from_byte(reader.u8()?)?,
        owner_id: reader.u32()?,
        position: Vec2::new(reader.f32()?, reader.f32()?),
        rotation: reader.f32()?,
        velocity: Vec2::new(reader.f32()?, reader.f32()?),
        param_a: reader.f32()?,
        param_b: reader.f32()?,
    })
}

fn put_u16(payload: &mut Vec<u8>, value: u16) {
    payload.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(payload: &mut Vec<u8>, value: u32) {
    payload.extend_from_slice(&value.to_le_bytes());
}

fn put_f32(payload: &mut Vec<u8>, value: f32) {
    payload.extend_from_slice(&value.to_le_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, cursor: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.data.len() - self.cursor < N {
            return Err(DecodeError::Truncated);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.cursor..self.cursor + N]);
        self.cursor += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn is_empty(&self) -> bool {
        self.cursor == self.data.len()
    }
}
