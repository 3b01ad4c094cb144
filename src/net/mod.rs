use std::collections::HashMap;

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

pub mod guest;
pub mod host;
pub mod interpolation;
pub mod prediction;
pub mod protocol;
pub mod sync;

use protocol::{InputFrame, WireMessage, HEADER_LEN};

/// Network role for this game instance.
#[derive(Resource, Clone, Debug, Default)]
pub enum NetworkRole {
    #[default]
    Offline,
    Host {
        port: u16,
    },
    Guest {
        addr: String,
    },
}

pub fn is_host(role: Res<NetworkRole>) -> bool {
    matches!(*role, NetworkRole::Host { .. })
}

pub fn is_guest(role: Res<NetworkRole>) -> bool {
    matches!(*role, NetworkRole::Guest { .. })
}

/// Host and offline instances both run the authoritative simulation.
pub fn is_authoritative(role: Res<NetworkRole>) -> bool {
    !matches!(*role, NetworkRole::Guest { .. })
}

/// Stable wire identifier of a replicated entity.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NetId(pub u32);

/// Allocates net ids on the authority.
#[derive(Resource)]
pub struct NetIdAllocator(pub u32);

impl Default for NetIdAllocator {
    fn default() -> Self {
        NetIdAllocator(1)
    }
}

impl NetIdAllocator {
    pub fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Marks an entity as controlled by a remote guest; the payload is the
/// guest's net id.
#[derive(Component)]
pub struct GuestTag(pub u32);

/// Maps wire ids to local ECS entities (guest side).
#[derive(Resource, Default)]
pub struct NetEntityMap(pub HashMap<u32, Entity>);

// --- Channel types for the Bevy ↔ async bridge ---

/// A join request from a connecting guest.
pub struct JoinEvent {
    pub name: String,
    pub response_tx: tokio::sync::oneshot::Sender<WelcomeData>,
    /// The connection's outgoing frame sender, registered by the join
    /// handler so broadcasts reach this guest.
    pub outgoing: tokio::sync::mpsc::Sender<Vec<u8>>,
}

/// Sent back to the connection task once the join is processed.
pub struct WelcomeData {
    pub assigned_id: u32,
    pub bytes: Vec<u8>,
}

/// Input received from a guest connection.
pub struct GuestInputEvent {
    pub guest_id: u32,
    pub frame: InputFrame,
}

/// A disconnect notification from a guest connection.
pub struct LeaveEvent {
    pub guest_id: u32,
}

/// Channels from the transport tasks into Bevy (host side).
#[derive(Resource)]
pub struct HostChannels {
    pub join_rx: Receiver<JoinEvent>,
    pub join_tx: Sender<JoinEvent>,
    pub input_rx: Receiver<GuestInputEvent>,
    pub input_tx: Sender<GuestInputEvent>,
    pub leave_rx: Receiver<LeaveEvent>,
    pub leave_tx: Sender<LeaveEvent>,
}

impl Default for HostChannels {
    fn default() -> Self {
        let (join_tx, join_rx) = crossbeam_channel::unbounded();
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let (leave_tx, leave_rx) = crossbeam_channel::unbounded();
        HostChannels {
            join_rx,
            join_tx,
            input_rx,
            input_tx,
            leave_rx,
            leave_tx,
        }
    }
}

/// Per-guest outgoing frame senders (host side). Each connection's write
/// task holds the corresponding receiver.
#[derive(Resource, Default)]
pub struct GuestSenders(pub Vec<(u32, tokio::sync::mpsc::Sender<Vec<u8>>)>);

/// Channels from the transport tasks into Bevy (guest side).
#[derive(Resource)]
pub struct GuestChannels {
    pub update_rx: Receiver<WireMessage>,
    pub input_tx: tokio::sync::mpsc::Sender<Vec<u8>>,
}

/// The guest's assigned net id from the host.
#[derive(Resource)]
pub struct LocalNetId(pub u32);

/// Reads one length-framed message off the wire. `None` means the peer
/// went away.
pub(crate) async fn read_frame(read: &mut OwnedReadHalf) -> Option<(u16, Vec<u8>)> {
    let mut header = [0u8; HEADER_LEN];
    read.read_exact(&mut header).await.ok()?;
    let (len, type_id) = protocol::read_header(header);
    let mut payload = vec![0u8; len as usize];
    read.read_exact(&mut payload).await.ok()?;
    Some((type_id, payload))
}

pub struct NetworkPlugin;

impl Plugin for NetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NetworkRole>()
            .init_resource::<NetIdAllocator>()
            .add_plugins(host::HostPlugin)
            .add_plugins(guest::GuestPlugin)
            .add_plugins(prediction::PredictionPlugin)
            .add_plugins(interpolation::InterpolationPlugin)
            .add_plugins(sync::SyncPlugin);
    }
}
