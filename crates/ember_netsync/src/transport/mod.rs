//! # Transport Layer
//!
//! The engine treats its transport as a broadcast-plus-unicast byte channel
//! with known sender identity per received message. Lobby setup, NAT
//! traversal, and delivery live behind the [`Transport`] trait; the engine
//! is the trait object's sole caller and polls it once per tick.
//!
//! Transports that run background threads must marshal received frames into
//! a thread-safe queue and hand them over synchronously from
//! [`Transport::receive`].

mod memory;

pub use memory::{LobbyHub, MemoryTransport};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Identity of a peer inside a lobby, as reported by the transport.
pub type PeerId = String;

/// Connection lifecycle as reported by a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Still negotiating with the lobby service.
    Negotiating,
    /// Connected to the lobby; the session has not started.
    Connected,
    /// The lobby is locked and the game session is live.
    InSession,
    /// The lobby refused the connection.
    Denied,
    /// The connection was closed.
    Disconnected,
    /// The connection failed mid-flight.
    Failed,
    /// The room id was not recognized.
    Invalid,
    /// The peer's protocol version does not match the lobby's.
    Mismatched,
}

/// Lobby connection parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Lobby service address.
    pub lobby_address: String,
    /// Lobby service port.
    pub port: u16,
    /// Maximum number of peers admitted to a room.
    pub max_players: u32,
    /// Protocol version; peers with mismatched versions are rejected.
    pub api_version: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            lobby_address: "127.0.0.1".to_string(),
            port: 8000,
            max_players: 4,
            api_version: 1,
        }
    }
}

/// A broadcast-plus-unicast byte channel connecting the peers of one room.
pub trait Transport {
    /// Opens the connection described by `config`.
    fn open(&mut self, config: &TransportConfig) -> SyncResult<()>;

    /// Closes the connection and leaves the room.
    fn close(&mut self);

    /// Locks the room and starts the game session. Host only.
    fn start_session(&mut self);

    /// Sends a frame to every other peer in the room.
    fn broadcast(&mut self, data: &[u8]);

    /// Sends a frame to one peer. Sending to the local peer loops back.
    fn send_to(&mut self, peer: &PeerId, data: &[u8]);

    /// Drains every frame received since the last call, invoking the
    /// callback with the sender identity and frame bytes.
    fn receive(&mut self, callback: &mut dyn FnMut(PeerId, Vec<u8>));

    /// Returns the current connection state.
    fn state(&self) -> TransportState;

    /// Returns the identity of the local peer.
    fn local_peer(&self) -> PeerId;

    /// Returns the identities of every peer in the room, local included.
    fn players(&self) -> BTreeSet<PeerId>;

    /// Returns the id of the connected room.
    fn room(&self) -> String;
}
