//! # Ember Netsync
//!
//! Networked rigid-body replication for real-time multiplayer physics.
//!
//! ## Architecture
//!
//! The crate is a small layered stack, leaves first:
//!
//! - **Protocol**: primitive wire codec, typed event payloads, and the
//!   tag + sender-tick envelope framing every datagram
//! - **Transport**: broadcast-plus-unicast byte channel abstraction with
//!   an in-process lobby hub for tests
//! - **Session**: the `IDLE → … → INGAME` handshake state machine, event
//!   registry, and inbound/outbound queues
//! - **Replication**: ownership leases, the id/handle body registry, and
//!   the engine that publishes dirty-bit deltas, packs snapshots, and
//!   reconciles remote state through bounded interpolation
//!
//! ## Consistency Model
//!
//! Peers run the simulation locally at a fixed rate. Authoritative updates
//! flow from whichever peer holds a body's ownership lease; receivers never
//! hard-snap but converge over at most thirty ticks. The result is
//! bit-close-to-consistent, not deterministic lockstep.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_netsync::{NetSession, TransportConfig};
//!
//! let mut session = NetSession::new(clock, transport, TransportConfig::default());
//! session.connect_as_host();
//! // once connected: session.start_session(), session.mark_ready(), then
//! // session.update() every fixed update.
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod config;
pub mod error;
pub mod integration;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use protocol::{
    BodyId, BodySnapshot, EventPayload, EventRegistry, FactoryId, GameStateEvent, PhysObjEvent,
    PhysSyncEvent, ReceivedEvent,
};
pub use replication::{
    InterpolationMode, OwnershipLedger, ReplicationEngine, ReplicationStats, SyncMode,
};
pub use session::{NetSession, SessionStatus};
pub use transport::{PeerId, Transport, TransportConfig, TransportState};

/// Fixed update rate the engine is tuned for, in updates per second.
pub const DEFAULT_TICK_RATE: u32 = 60;
