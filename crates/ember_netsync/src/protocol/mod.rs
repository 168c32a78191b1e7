//! # Wire Protocol
//!
//! The serialization stack: primitive codec, typed event payloads, and the
//! envelope that frames every datagram with a tag and sender tick.

pub mod codec;
pub mod envelope;
pub mod events;

pub use codec::{ByteReader, ByteWriter};
pub use envelope::{
    EventPayload, EventRegistry, ReceivedEvent, ENVELOPE_HEADER_LEN, TAG_GAME_STATE, TAG_PHYS_OBJ,
    TAG_PHYS_SYNC,
};
pub use events::{
    BodyId, BodySnapshot, FactoryId, GameStateEvent, PhysObjEvent, PhysSyncEvent,
};
