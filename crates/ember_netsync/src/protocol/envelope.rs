//! # Event Envelope
//!
//! Every datagram on the wire is a payload wrapped in a fixed header:
//!
//! ```text
//! tag      : u8      index into the event registry
//! tick     : u64     sender tick (update count since game start)
//! payload  : bytes…
//! ```
//!
//! The registry maps tags to payload kinds. Tags are handed out in
//! registration order, so every peer must register application event types
//! in the same order at startup; the three built-in kinds always occupy
//! tags 0-2.

use crate::error::{SyncError, SyncResult};
use crate::transport::PeerId;

use super::codec::{ByteReader, ByteWriter};
use super::events::{GameStateEvent, PhysObjEvent, PhysSyncEvent};

/// Tag of the built-in control-plane event.
pub const TAG_GAME_STATE: u8 = 0;
/// Tag of the built-in bulk snapshot event.
pub const TAG_PHYS_SYNC: u8 = 1;
/// Tag of the built-in single-body delta event.
pub const TAG_PHYS_OBJ: u8 = 2;

/// Length of the envelope header (`tag` + `tick`).
pub const ENVELOPE_HEADER_LEN: usize = 1 + 8;

/// A decoded event payload.
#[derive(Clone, Debug)]
pub enum EventPayload {
    /// Session control-plane message.
    GameState(GameStateEvent),
    /// Bulk pose/velocity snapshot.
    PhysSync(PhysSyncEvent),
    /// Single-body property delta.
    PhysObj(PhysObjEvent),
    /// Application-defined event; the engine never interprets the bytes.
    App {
        /// The registered tag of the application event type.
        tag: u8,
        /// Opaque payload bytes.
        bytes: Vec<u8>,
    },
}

impl EventPayload {
    /// Returns the wire tag of this payload.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::GameState(_) => TAG_GAME_STATE,
            Self::PhysSync(_) => TAG_PHYS_SYNC,
            Self::PhysObj(_) => TAG_PHYS_OBJ,
            Self::App { tag, .. } => *tag,
        }
    }
}

/// An inbound event with the metadata stamped on during unwrap.
#[derive(Clone, Debug)]
pub struct ReceivedEvent {
    /// The decoded payload.
    pub payload: EventPayload,
    /// Which peer sent the event.
    pub source: PeerId,
    /// The sender's tick when the event was emitted.
    pub sender_tick: u64,
    /// The local tick when the event was unwrapped.
    pub receive_tick: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotKind {
    GameState,
    PhysSync,
    PhysObj,
    App,
}

/// Table of registered event kinds indexed by tag.
///
/// The three built-in kinds are registered at construction; application
/// kinds append after them in call order.
#[derive(Clone, Debug)]
pub struct EventRegistry {
    slots: Vec<SlotKind>,
}

impl EventRegistry {
    /// Creates a registry with the built-in event kinds at tags 0-2.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![SlotKind::GameState, SlotKind::PhysSync, SlotKind::PhysObj],
        }
    }

    /// Registers an application event type and returns its tag.
    ///
    /// All peers must perform the same registrations in the same order.
    pub fn register_app_event(&mut self) -> u8 {
        let tag = self.slots.len() as u8;
        self.slots.push(SlotKind::App);
        tag
    }

    /// Returns the number of registered event kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no event kinds are registered. Never the case in
    /// practice since the built-ins are registered at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wraps a payload into a wire frame stamped with the sender tick.
    #[must_use]
    pub fn wrap(&self, payload: &EventPayload, sender_tick: u64) -> Vec<u8> {
        let tag = payload.tag();
        assert!(
            (tag as usize) < self.slots.len(),
            "wrapping event with unregistered tag {tag}"
        );
        if let EventPayload::App { .. } = payload {
            assert_eq!(
                self.slots[tag as usize],
                SlotKind::App,
                "application payload carries a built-in tag {tag}"
            );
        }

        let mut writer = ByteWriter::new();
        writer.write_u8(tag);
        writer.write_u64(sender_tick);
        match payload {
            EventPayload::GameState(event) => event.encode(&mut writer),
            EventPayload::PhysSync(event) => event.encode(&mut writer),
            EventPayload::PhysObj(event) => event.encode(&mut writer),
            EventPayload::App { bytes, .. } => writer.write_bytes(bytes),
        }
        writer.into_vec()
    }

    /// Unwraps a wire frame into a payload with receive metadata.
    ///
    /// Frames shorter than the header or carrying an unregistered tag are
    /// rejected; the caller drops them.
    pub fn unwrap(
        &self,
        data: &[u8],
        source: PeerId,
        receive_tick: u64,
    ) -> SyncResult<ReceivedEvent> {
        if data.len() < ENVELOPE_HEADER_LEN {
            return Err(SyncError::TruncatedFrame(data.len()));
        }
        let tag = data[0];
        let Some(kind) = self.slots.get(tag as usize) else {
            return Err(SyncError::UnknownEventTag(tag));
        };

        let mut reader = ByteReader::new(data);
        let _ = reader.read_u8();
        let sender_tick = reader.read_u64();

        let payload = match kind {
            SlotKind::GameState => GameStateEvent::decode(&mut reader)
                .map(EventPayload::GameState)
                .ok_or(SyncError::MalformedPayload)?,
            SlotKind::PhysSync => EventPayload::PhysSync(PhysSyncEvent::decode(&mut reader)),
            SlotKind::PhysObj => PhysObjEvent::decode(&mut reader)
                .map(EventPayload::PhysObj)
                .ok_or(SyncError::MalformedPayload)?,
            SlotKind::App => EventPayload::App {
                tag,
                bytes: reader.read_rest().to_vec(),
            },
        };

        Ok(ReceivedEvent {
            payload,
            source,
            sender_tick,
            receive_tick,
        })
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::{BodyId, PhysObjEvent};
    use ember_core::Vec2;

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let registry = EventRegistry::new();
        let payload = EventPayload::PhysObj(PhysObjEvent::Position {
            id: BodyId::compose(1, 3),
            position: Vec2::new(4.0, 5.0),
        });

        let frame = registry.wrap(&payload, 77);
        let event = registry
            .unwrap(&frame, "peer-a".to_string(), 80)
            .expect("valid frame");

        assert_eq!(event.sender_tick, 77);
        assert_eq!(event.receive_tick, 80);
        assert_eq!(event.source, "peer-a");
        match event.payload {
            EventPayload::PhysObj(PhysObjEvent::Position { id, position }) => {
                assert_eq!(id, BodyId::compose(1, 3));
                assert_eq!(position, Vec2::new(4.0, 5.0));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_short_frame_rejected() {
        let registry = EventRegistry::new();
        let err = registry
            .unwrap(&[0u8; 8], "p".to_string(), 0)
            .expect_err("too short");
        assert_eq!(err, SyncError::TruncatedFrame(8));
    }

    #[test]
    fn test_unregistered_tag_rejected() {
        let registry = EventRegistry::new();
        let mut frame = vec![9u8];
        frame.extend_from_slice(&0u64.to_be_bytes());
        let err = registry
            .unwrap(&frame, "p".to_string(), 0)
            .expect_err("unknown tag");
        assert_eq!(err, SyncError::UnknownEventTag(9));
    }

    #[test]
    fn test_app_event_tags_assigned_in_order() {
        let mut registry = EventRegistry::new();
        assert_eq!(registry.register_app_event(), 3);
        assert_eq!(registry.register_app_event(), 4);

        let payload = EventPayload::App {
            tag: 3,
            bytes: b"hello".to_vec(),
        };
        let frame = registry.wrap(&payload, 5);
        let event = registry.unwrap(&frame, "p".to_string(), 5).expect("valid");
        match event.payload {
            EventPayload::App { tag, bytes } => {
                assert_eq!(tag, 3);
                assert_eq!(bytes, b"hello");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload_is_legal() {
        let mut registry = EventRegistry::new();
        let tag = registry.register_app_event();
        let frame = registry.wrap(
            &EventPayload::App {
                tag,
                bytes: Vec::new(),
            },
            1,
        );
        assert_eq!(frame.len(), ENVELOPE_HEADER_LEN);
        assert!(registry.unwrap(&frame, "p".to_string(), 1).is_ok());
    }
}
