//! # Built-in Event Payloads
//!
//! The three payload kinds the engine itself produces and consumes:
//! control-plane messages, bulk body snapshots, and single-body deltas.
//!
//! ## Wire layouts (all scalars in network byte order)
//!
//! ```text
//! GameState: subtype:u8 [short_uid:u8]           (uid only for UID_ASSIGN)
//! PhysSync:  count:u64 (id:u64 x y vx vy angle w : f32)*
//! PhysObj:   subtype:u32 id:u64 payload-per-subtype
//! ```

use std::collections::HashSet;

use ember_core::{BodyFlags, BodyMaterial, BodyType, Vec2};

use super::codec::{ByteReader, ByteWriter};

/// Globally unique identifier of a shared body.
///
/// The high 32 bits carry the originating peer's short-UID, the low 32 bits
/// a per-peer sequence number. Identifiers are immutable for the lifetime of
/// the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

impl BodyId {
    /// Reserved originator for bodies created deterministically before the
    /// handshake assigns short-UIDs.
    pub const WORLD_INIT_ORIGINATOR: u32 = 0xFFFF_FFFF;

    /// Composes an identifier from an originator short-UID and a sequence.
    #[must_use]
    pub const fn compose(originator: u32, sequence: u32) -> Self {
        Self(((originator as u64) << 32) | sequence as u64)
    }

    /// Returns the short-UID of the peer that created the body.
    #[must_use]
    pub const fn originator(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the per-peer creation sequence number.
    #[must_use]
    pub const fn sequence(self) -> u32 {
        self.0 as u32
    }

    /// Returns true if the body was created before handshake completion.
    #[must_use]
    pub const fn is_world_init(self) -> bool {
        self.originator() == Self::WORLD_INIT_ORIGINATOR
    }
}

/// Identifier of a registered body factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FactoryId(pub u32);

// Control-plane subtype codes. 100-based to keep them visually distinct
// from PhysObj subtypes in captures.
const SUBTYPE_UID_ASSIGN: u8 = 100;
const SUBTYPE_CLIENT_READY: u8 = 101;
const SUBTYPE_GAME_START: u8 = 102;
const SUBTYPE_GAME_RESET: u8 = 103;
const SUBTYPE_GAME_PAUSE: u8 = 104;
const SUBTYPE_GAME_RESUME: u8 = 105;

/// Control-plane message driving the session handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStateEvent {
    /// Host-to-peer assignment of a short-UID. Never broadcast.
    UidAssign {
        /// The assigned short-UID, always non-zero.
        short_uid: u32,
    },
    /// A peer finished initialization and is ready to start.
    ClientReady,
    /// Host signal that the game begins this tick.
    GameStart,
    /// Reserved.
    GameReset,
    /// Reserved.
    GamePause,
    /// Reserved.
    GameResume,
}

impl GameStateEvent {
    /// Serializes the message payload.
    pub fn encode(&self, writer: &mut ByteWriter) {
        match *self {
            Self::UidAssign { short_uid } => {
                writer.write_u8(SUBTYPE_UID_ASSIGN);
                writer.write_u8(short_uid as u8);
            }
            Self::ClientReady => writer.write_u8(SUBTYPE_CLIENT_READY),
            Self::GameStart => writer.write_u8(SUBTYPE_GAME_START),
            Self::GameReset => writer.write_u8(SUBTYPE_GAME_RESET),
            Self::GamePause => writer.write_u8(SUBTYPE_GAME_PAUSE),
            Self::GameResume => writer.write_u8(SUBTYPE_GAME_RESUME),
        }
    }

    /// Deserializes a message payload, or `None` for an unknown subtype.
    #[must_use]
    pub fn decode(reader: &mut ByteReader<'_>) -> Option<Self> {
        match reader.read_u8() {
            SUBTYPE_UID_ASSIGN => Some(Self::UidAssign {
                short_uid: u32::from(reader.read_u8()),
            }),
            SUBTYPE_CLIENT_READY => Some(Self::ClientReady),
            SUBTYPE_GAME_START => Some(Self::GameStart),
            SUBTYPE_GAME_RESET => Some(Self::GameReset),
            SUBTYPE_GAME_PAUSE => Some(Self::GamePause),
            SUBTYPE_GAME_RESUME => Some(Self::GameResume),
            _ => None,
        }
    }
}

/// Pose and motion of one body at the sender's current tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySnapshot {
    /// Which body this snapshot describes.
    pub id: BodyId,
    /// Position.
    pub position: Vec2,
    /// Linear velocity.
    pub linear_velocity: Vec2,
    /// Angle in radians.
    pub angle: f32,
    /// Angular velocity in radians per second.
    pub angular_velocity: f32,
}

/// Size of one encoded snapshot record.
const SNAPSHOT_RECORD_LEN: usize = 8 + 6 * 4;

/// Bulk synchronization of pose and velocity for a set of bodies.
#[derive(Clone, Debug, Default)]
pub struct PhysSyncEvent {
    seen: HashSet<BodyId>,
    snapshots: Vec<BodySnapshot>,
}

impl PhysSyncEvent {
    /// Creates an empty sync event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a snapshot. Duplicate body ids are silently coalesced; the
    /// first write for an id wins.
    pub fn add(&mut self, snapshot: BodySnapshot) {
        if self.seen.insert(snapshot.id) {
            self.snapshots.push(snapshot);
        }
    }

    /// Returns the snapshots in insertion order.
    #[must_use]
    pub fn snapshots(&self) -> &[BodySnapshot] {
        &self.snapshots
    }

    /// Returns true if no snapshots were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Serializes the snapshot list.
    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.snapshots.len() as u64);
        for snap in &self.snapshots {
            writer.write_u64(snap.id.0);
            writer.write_f32(snap.position.x);
            writer.write_f32(snap.position.y);
            writer.write_f32(snap.linear_velocity.x);
            writer.write_f32(snap.linear_velocity.y);
            writer.write_f32(snap.angle);
            writer.write_f32(snap.angular_velocity);
        }
    }

    /// Deserializes a snapshot list.
    ///
    /// A declared count larger than the remaining frame is treated as
    /// truncation: surplus entries are dropped.
    #[must_use]
    pub fn decode(reader: &mut ByteReader<'_>) -> Self {
        let declared = reader.read_u64();
        let mut event = Self::new();
        for _ in 0..declared {
            if reader.remaining() < SNAPSHOT_RECORD_LEN {
                break;
            }
            event.add(BodySnapshot {
                id: BodyId(reader.read_u64()),
                position: Vec2::new(reader.read_f32(), reader.read_f32()),
                linear_velocity: Vec2::new(reader.read_f32(), reader.read_f32()),
                angle: reader.read_f32(),
                angular_velocity: reader.read_f32(),
            });
        }
        event
    }
}

// PhysObj subtype codes, in wire order.
const SUBTYPE_CREATE: u32 = 0;
const SUBTYPE_DELETE: u32 = 1;
const SUBTYPE_BODY_TYPE: u32 = 2;
const SUBTYPE_POSITION: u32 = 3;
const SUBTYPE_VELOCITY: u32 = 4;
const SUBTYPE_ANGLE: u32 = 5;
const SUBTYPE_ANGULAR_VELOCITY: u32 = 6;
const SUBTYPE_FLAGS: u32 = 7;
const SUBTYPE_MATERIAL: u32 = 8;
const SUBTYPE_ACQUIRE: u32 = 9;
const SUBTYPE_RELEASE: u32 = 10;

/// Single-body property delta.
///
/// One event is emitted per dirty property group per tick; the groups match
/// the dirty bits the simulator tracks.
#[derive(Clone, Debug, PartialEq)]
pub enum PhysObjEvent {
    /// A shared body was created from factory parameters.
    Create {
        /// The new body's identifier.
        id: BodyId,
        /// Which factory reconstructs the body.
        factory: FactoryId,
        /// Opaque factory parameters.
        params: Vec<u8>,
    },
    /// A shared body was destroyed.
    Delete {
        /// The destroyed body's identifier.
        id: BodyId,
    },
    /// The body's simulation kind changed.
    BodyType {
        /// Target body.
        id: BodyId,
        /// New kind.
        body_type: BodyType,
    },
    /// The body was repositioned.
    Position {
        /// Target body.
        id: BodyId,
        /// New position.
        position: Vec2,
    },
    /// The body's linear velocity was set.
    Velocity {
        /// Target body.
        id: BodyId,
        /// New linear velocity.
        velocity: Vec2,
    },
    /// The body was rotated.
    Angle {
        /// Target body.
        id: BodyId,
        /// New angle in radians.
        angle: f32,
    },
    /// The body's angular velocity was set.
    AngularVelocity {
        /// Target body.
        id: BodyId,
        /// New angular velocity.
        angular_velocity: f32,
    },
    /// The boolean constant group changed.
    Flags {
        /// Target body.
        id: BodyId,
        /// New flag values.
        flags: BodyFlags,
    },
    /// The scalar constant group changed.
    Material {
        /// Target body.
        id: BodyId,
        /// New material values.
        material: BodyMaterial,
    },
    /// The sender claims authority over the body.
    AcquireOwnership {
        /// Target body.
        id: BodyId,
        /// Lease length in ticks; `0` is permanent.
        duration: u64,
    },
    /// The sender returns authority to the host.
    ReleaseOwnership {
        /// Target body.
        id: BodyId,
    },
}

impl PhysObjEvent {
    /// Returns the identifier of the body the delta targets.
    #[must_use]
    pub const fn id(&self) -> BodyId {
        match *self {
            Self::Create { id, .. }
            | Self::Delete { id }
            | Self::BodyType { id, .. }
            | Self::Position { id, .. }
            | Self::Velocity { id, .. }
            | Self::Angle { id, .. }
            | Self::AngularVelocity { id, .. }
            | Self::Flags { id, .. }
            | Self::Material { id, .. }
            | Self::AcquireOwnership { id, .. }
            | Self::ReleaseOwnership { id } => id,
        }
    }

    const fn subtype(&self) -> u32 {
        match self {
            Self::Create { .. } => SUBTYPE_CREATE,
            Self::Delete { .. } => SUBTYPE_DELETE,
            Self::BodyType { .. } => SUBTYPE_BODY_TYPE,
            Self::Position { .. } => SUBTYPE_POSITION,
            Self::Velocity { .. } => SUBTYPE_VELOCITY,
            Self::Angle { .. } => SUBTYPE_ANGLE,
            Self::AngularVelocity { .. } => SUBTYPE_ANGULAR_VELOCITY,
            Self::Flags { .. } => SUBTYPE_FLAGS,
            Self::Material { .. } => SUBTYPE_MATERIAL,
            Self::AcquireOwnership { .. } => SUBTYPE_ACQUIRE,
            Self::ReleaseOwnership { .. } => SUBTYPE_RELEASE,
        }
    }

    /// Serializes the delta payload.
    pub fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.subtype());
        writer.write_u64(self.id().0);
        match self {
            Self::Create { factory, params, .. } => {
                writer.write_u32(factory.0);
                writer.write_bytes(params);
            }
            Self::Delete { .. } | Self::ReleaseOwnership { .. } => {}
            Self::BodyType { body_type, .. } => writer.write_u32(*body_type as u32),
            Self::Position { position, .. } => {
                writer.write_f32(position.x);
                writer.write_f32(position.y);
            }
            Self::Velocity { velocity, .. } => {
                writer.write_f32(velocity.x);
                writer.write_f32(velocity.y);
            }
            Self::Angle { angle, .. } => writer.write_f32(*angle),
            Self::AngularVelocity {
                angular_velocity, ..
            } => writer.write_f32(*angular_velocity),
            Self::Flags { flags, .. } => {
                writer.write_bool(flags.enabled);
                writer.write_bool(flags.awake);
                writer.write_bool(flags.sleeping_allowed);
                writer.write_bool(flags.fixed_rotation);
                writer.write_bool(flags.bullet);
                writer.write_bool(flags.sensor);
            }
            Self::Material { material, .. } => {
                writer.write_f32(material.density);
                writer.write_f32(material.friction);
                writer.write_f32(material.restitution);
                writer.write_f32(material.linear_damping);
                writer.write_f32(material.angular_damping);
                writer.write_f32(material.gravity_scale);
                writer.write_f32(material.mass);
                writer.write_f32(material.inertia);
                writer.write_f32(material.centroid.x);
                writer.write_f32(material.centroid.y);
            }
            Self::AcquireOwnership { duration, .. } => writer.write_u64(*duration),
        }
    }

    /// Deserializes a delta payload, or `None` for an unknown subtype.
    ///
    /// Truncated buffers decode to zero-valued fields; the engine discards
    /// deltas whose body id resolves to nothing.
    #[must_use]
    pub fn decode(reader: &mut ByteReader<'_>) -> Option<Self> {
        let subtype = reader.read_u32();
        let id = BodyId(reader.read_u64());
        match subtype {
            SUBTYPE_CREATE => Some(Self::Create {
                id,
                factory: FactoryId(reader.read_u32()),
                params: reader.read_rest().to_vec(),
            }),
            SUBTYPE_DELETE => Some(Self::Delete { id }),
            SUBTYPE_BODY_TYPE => Some(Self::BodyType {
                id,
                body_type: BodyType::from_u32(reader.read_u32()),
            }),
            SUBTYPE_POSITION => Some(Self::Position {
                id,
                position: Vec2::new(reader.read_f32(), reader.read_f32()),
            }),
            SUBTYPE_VELOCITY => Some(Self::Velocity {
                id,
                velocity: Vec2::new(reader.read_f32(), reader.read_f32()),
            }),
            SUBTYPE_ANGLE => Some(Self::Angle {
                id,
                angle: reader.read_f32(),
            }),
            SUBTYPE_ANGULAR_VELOCITY => Some(Self::AngularVelocity {
                id,
                angular_velocity: reader.read_f32(),
            }),
            SUBTYPE_FLAGS => Some(Self::Flags {
                id,
                flags: BodyFlags {
                    enabled: reader.read_bool(),
                    awake: reader.read_bool(),
                    sleeping_allowed: reader.read_bool(),
                    fixed_rotation: reader.read_bool(),
                    bullet: reader.read_bool(),
                    sensor: reader.read_bool(),
                },
            }),
            SUBTYPE_MATERIAL => Some(Self::Material {
                id,
                material: BodyMaterial {
                    density: reader.read_f32(),
                    friction: reader.read_f32(),
                    restitution: reader.read_f32(),
                    linear_damping: reader.read_f32(),
                    angular_damping: reader.read_f32(),
                    gravity_scale: reader.read_f32(),
                    mass: reader.read_f32(),
                    inertia: reader.read_f32(),
                    centroid: Vec2::new(reader.read_f32(), reader.read_f32()),
                },
            }),
            SUBTYPE_ACQUIRE => Some(Self::AcquireOwnership {
                id,
                duration: reader.read_u64(),
            }),
            SUBTYPE_RELEASE => Some(Self::ReleaseOwnership { id }),
            _ => None,
        }
    }
}
