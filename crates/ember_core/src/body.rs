//! Rigid-body property model.
//!
//! The property groups here mirror the wire protocol: pose and motion are
//! synchronized continuously, while the flag and material groups change
//! rarely and travel as whole blocks.

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Opaque handle addressing a body inside a simulator.
///
/// Handles are only meaningful to the simulator that issued them and may be
/// reused after the body is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

/// How a body participates in the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum BodyType {
    /// Never moves; infinite mass.
    Static = 0,
    /// Moves only when told to; infinite mass.
    Kinematic = 1,
    /// Fully simulated.
    #[default]
    Dynamic = 2,
}

impl BodyType {
    /// Decodes a body type from its wire representation.
    ///
    /// Unknown discriminants fall back to `Static`, matching the decoder
    /// policy of returning inert defaults for malformed frames.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::Kinematic,
            2 => Self::Dynamic,
            _ => Self::Static,
        }
    }
}

/// Boolean simulation constants, synchronized as one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFlags {
    /// Whether the body participates in simulation at all.
    pub enabled: bool,
    /// Whether the body is currently awake.
    pub awake: bool,
    /// Whether the body may be put to sleep by the solver.
    pub sleeping_allowed: bool,
    /// Whether rotation is locked.
    pub fixed_rotation: bool,
    /// Whether continuous collision detection applies.
    pub bullet: bool,
    /// Whether the body only reports contacts without responding to them.
    pub sensor: bool,
}

impl Default for BodyFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            awake: true,
            sleeping_allowed: true,
            fixed_rotation: false,
            bullet: false,
            sensor: false,
        }
    }
}

/// Scalar simulation constants, synchronized as one block.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyMaterial {
    /// Mass per unit area.
    pub density: f32,
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Bounciness in [0, 1].
    pub restitution: f32,
    /// Drag applied to linear velocity.
    pub linear_damping: f32,
    /// Drag applied to angular velocity.
    pub angular_damping: f32,
    /// Multiplier on world gravity.
    pub gravity_scale: f32,
    /// Total mass.
    pub mass: f32,
    /// Rotational inertia about the centroid.
    pub inertia: f32,
    /// Center of mass in local coordinates.
    pub centroid: Vec2,
}

impl Default for BodyMaterial {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            mass: 1.0,
            inertia: 0.0,
            centroid: Vec2::ZERO,
        }
    }
}

/// Everything a simulator needs to create a body.
///
/// Factories build these from serialized parameters so that remote peers
/// can reconstruct a body without shipping simulator internals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyDef {
    /// Simulation kind.
    pub body_type: BodyType,
    /// Initial position.
    pub position: Vec2,
    /// Initial angle in radians.
    pub angle: f32,
    /// Initial linear velocity.
    pub linear_velocity: Vec2,
    /// Initial angular velocity in radians per second.
    pub angular_velocity: f32,
    /// Boolean constants.
    pub flags: BodyFlags,
    /// Scalar constants.
    pub material: BodyMaterial,
}

/// Optional description of the visual node that should accompany a body.
///
/// The replication core never interprets this; it is forwarded to the
/// scene-link callback registered by the application, which owns all
/// rendering concerns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Name of the texture to attach.
    pub texture: String,
    /// Visual size in world units.
    pub size: Vec2,
}
