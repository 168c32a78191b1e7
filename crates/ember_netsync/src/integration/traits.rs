//! # Integration Traits
//!
//! Traits the host application implements to plug the replication engine
//! into its fixed-update loop, rigid-body simulator, and scene graph. The
//! engine is written against these seams only; it never reaches into
//! collaborator internals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ember_core::{BodyDef, BodyFlags, BodyHandle, BodyMaterial, BodyType, SceneDescriptor, Vec2};

/// Source of the application's fixed-update counter.
///
/// The counter must increment exactly once per fixed update and never move
/// backwards; every tick the engine stamps on the wire derives from it.
pub trait Application {
    /// Number of fixed updates since the application launched.
    fn update_count(&self) -> u64;
}

/// Shared fixed-update counter for tests and headless drivers.
///
/// Clones observe the same counter, so a test can hold one clone while the
/// session owns another.
#[derive(Clone, Debug, Default)]
pub struct FixedClock {
    ticks: Arc<AtomicU64>,
}

impl FixedClock {
    /// Creates a clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter by one fixed update.
    pub fn advance(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Application for FixedClock {
    fn update_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Which property groups of a body were mutated since the last publish.
///
/// The groups match the wire protocol's delta events one-to-one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Position changed.
    pub position: bool,
    /// Angle changed.
    pub angle: bool,
    /// Linear velocity changed.
    pub velocity: bool,
    /// Angular velocity changed.
    pub angular_velocity: bool,
    /// Simulation kind changed.
    pub body_type: bool,
    /// The boolean constant group changed.
    pub flags: bool,
    /// The scalar constant group changed.
    pub material: bool,
}

impl DirtyFlags {
    /// Returns true if any group is dirty.
    #[must_use]
    pub const fn any(self) -> bool {
        self.position
            || self.angle
            || self.velocity
            || self.angular_velocity
            || self.body_type
            || self.flags
            || self.material
    }
}

/// The rigid-body simulator the engine synchronizes.
///
/// The engine calls into the simulator as a black box that advances time,
/// exposes per-body properties, and accepts direct writes. Two contracts
/// beyond plain storage:
///
/// - Setters record sharing dirty bits only while the body's `shared` flag
///   is set. The engine clears the flag around writes it performs on behalf
///   of remote peers, so those writes are never re-published.
/// - Handles are stable for a body's lifetime but may be reused after
///   [`destroy_body`](Simulator::destroy_body).
pub trait Simulator {
    /// Advances the simulation by `dt` seconds.
    fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32);

    /// Creates a body from a definition and returns its handle.
    fn create_body(&mut self, def: &BodyDef) -> BodyHandle;

    /// Destroys a body. Unknown handles are ignored.
    fn destroy_body(&mut self, handle: BodyHandle);

    /// Returns the number of live bodies.
    fn body_count(&self) -> usize;

    /// Returns the body's position.
    fn position(&self, handle: BodyHandle) -> Vec2;
    /// Sets the body's position.
    fn set_position(&mut self, handle: BodyHandle, position: Vec2);

    /// Returns the body's angle in radians.
    fn angle(&self, handle: BodyHandle) -> f32;
    /// Sets the body's angle in radians.
    fn set_angle(&mut self, handle: BodyHandle, angle: f32);

    /// Returns the body's linear velocity.
    fn linear_velocity(&self, handle: BodyHandle) -> Vec2;
    /// Sets the body's linear velocity.
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2);

    /// Returns the body's angular velocity.
    fn angular_velocity(&self, handle: BodyHandle) -> f32;
    /// Sets the body's angular velocity.
    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: f32);

    /// Returns the body's simulation kind.
    fn body_type(&self, handle: BodyHandle) -> BodyType;
    /// Sets the body's simulation kind.
    fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType);

    /// Returns the boolean constant group.
    fn flags(&self, handle: BodyHandle) -> BodyFlags;
    /// Sets the boolean constant group.
    fn set_flags(&mut self, handle: BodyHandle, flags: BodyFlags);

    /// Returns the scalar constant group.
    fn material(&self, handle: BodyHandle) -> BodyMaterial;
    /// Sets the scalar constant group.
    fn set_material(&mut self, handle: BodyHandle, material: BodyMaterial);

    /// Returns whether the body participates in replication.
    fn is_shared(&self, handle: BodyHandle) -> bool;
    /// Sets whether the body participates in replication.
    fn set_shared(&mut self, handle: BodyHandle, shared: bool);

    /// Returns which property groups changed since the dirty bits were
    /// last cleared.
    fn dirty(&self, handle: BodyHandle) -> DirtyFlags;
    /// Clears the body's sharing dirty bits.
    fn clear_sharing_dirty_bits(&mut self, handle: BodyHandle);
}

/// A recipe for reconstructing a body from serialized parameters.
///
/// Shipping simulator internals over the wire is costly, so creation
/// travels as a factory id plus whatever parameter bytes the factory
/// understands. Every peer must attach the same factories in the same
/// order.
pub trait BodyFactory {
    /// Builds a body definition and an optional scene descriptor from
    /// serialized parameters.
    fn construct(&self, params: &[u8]) -> (BodyDef, Option<SceneDescriptor>);
}

/// Receiver for scene-graph attachment of replicated bodies.
///
/// When a factory returns a scene descriptor, the engine forwards it here
/// on creation (local or remote) and reports the handle again when the
/// body is destroyed.
pub trait SceneLink {
    /// A body with a visual representation was created.
    fn link(&mut self, handle: BodyHandle, descriptor: SceneDescriptor);

    /// A previously linked body was destroyed.
    fn unlink(&mut self, handle: BodyHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_shared_between_clones() {
        let clock = FixedClock::new();
        let observer = clock.clone();

        assert_eq!(observer.update_count(), 0);
        clock.advance();
        clock.advance();
        assert_eq!(observer.update_count(), 2);
    }

    #[test]
    fn test_dirty_flags_any() {
        assert!(!DirtyFlags::default().any());
        let flags = DirtyFlags {
            material: true,
            ..DirtyFlags::default()
        };
        assert!(flags.any());
    }
}
