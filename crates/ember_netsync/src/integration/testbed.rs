//! # Testbed Simulator
//!
//! A minimal kinematic simulator implementing the [`Simulator`] contract:
//! bodies are slab-allocated, `step` integrates velocities, and setters
//! honor the sharing dirty-bit rules. It stands in for a full rigid-body
//! solver in tests and headless tools; there is no contact resolution.

use ember_core::{
    BodyDef, BodyFlags, BodyHandle, BodyMaterial, BodyType, SceneDescriptor, Vec2,
};

use crate::protocol::{ByteReader, ByteWriter};

use super::traits::{BodyFactory, DirtyFlags, Simulator};

#[derive(Clone, Debug)]
struct BodyState {
    body_type: BodyType,
    position: Vec2,
    angle: f32,
    linear_velocity: Vec2,
    angular_velocity: f32,
    flags: BodyFlags,
    material: BodyMaterial,
    shared: bool,
    dirty: DirtyFlags,
}

impl BodyState {
    fn from_def(def: &BodyDef) -> Self {
        Self {
            body_type: def.body_type,
            position: def.position,
            angle: def.angle,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            flags: def.flags,
            material: def.material,
            shared: false,
            dirty: DirtyFlags::default(),
        }
    }
}

/// Slab-allocated kinematic simulator.
#[derive(Debug, Default)]
pub struct TestbedSimulator {
    bodies: Vec<Option<BodyState>>,
    free: Vec<u32>,
    live: usize,
}

impl TestbedSimulator {
    /// Creates an empty simulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn body(&self, handle: BodyHandle) -> &BodyState {
        self.bodies
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .expect("stale body handle")
    }

    fn body_mut(&mut self, handle: BodyHandle) -> &mut BodyState {
        self.bodies
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .expect("stale body handle")
    }
}

impl Simulator for TestbedSimulator {
    fn step(&mut self, dt: f32, _velocity_iterations: u32, _position_iterations: u32) {
        for body in self.bodies.iter_mut().flatten() {
            if body.body_type == BodyType::Static || !body.flags.enabled || !body.flags.awake {
                continue;
            }
            body.position = body.position + body.linear_velocity * dt;
            if !body.flags.fixed_rotation {
                body.angle += body.angular_velocity * dt;
            }
        }
    }

    fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        self.live += 1;
        let state = BodyState::from_def(def);
        if let Some(slot) = self.free.pop() {
            self.bodies[slot as usize] = Some(state);
            BodyHandle(slot)
        } else {
            self.bodies.push(Some(state));
            BodyHandle((self.bodies.len() - 1) as u32)
        }
    }

    fn destroy_body(&mut self, handle: BodyHandle) {
        if let Some(slot) = self.bodies.get_mut(handle.0 as usize) {
            if slot.take().is_some() {
                self.free.push(handle.0);
                self.live -= 1;
            }
        }
    }

    fn body_count(&self) -> usize {
        self.live
    }

    fn position(&self, handle: BodyHandle) -> Vec2 {
        self.body(handle).position
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec2) {
        let body = self.body_mut(handle);
        body.position = position;
        if body.shared {
            body.dirty.position = true;
        }
    }

    fn angle(&self, handle: BodyHandle) -> f32 {
        self.body(handle).angle
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) {
        let body = self.body_mut(handle);
        body.angle = angle;
        if body.shared {
            body.dirty.angle = true;
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Vec2 {
        self.body(handle).linear_velocity
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2) {
        let body = self.body_mut(handle);
        body.linear_velocity = velocity;
        if body.shared {
            body.dirty.velocity = true;
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> f32 {
        self.body(handle).angular_velocity
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: f32) {
        let body = self.body_mut(handle);
        body.angular_velocity = velocity;
        if body.shared {
            body.dirty.angular_velocity = true;
        }
    }

    fn body_type(&self, handle: BodyHandle) -> BodyType {
        self.body(handle).body_type
    }

    fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) {
        let body = self.body_mut(handle);
        body.body_type = body_type;
        if body.shared {
            body.dirty.body_type = true;
        }
    }

    fn flags(&self, handle: BodyHandle) -> BodyFlags {
        self.body(handle).flags
    }

    fn set_flags(&mut self, handle: BodyHandle, flags: BodyFlags) {
        let body = self.body_mut(handle);
        if body.flags != flags {
            body.flags = flags;
            if body.shared {
                body.dirty.flags = true;
            }
        }
    }

    fn material(&self, handle: BodyHandle) -> BodyMaterial {
        self.body(handle).material
    }

    fn set_material(&mut self, handle: BodyHandle, material: BodyMaterial) {
        let body = self.body_mut(handle);
        if body.material != material {
            body.material = material;
            if body.shared {
                body.dirty.material = true;
            }
        }
    }

    fn is_shared(&self, handle: BodyHandle) -> bool {
        self.body(handle).shared
    }

    fn set_shared(&mut self, handle: BodyHandle, shared: bool) {
        self.body_mut(handle).shared = shared;
    }

    fn dirty(&self, handle: BodyHandle) -> DirtyFlags {
        self.body(handle).dirty
    }

    fn clear_sharing_dirty_bits(&mut self, handle: BodyHandle) {
        self.body_mut(handle).dirty = DirtyFlags::default();
    }
}

/// Reference factory producing dynamic circles.
///
/// Parameter layout: `x:f32 y:f32 radius:f32`, network byte order.
#[derive(Clone, Copy, Debug, Default)]
pub struct CircleFactory;

impl CircleFactory {
    /// Serializes factory parameters for a circle at `position`.
    #[must_use]
    pub fn params(position: Vec2, radius: f32) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_f32(position.x);
        writer.write_f32(position.y);
        writer.write_f32(radius);
        writer.into_vec()
    }
}

impl BodyFactory for CircleFactory {
    fn construct(&self, params: &[u8]) -> (BodyDef, Option<SceneDescriptor>) {
        let mut reader = ByteReader::new(params);
        let position = Vec2::new(reader.read_f32(), reader.read_f32());
        let radius = reader.read_f32();
        let def = BodyDef {
            body_type: BodyType::Dynamic,
            position,
            ..BodyDef::default()
        };
        let scene = SceneDescriptor {
            texture: "circle".to_string(),
            size: Vec2::new(radius * 2.0, radius * 2.0),
        };
        (def, Some(scene))
    }
}
