//! # Replication Engine
//!
//! Keeps a shared set of rigid bodies bit-close-to-consistent across peers.
//! Three concerns, all driven from the fixed-update tick:
//!
//! - **Publishing**: property groups mutated locally since the last tick
//!   (per the simulator's dirty bits) go out as single-body deltas
//! - **Snapshotting**: bulk pose/velocity syncs in three modes, from
//!   forced full resync down to bandwidth-capped priority sync
//! - **Reconciling**: incoming snapshots become interpolation targets that
//!   drive local bodies toward authoritative state over a bounded number
//!   of ticks, never as hard snaps
//!
//! While the engine writes reconciled values it clears the body's `shared`
//! flag and restores it afterwards, so its own writes are never
//! re-published.

pub mod interpolation;
pub mod ownership;
pub mod registry;

pub use interpolation::{InterpolationMode, InterpolationTarget};
pub use ownership::{OwnershipLedger, PERMANENT_LEASE};
pub use registry::BodyRegistry;

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use ember_core::{BodyHandle, Rect, SceneDescriptor, Vec2};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::integration::{BodyFactory, SceneLink, Simulator};
use crate::protocol::{
    BodyId, BodySnapshot, EventPayload, FactoryId, PhysObjEvent, PhysSyncEvent,
};

use interpolation::{bezier, converge, hermite, pid_velocity, step_count, CONTROL_POINT_SCALE};

/// Which bodies a snapshot includes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Every shared body in the registry; forced resync after a suspected
    /// desync.
    OverrideFullSync,
    /// Every shared body this peer currently owns; the periodic host
    /// authoritative update.
    FullSync,
    /// The fastest-moving bodies plus a rolling window over the registry;
    /// bandwidth-capped high-frequency sync.
    PrioritySync,
}

/// Counters describing reconciliation activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Interpolation targets adopted.
    pub interpolations_started: u64,
    /// Targets that ran to completion and snapped exactly.
    pub interpolations_snapped: u64,
    /// Total convergence steps scheduled.
    pub steps_scheduled: u64,
}

/// The physics replication engine.
///
/// Owns the simulator for the duration of the session and every piece of
/// replication state: the id/handle registry, the ownership ledger, and
/// the interpolation cache. Built-in events it produces are staged
/// internally and drained by the session layer each tick.
pub struct ReplicationEngine<S: Simulator> {
    simulator: S,
    registry: BodyRegistry,
    ownership: OwnershipLedger,
    cache: HashMap<BodyId, InterpolationTarget>,
    config: SyncConfig,
    out_events: Vec<EventPayload>,
    scene: Option<Box<dyn SceneLink>>,
    linked: HashSet<BodyHandle>,
    rotation_cursor: usize,
    stats: ReplicationStats,
    is_host: bool,
}

impl<S: Simulator> ReplicationEngine<S> {
    /// Creates an engine for a peer with an assigned short-UID.
    ///
    /// `short_uid` may be zero only for peers that exclusively create
    /// world-init bodies before the handshake completes.
    #[must_use]
    pub fn new(simulator: S, short_uid: u32, is_host: bool, bounds: Rect, config: SyncConfig) -> Self {
        Self {
            simulator,
            registry: BodyRegistry::new(short_uid, bounds),
            ownership: OwnershipLedger::new(),
            cache: HashMap::new(),
            config,
            out_events: Vec::new(),
            scene: None,
            linked: HashSet::new(),
            rotation_cursor: 0,
            stats: ReplicationStats::default(),
            is_host,
        }
    }

    /// Registers the receiver for scene-graph attachment callbacks.
    pub fn set_scene_link(&mut self, scene: Box<dyn SceneLink>) {
        self.scene = Some(scene);
    }

    /// Attaches a body factory and returns its id.
    pub fn attach_factory(&mut self, factory: Box<dyn BodyFactory>) -> FactoryId {
        self.registry.attach_factory(factory)
    }

    /// Returns the simulator.
    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Returns the simulator mutably. The application steps it from here.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.simulator
    }

    /// Returns the body registry.
    #[must_use]
    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    /// Returns the remaining ticks of a local lease, if one is held.
    #[must_use]
    pub fn lease_remaining(&self, id: BodyId) -> Option<u64> {
        self.ownership.remaining(id)
    }

    /// Returns true if this peer holds a lease for the body.
    #[must_use]
    pub fn is_owned(&self, id: BodyId) -> bool {
        self.ownership.contains(id)
    }

    /// Returns true if the body has a cached interpolation target.
    #[must_use]
    pub fn is_interpolating(&self, id: BodyId) -> bool {
        self.cache.contains_key(&id)
    }

    /// Returns reconciliation counters.
    #[must_use]
    pub const fn stats(&self) -> ReplicationStats {
        self.stats
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Hands the staged built-in events to the caller, clearing the stage.
    pub fn drain_out_events(&mut self) -> Vec<EventPayload> {
        std::mem::take(&mut self.out_events)
    }

    /// Clears reconciliation state without touching the simulator.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.out_events.clear();
        self.rotation_cursor = 0;
        self.stats = ReplicationStats::default();
    }

    /// Creates a shared body from factory parameters and broadcasts its
    /// creation.
    ///
    /// On the host the new body starts under a permanent lease.
    pub fn add_shared_body(
        &mut self,
        factory: FactoryId,
        params: &[u8],
    ) -> SyncResult<(BodyId, BodyHandle)> {
        let (def, scene) = match self.registry.factory(factory) {
            Some(f) => f.construct(params),
            None => return Err(crate::error::SyncError::UnknownFactory(factory.0)),
        };
        self.registry.check_bounds(def.position)?;
        let id = self.registry.allocate_id();
        let handle = self.insert_body(id, &def, scene);
        self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Create {
            id,
            factory,
            params: params.to_vec(),
        }));
        Ok((id, handle))
    }

    /// Creates a world-init shared body under the reserved originator.
    ///
    /// No creation event is emitted: every peer is expected to create the
    /// same init bodies in the same order before the session starts, and
    /// the shared sequence numbers keep their identifiers aligned.
    pub fn add_init_body(
        &mut self,
        factory: FactoryId,
        params: &[u8],
    ) -> SyncResult<(BodyId, BodyHandle)> {
        let (def, scene) = match self.registry.factory(factory) {
            Some(f) => f.construct(params),
            None => return Err(crate::error::SyncError::UnknownFactory(factory.0)),
        };
        self.registry.check_bounds(def.position)?;
        let id = self.registry.allocate_init_id();
        let handle = self.insert_body(id, &def, scene);
        Ok((id, handle))
    }

    /// Destroys a shared body and broadcasts its deletion.
    ///
    /// Returns false if the id is not registered.
    pub fn remove_shared_body(&mut self, id: BodyId) -> bool {
        let Some(handle) = self.registry.remove(id) else {
            return false;
        };
        self.out_events
            .push(EventPayload::PhysObj(PhysObjEvent::Delete { id }));
        self.drop_body_state(id, handle);
        true
    }

    /// Declares authority over a body for `duration` ticks (`0` is
    /// permanent) and broadcasts the claim.
    pub fn acquire(&mut self, id: BodyId, duration: u64) {
        if !self.registry.contains(id) {
            return;
        }
        self.ownership.insert(id, duration);
        self.out_events
            .push(EventPayload::PhysObj(PhysObjEvent::AcquireOwnership {
                id,
                duration,
            }));
    }

    /// Returns authority over a body to the host and broadcasts the
    /// release. The host ignores releases of bodies it holds permanently.
    pub fn release(&mut self, id: BodyId) {
        if self.is_host || !self.registry.contains(id) {
            return;
        }
        self.ownership.remove(id);
        self.out_events
            .push(EventPayload::PhysObj(PhysObjEvent::ReleaseOwnership { id }));
    }

    /// Claims every registered body locally without emitting events.
    ///
    /// Used at world init on the peer that creates the seed bodies.
    pub fn own_all(&mut self) {
        for id in self.registry.ids().to_vec() {
            self.ownership.insert(id, PERMANENT_LEASE);
        }
    }

    /// Publishes one delta per dirty property group of each shared body,
    /// then clears the dirty bits.
    pub fn pack_deltas(&mut self) {
        for id in self.registry.ids().to_vec() {
            let Some(handle) = self.registry.handle_of(id) else {
                continue;
            };
            if !self.simulator.is_shared(handle) {
                continue;
            }
            let dirty = self.simulator.dirty(handle);
            if dirty.position {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Position {
                    id,
                    position: self.simulator.position(handle),
                }));
            }
            if dirty.angle {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Angle {
                    id,
                    angle: self.simulator.angle(handle),
                }));
            }
            if dirty.velocity {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Velocity {
                    id,
                    velocity: self.simulator.linear_velocity(handle),
                }));
            }
            if dirty.angular_velocity {
                self.out_events
                    .push(EventPayload::PhysObj(PhysObjEvent::AngularVelocity {
                        id,
                        angular_velocity: self.simulator.angular_velocity(handle),
                    }));
            }
            if dirty.body_type {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::BodyType {
                    id,
                    body_type: self.simulator.body_type(handle),
                }));
            }
            if dirty.flags {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Flags {
                    id,
                    flags: self.simulator.flags(handle),
                }));
            }
            if dirty.material {
                self.out_events.push(EventPayload::PhysObj(PhysObjEvent::Material {
                    id,
                    material: self.simulator.material(handle),
                }));
            }
            self.simulator.clear_sharing_dirty_bits(handle);
        }
    }

    /// Packs a snapshot of the selected bodies into one sync event.
    ///
    /// Callable by the application beyond the automatic host cadence, e.g.
    /// an override full sync when a desync is suspected.
    pub fn pack_snapshot(&mut self, mode: SyncMode) {
        let mut event = PhysSyncEvent::new();
        match mode {
            SyncMode::OverrideFullSync => {
                for id in self.registry.ids().to_vec() {
                    self.add_snapshot_if_shared(&mut event, id);
                }
            }
            SyncMode::FullSync => {
                for id in self.registry.ids().to_vec() {
                    if self.ownership.contains(id) {
                        self.add_snapshot_if_shared(&mut event, id);
                    }
                }
            }
            SyncMode::PrioritySync => {
                let mut by_speed: Vec<(BodyId, f32)> = Vec::new();
                for id in self.registry.ids() {
                    if let Some(handle) = self.registry.handle_of(*id) {
                        if self.simulator.is_shared(handle) {
                            let speed = self.simulator.linear_velocity(handle).length();
                            by_speed.push((*id, speed));
                        }
                    }
                }
                by_speed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

                for (id, _) in by_speed.iter().take(self.config.priority_cap) {
                    self.add_snapshot_if_shared(&mut event, *id);
                }

                // Rolling window: every call covers the next stretch of the
                // registry so slow bodies still refresh eventually.
                let order = self.registry.ids().to_vec();
                if !order.is_empty() {
                    let window = self.config.rotation_window.min(order.len());
                    for offset in 0..window {
                        let id = order[(self.rotation_cursor + offset) % order.len()];
                        self.add_snapshot_if_shared(&mut event, id);
                    }
                    self.rotation_cursor = (self.rotation_cursor + 1) % order.len();
                }
            }
        }
        if !event.is_empty() {
            self.out_events.push(EventPayload::PhysSync(event));
        }
    }

    /// Applies a received single-body delta.
    ///
    /// Deltas naming unknown body ids are skipped; that is the normal case
    /// for bodies deleted mid-flight.
    pub fn process_obj(&mut self, event: &PhysObjEvent) {
        match event {
            PhysObjEvent::Create { id, factory, params } => {
                let constructed = match self.registry.factory(*factory) {
                    Some(f) => f.construct(params),
                    None => {
                        warn!(factory = factory.0, "remote creation names an unattached factory");
                        return;
                    }
                };
                let (def, scene) = constructed;
                if self.registry.check_bounds(def.position).is_err() {
                    warn!(?id, "remote creation outside world bounds");
                    return;
                }
                self.insert_body(*id, &def, scene);
            }
            PhysObjEvent::Delete { id } => {
                let Some(handle) = self.registry.remove(*id) else {
                    return;
                };
                self.drop_body_state(*id, handle);
            }
            PhysObjEvent::AcquireOwnership { id, .. } => {
                // A remote claim displaces whatever lease is held locally.
                self.ownership.remove(*id);
            }
            PhysObjEvent::ReleaseOwnership { id } => {
                if self.is_host && self.registry.contains(*id) {
                    self.ownership.insert(*id, PERMANENT_LEASE);
                }
            }
            delta => {
                let Some(handle) = self.registry.handle_of(delta.id()) else {
                    return;
                };
                self.simulator.set_shared(handle, false);
                match delta {
                    PhysObjEvent::BodyType { body_type, .. } => {
                        self.simulator.set_body_type(handle, *body_type);
                    }
                    PhysObjEvent::Position { position, .. } => {
                        self.simulator.set_position(handle, *position);
                    }
                    PhysObjEvent::Velocity { velocity, .. } => {
                        self.simulator.set_linear_velocity(handle, *velocity);
                    }
                    PhysObjEvent::Angle { angle, .. } => {
                        self.simulator.set_angle(handle, *angle);
                    }
                    PhysObjEvent::AngularVelocity {
                        angular_velocity, ..
                    } => {
                        self.simulator.set_angular_velocity(handle, *angular_velocity);
                    }
                    PhysObjEvent::Flags { flags, .. } => {
                        self.simulator.set_flags(handle, *flags);
                    }
                    PhysObjEvent::Material { material, .. } => {
                        self.simulator.set_material(handle, *material);
                    }
                    _ => {}
                }
                self.simulator.set_shared(handle, true);
            }
        }
    }

    /// Reconciles a received bulk snapshot into interpolation targets.
    pub fn process_sync(&mut self, event: &PhysSyncEvent) {
        for snap in event.snapshots() {
            let Some(handle) = self.registry.handle_of(snap.id) else {
                continue;
            };
            let position = self.simulator.position(handle);
            let velocity = self.simulator.linear_velocity(handle);
            let angle = self.simulator.angle(handle);

            let steps = step_count(
                position.distance(snap.position),
                angle - snap.angle,
                self.config.max_interpolation_steps,
            );
            let target = InterpolationTarget::new(
                steps,
                position,
                velocity,
                snap.position,
                snap.linear_velocity,
                snap.angle,
                snap.angular_velocity,
            );
            self.adopt_target(snap.id, handle, target);
        }
    }

    /// Runs one replication tick: publish dirty deltas, step ownership
    /// leases, advance cached interpolations.
    ///
    /// The session layer drains the staged events afterwards.
    pub fn fixed_update(&mut self) {
        self.pack_deltas();

        for id in self.ownership.tick() {
            if self.is_host {
                // A timed lease on the host reverts to the implicit
                // permanent one instead of being released.
                self.ownership.insert(id, PERMANENT_LEASE);
            } else {
                self.release(id);
            }
        }

        self.advance_interpolations();
    }

    fn insert_body(
        &mut self,
        id: BodyId,
        def: &ember_core::BodyDef,
        scene: Option<SceneDescriptor>,
    ) -> BodyHandle {
        let handle = self.simulator.create_body(def);
        self.simulator.set_shared(handle, true);
        self.registry.insert(id, handle);
        if self.is_host {
            self.ownership.insert(id, PERMANENT_LEASE);
        }
        if let (Some(link), Some(descriptor)) = (self.scene.as_mut(), scene) {
            link.link(handle, descriptor);
            self.linked.insert(handle);
        }
        handle
    }

    fn drop_body_state(&mut self, id: BodyId, handle: BodyHandle) {
        self.cache.remove(&id);
        self.ownership.remove(id);
        if self.linked.remove(&handle) {
            if let Some(link) = self.scene.as_mut() {
                link.unlink(handle);
            }
        }
        self.simulator.destroy_body(handle);
    }

    fn add_snapshot_if_shared(&self, event: &mut PhysSyncEvent, id: BodyId) {
        let Some(handle) = self.registry.handle_of(id) else {
            return;
        };
        if !self.simulator.is_shared(handle) {
            return;
        }
        event.add(BodySnapshot {
            id,
            position: self.simulator.position(handle),
            linear_velocity: self.simulator.linear_velocity(handle),
            angle: self.simulator.angle(handle),
            angular_velocity: self.simulator.angular_velocity(handle),
        });
    }

    fn adopt_target(&mut self, id: BodyId, handle: BodyHandle, mut target: InterpolationTarget) {
        if let Some(old) = self.cache.get(&id) {
            // The superseded target's velocities become the starting point,
            // and its integral state carries over.
            target.integral = old.integral;
            target.integral_count = old.integral_count;
            let old_velocity = old.target_velocity;
            let old_angular = old.target_angular_velocity;
            self.simulator.set_shared(handle, false);
            self.simulator.set_linear_velocity(handle, old_velocity);
            self.simulator.set_angular_velocity(handle, old_angular);
            self.simulator.set_shared(handle, true);
        }
        self.stats.interpolations_started += 1;
        self.stats.steps_scheduled += u64::from(target.total_steps);
        self.cache.insert(id, target);
    }

    fn advance_interpolations(&mut self) {
        let ids: Vec<BodyId> = self.cache.keys().copied().collect();
        let mut evict = Vec::new();

        for id in ids {
            let Some(handle) = self.registry.handle_of(id) else {
                evict.push(id);
                continue;
            };
            if !self.simulator.is_shared(handle) {
                evict.push(id);
                continue;
            }
            let Some(mut target) = self.cache.get(&id).copied() else {
                continue;
            };

            let steps_left = target.steps_left();
            self.simulator.set_shared(handle, false);
            if steps_left <= 1 {
                self.simulator.set_position(handle, target.target_position);
                self.simulator.set_linear_velocity(handle, target.target_velocity);
                self.simulator.set_angle(handle, target.target_angle);
                self.simulator
                    .set_angular_velocity(handle, target.target_angular_velocity);
                self.stats.interpolations_snapped += 1;
                evict.push(id);
            } else {
                let position = self.simulator.position(handle);
                let velocity = self.simulator.linear_velocity(handle);
                let t = target.current_step as f32 / target.total_steps as f32;

                match self.config.interpolation_mode {
                    InterpolationMode::Linear => {
                        self.simulator.set_position(
                            handle,
                            Vec2::new(
                                converge(steps_left, target.target_position.x, position.x),
                                converge(steps_left, target.target_position.y, position.y),
                            ),
                        );
                        self.simulator.set_linear_velocity(
                            handle,
                            Vec2::new(
                                converge(steps_left, target.target_velocity.x, velocity.x),
                                converge(steps_left, target.target_velocity.y, velocity.y),
                            ),
                        );
                    }
                    InterpolationMode::Bezier => {
                        let control1 = position + velocity / CONTROL_POINT_SCALE;
                        self.simulator.set_position(
                            handle,
                            bezier(t, position, control1, target.control2, target.target_position),
                        );
                    }
                    InterpolationMode::Hermite => {
                        self.simulator.set_position(
                            handle,
                            hermite(
                                t,
                                position,
                                velocity,
                                target.target_position,
                                target.target_velocity,
                            ),
                        );
                    }
                    InterpolationMode::Pid => {
                        let adjusted = pid_velocity(&mut target, position, velocity);
                        self.simulator.set_linear_velocity(handle, adjusted);
                    }
                }

                let angle = self.simulator.angle(handle);
                let angular = self.simulator.angular_velocity(handle);
                self.simulator
                    .set_angle(handle, converge(steps_left, target.target_angle, angle));
                self.simulator.set_angular_velocity(
                    handle,
                    converge(steps_left, target.target_angular_velocity, angular),
                );

                target.current_step += 1;
                self.cache.insert(id, target);
            }
            self.simulator.set_shared(handle, true);
        }

        for id in &evict {
            self.cache.remove(id);
        }
        if !evict.is_empty() {
            debug!(completed = evict.len(), active = self.cache.len(), "interpolations finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{CircleFactory, TestbedSimulator};

    const BOUNDS: Rect = Rect::new(-100.0, -100.0, 200.0, 200.0);

    fn engine(short_uid: u32, is_host: bool) -> (ReplicationEngine<TestbedSimulator>, FactoryId) {
        let mut engine = ReplicationEngine::new(
            TestbedSimulator::new(),
            short_uid,
            is_host,
            BOUNDS,
            SyncConfig::default(),
        );
        let factory = engine.attach_factory(Box::new(CircleFactory));
        (engine, factory)
    }

    fn phys_obj_events(events: Vec<EventPayload>) -> Vec<PhysObjEvent> {
        events
            .into_iter()
            .filter_map(|payload| match payload {
                EventPayload::PhysObj(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_local_create_emits_creation_and_owns_on_host() {
        let (mut host, factory) = engine(1, true);
        let params = CircleFactory::params(Vec2::new(1.0, 2.0), 0.5);
        let (id, handle) = host.add_shared_body(factory, &params).expect("in bounds");

        assert_eq!(id, BodyId::compose(1, 0));
        assert!(host.simulator().is_shared(handle));
        assert_eq!(host.lease_remaining(id), Some(PERMANENT_LEASE));

        let events = phys_obj_events(host.drain_out_events());
        assert_eq!(
            events,
            vec![PhysObjEvent::Create {
                id,
                factory,
                params
            }]
        );
    }

    #[test]
    fn test_remote_create_mirrors_without_event() {
        let (mut host, factory) = engine(1, true);
        let (mut client, _) = engine(2, false);

        let params = CircleFactory::params(Vec2::new(3.0, 4.0), 1.0);
        let (id, _) = host.add_shared_body(factory, &params).expect("in bounds");

        for event in phys_obj_events(host.drain_out_events()) {
            client.process_obj(&event);
        }

        let handle = client.registry().handle_of(id).expect("mirrored");
        assert_eq!(client.simulator().position(handle), Vec2::new(3.0, 4.0));
        assert_eq!(client.registry().len(), client.simulator().body_count());
        assert!(!client.is_owned(id));
        assert!(client.drain_out_events().is_empty());
    }

    #[test]
    fn test_create_out_of_bounds_rejected() {
        let (mut host, factory) = engine(1, true);
        let params = CircleFactory::params(Vec2::new(1000.0, 0.0), 0.5);
        assert!(host.add_shared_body(factory, &params).is_err());
        assert_eq!(host.registry().len(), 0);
        assert!(host.drain_out_events().is_empty());
    }

    #[test]
    fn test_delete_round_trip_cleans_everything() {
        let (mut host, factory) = engine(1, true);
        let (mut client, _) = engine(2, false);

        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, _) = host.add_shared_body(factory, &params).expect("in bounds");
        for event in phys_obj_events(host.drain_out_events()) {
            client.process_obj(&event);
        }

        assert!(host.remove_shared_body(id));
        for event in phys_obj_events(host.drain_out_events()) {
            client.process_obj(&event);
        }

        for engine in [&host, &client] {
            assert_eq!(engine.registry().len(), 0);
            assert_eq!(engine.simulator().body_count(), 0);
            assert!(!engine.is_interpolating(id));
        }
    }

    #[test]
    fn test_dirty_bits_published_once_then_cleared() {
        let (mut host, factory) = engine(1, true);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, handle) = host.add_shared_body(factory, &params).expect("in bounds");
        host.drain_out_events();

        host.simulator_mut()
            .set_position(handle, Vec2::new(5.0, 0.0));
        host.simulator_mut().set_angular_velocity(handle, 2.0);

        host.pack_deltas();
        let events = phys_obj_events(host.drain_out_events());
        assert_eq!(
            events,
            vec![
                PhysObjEvent::Position {
                    id,
                    position: Vec2::new(5.0, 0.0)
                },
                PhysObjEvent::AngularVelocity {
                    id,
                    angular_velocity: 2.0
                },
            ]
        );

        // No residue on the next tick.
        host.pack_deltas();
        assert!(phys_obj_events(host.drain_out_events()).is_empty());
    }

    #[test]
    fn test_remote_writes_are_not_republished() {
        let (mut client, factory) = engine(2, false);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, handle) = client.add_shared_body(factory, &params).expect("in bounds");
        client.drain_out_events();

        client.process_obj(&PhysObjEvent::Position {
            id,
            position: Vec2::new(9.0, 9.0),
        });
        assert_eq!(client.simulator().position(handle), Vec2::new(9.0, 9.0));
        assert!(client.simulator().is_shared(handle));

        client.pack_deltas();
        assert!(phys_obj_events(client.drain_out_events()).is_empty());
    }

    #[test]
    fn test_unknown_id_deltas_and_snapshots_skipped() {
        let (mut client, factory) = engine(2, false);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (known, handle) = client.add_shared_body(factory, &params).expect("in bounds");
        client.drain_out_events();

        client.process_obj(&PhysObjEvent::Velocity {
            id: BodyId(0xDEAD),
            velocity: Vec2::new(1.0, 1.0),
        });
        assert_eq!(client.simulator().linear_velocity(handle), Vec2::ZERO);

        let mut sync = PhysSyncEvent::new();
        sync.add(BodySnapshot {
            id: known,
            position: Vec2::new(1.0, 0.0),
            linear_velocity: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
        });
        sync.add(BodySnapshot {
            id: BodyId(0xBEEF),
            position: Vec2::new(2.0, 0.0),
            linear_velocity: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
        });
        client.process_sync(&sync);

        assert!(client.is_interpolating(known));
        assert!(!client.is_interpolating(BodyId(0xBEEF)));
    }

    #[test]
    fn test_interpolation_clamps_and_snaps_exactly() {
        let (mut client, factory) = engine(2, false);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, handle) = client.add_shared_body(factory, &params).expect("in bounds");
        client.drain_out_events();

        let mut sync = PhysSyncEvent::new();
        sync.add(BodySnapshot {
            id,
            position: Vec2::new(10.0, 0.0),
            linear_velocity: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
        });
        client.process_sync(&sync);

        // d = 10 wants 300 steps, clamped to 30.
        for tick in 1..30 {
            client.fixed_update();
            let error = client
                .simulator()
                .position(handle)
                .distance(Vec2::new(10.0, 0.0));
            assert!(error > 0.0, "error collapsed early at tick {tick}");
            assert!(client.is_interpolating(id));
        }

        client.fixed_update();
        assert_eq!(client.simulator().position(handle), Vec2::new(10.0, 0.0));
        assert!(!client.is_interpolating(id));
        assert_eq!(client.stats().interpolations_snapped, 1);
    }

    #[test]
    fn test_replacing_target_preserves_integral() {
        let (mut client, factory) = engine(2, false);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, _) = client.add_shared_body(factory, &params).expect("in bounds");
        client.drain_out_events();

        let snapshot = |x: f32| {
            let mut sync = PhysSyncEvent::new();
            sync.add(BodySnapshot {
                id,
                position: Vec2::new(x, 0.0),
                linear_velocity: Vec2::ZERO,
                angle: 0.0,
                angular_velocity: 0.0,
            });
            sync
        };

        client.process_sync(&snapshot(4.0));
        // Accumulate some PID state, then adopt a replacement target.
        {
            let target = client.cache.get_mut(&id).expect("cached");
            target.integral = Vec2::new(0.5, 0.0);
            target.integral_count = 3;
        }
        client.process_sync(&snapshot(8.0));

        let target = client.cache.get(&id).expect("still cached");
        assert_eq!(target.integral, Vec2::new(0.5, 0.0));
        assert_eq!(target.integral_count, 3);
        assert_eq!(target.target_position, Vec2::new(8.0, 0.0));
        assert_eq!(target.current_step, 0);
        assert_eq!(client.stats().interpolations_started, 2);
    }

    #[test]
    fn test_lease_expiry_releases_and_notifies() {
        let (mut host, factory) = engine(1, true);
        let (mut client, _) = engine(2, false);

        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, _) = host.add_shared_body(factory, &params).expect("in bounds");
        for event in phys_obj_events(host.drain_out_events()) {
            client.process_obj(&event);
        }

        client.acquire(id, 5);
        for event in phys_obj_events(client.drain_out_events()) {
            host.process_obj(&event);
        }
        // The claim displaced the host's permanent lease.
        assert!(!host.is_owned(id));

        // 5 → 4 → 3 → 2 → 1 over four ticks, release on the fifth.
        for expected in [4u64, 3, 2, 1] {
            client.fixed_update();
            assert_eq!(client.lease_remaining(id), Some(expected));
        }
        client.fixed_update();
        assert!(!client.is_owned(id));

        let release = phys_obj_events(client.drain_out_events());
        assert_eq!(release, vec![PhysObjEvent::ReleaseOwnership { id }]);

        host.process_obj(&release[0]);
        assert_eq!(host.lease_remaining(id), Some(PERMANENT_LEASE));
    }

    #[test]
    fn test_host_timed_lease_reverts_to_permanent() {
        let (mut host, factory) = engine(1, true);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, _) = host.add_shared_body(factory, &params).expect("in bounds");
        host.drain_out_events();

        host.acquire(id, 2);
        host.fixed_update();
        host.fixed_update();
        assert_eq!(host.lease_remaining(id), Some(PERMANENT_LEASE));
        assert!(phys_obj_events(host.drain_out_events()).is_empty());
    }

    #[test]
    fn test_full_sync_covers_only_owned_bodies() {
        let (mut host, factory) = engine(1, true);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (owned, _) = host.add_shared_body(factory, &params).expect("in bounds");
        let (leased_out, _) = host.add_shared_body(factory, &params).expect("in bounds");
        host.drain_out_events();

        // A remote peer claimed the second body.
        host.process_obj(&PhysObjEvent::AcquireOwnership {
            id: leased_out,
            duration: 0,
        });

        host.pack_snapshot(SyncMode::FullSync);
        let events = host.drain_out_events();
        let EventPayload::PhysSync(sync) = &events[0] else {
            panic!("expected a sync event");
        };
        let ids: Vec<BodyId> = sync.snapshots().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![owned]);

        host.pack_snapshot(SyncMode::OverrideFullSync);
        let events = host.drain_out_events();
        let EventPayload::PhysSync(sync) = &events[0] else {
            panic!("expected a sync event");
        };
        assert_eq!(sync.snapshots().len(), 2);
    }

    #[test]
    fn test_priority_sync_prefers_fast_bodies() {
        let (mut host, factory) = engine(1, true);
        let config = SyncConfig {
            priority_cap: 2,
            rotation_window: 1,
            ..SyncConfig::default()
        };
        host.config = config;

        let mut ids = Vec::new();
        for i in 0..6u32 {
            let params = CircleFactory::params(Vec2::new(i as f32, 0.0), 0.5);
            let (id, handle) = host.add_shared_body(factory, &params).expect("in bounds");
            host.simulator_mut()
                .set_linear_velocity(handle, Vec2::new(i as f32, 0.0));
            ids.push(id);
        }
        host.drain_out_events();
        // Velocity writes above were local mutations; flush their deltas.
        host.pack_deltas();
        host.drain_out_events();

        host.pack_snapshot(SyncMode::PrioritySync);
        let events = host.drain_out_events();
        let EventPayload::PhysSync(sync) = &events[0] else {
            panic!("expected a sync event");
        };
        let snap_ids: Vec<BodyId> = sync.snapshots().iter().map(|s| s.id).collect();

        // Two fastest bodies plus the window entry at the cursor.
        assert_eq!(snap_ids, vec![ids[5], ids[4], ids[0]]);

        // The window advances one position per call.
        host.pack_snapshot(SyncMode::PrioritySync);
        let events = host.drain_out_events();
        let EventPayload::PhysSync(sync) = &events[0] else {
            panic!("expected a sync event");
        };
        let snap_ids: Vec<BodyId> = sync.snapshots().iter().map(|s| s.id).collect();
        assert_eq!(snap_ids, vec![ids[5], ids[4], ids[1]]);
    }

    #[derive(Clone, Default)]
    struct RecordingScene {
        log: std::sync::Arc<parking_lot::Mutex<Vec<(u32, bool)>>>,
    }

    impl SceneLink for RecordingScene {
        fn link(&mut self, handle: BodyHandle, _descriptor: SceneDescriptor) {
            self.log.lock().push((handle.0, true));
        }

        fn unlink(&mut self, handle: BodyHandle) {
            self.log.lock().push((handle.0, false));
        }
    }

    #[test]
    fn test_scene_link_fires_on_create_and_delete() {
        let (mut host, factory) = engine(1, true);
        let scene = RecordingScene::default();
        host.set_scene_link(Box::new(scene.clone()));

        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, handle) = host.add_shared_body(factory, &params).expect("in bounds");
        assert_eq!(*scene.log.lock(), vec![(handle.0, true)]);

        host.remove_shared_body(id);
        assert_eq!(*scene.log.lock(), vec![(handle.0, true), (handle.0, false)]);
    }

    #[test]
    fn test_own_all_claims_silently() {
        let (mut client, factory) = engine(0, false);
        let params = CircleFactory::params(Vec2::ZERO, 0.5);
        let (id, _) = client.add_init_body(factory, &params).expect("in bounds");

        assert!(id.is_world_init());
        assert!(client.drain_out_events().is_empty());

        client.own_all();
        assert!(client.is_owned(id));
        assert!(client.drain_out_events().is_empty());
    }
}
