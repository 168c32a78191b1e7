//! # Body Registry
//!
//! Bidirectional mapping between 64-bit global body identifiers and local
//! simulator handles, the ordered factory table used to reconstruct bodies
//! from serialized parameters, and the id allocator.
//!
//! The two maps are mutual inverses at all times; a violation means an
//! internal caller double-inserted and is treated as a bug.

use std::collections::HashMap;

use ember_core::{BodyHandle, Rect, Vec2};

use crate::error::{SyncError, SyncResult};
use crate::integration::BodyFactory;
use crate::protocol::{BodyId, FactoryId};

/// Identifier and factory bookkeeping for shared bodies.
pub struct BodyRegistry {
    id_to_handle: HashMap<BodyId, BodyHandle>,
    handle_to_id: HashMap<BodyHandle, BodyId>,
    /// Insertion order, which the rolling sync window walks.
    order: Vec<BodyId>,
    factories: Vec<Box<dyn BodyFactory>>,
    bounds: Rect,
    short_uid: u32,
    next_sequence: u32,
    next_init_sequence: u32,
}

impl BodyRegistry {
    /// Creates an empty registry for a peer with the given short-UID and
    /// world bounds.
    #[must_use]
    pub fn new(short_uid: u32, bounds: Rect) -> Self {
        Self {
            id_to_handle: HashMap::new(),
            handle_to_id: HashMap::new(),
            order: Vec::new(),
            factories: Vec::new(),
            bounds,
            short_uid,
            next_sequence: 0,
            next_init_sequence: 0,
        }
    }

    /// Attaches a body factory and returns its ascending id.
    ///
    /// Every peer must attach the same factories in the same order.
    pub fn attach_factory(&mut self, factory: Box<dyn BodyFactory>) -> FactoryId {
        self.factories.push(factory);
        FactoryId((self.factories.len() - 1) as u32)
    }

    /// Looks up a factory by id.
    #[must_use]
    pub fn factory(&self, id: FactoryId) -> Option<&dyn BodyFactory> {
        self.factories.get(id.0 as usize).map(|factory| &**factory)
    }

    /// Allocates a fresh identifier for a locally created body.
    ///
    /// Before the handshake assigns a short-UID this uses the reserved
    /// world-init originator.
    pub fn allocate_id(&mut self) -> BodyId {
        if self.short_uid == 0 {
            self.allocate_init_id()
        } else {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            BodyId::compose(self.short_uid, sequence)
        }
    }

    /// Allocates an identifier under the reserved world-init originator.
    ///
    /// Callers must create world-init bodies in the same order on every
    /// peer; the sequence is what keeps the identifiers aligned.
    pub fn allocate_init_id(&mut self) -> BodyId {
        let sequence = self.next_init_sequence;
        self.next_init_sequence += 1;
        BodyId::compose(BodyId::WORLD_INIT_ORIGINATOR, sequence)
    }

    /// Validates that a spawn position lies inside the world bounds.
    pub fn check_bounds(&self, position: Vec2) -> SyncResult<()> {
        if self.bounds.contains(position) {
            Ok(())
        } else {
            Err(SyncError::OutOfBounds(position))
        }
    }

    /// Binds an identifier to a simulator handle.
    ///
    /// # Panics
    ///
    /// Panics if either side is already bound; only internal code paths
    /// insert, so a duplicate is a bug.
    pub fn insert(&mut self, id: BodyId, handle: BodyHandle) {
        let stale = self.id_to_handle.insert(id, handle);
        assert!(stale.is_none(), "body id {id:?} registered twice");
        let stale = self.handle_to_id.insert(handle, id);
        assert!(stale.is_none(), "body handle {handle:?} registered twice");
        self.order.push(id);
    }

    /// Unbinds an identifier, returning its handle if it was registered.
    pub fn remove(&mut self, id: BodyId) -> Option<BodyHandle> {
        let handle = self.id_to_handle.remove(&id)?;
        self.handle_to_id.remove(&handle);
        self.order.retain(|entry| *entry != id);
        Some(handle)
    }

    /// Resolves an identifier to its simulator handle.
    #[must_use]
    pub fn handle_of(&self, id: BodyId) -> Option<BodyHandle> {
        self.id_to_handle.get(&id).copied()
    }

    /// Resolves a simulator handle to its identifier.
    #[must_use]
    pub fn id_of(&self, handle: BodyHandle) -> Option<BodyId> {
        self.handle_to_id.get(&handle).copied()
    }

    /// Returns true if the identifier is registered.
    #[must_use]
    pub fn contains(&self, id: BodyId) -> bool {
        self.id_to_handle.contains_key(&id)
    }

    /// Returns the registered identifiers in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[BodyId] {
        &self.order
    }

    /// Returns the number of registered bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no bodies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the configured world bounds.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }
}
