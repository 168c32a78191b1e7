//! # Ember Core Types
//!
//! Shared value types for the Ember networked physics stack.
//!
//! Everything in this crate is a plain value: 2D vector math, the
//! rigid-body property model, and the opaque handle used to address
//! bodies inside a simulator. These are the canonical representations
//! used in the network protocol, so both halves of a session agree on
//! them by construction.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod body;
pub mod math;

pub use body::{BodyDef, BodyFlags, BodyHandle, BodyMaterial, BodyType, SceneDescriptor};
pub use math::{Rect, Vec2};
