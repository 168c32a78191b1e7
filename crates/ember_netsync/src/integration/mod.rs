//! # Collaborator Interfaces
//!
//! The engine never owns application, simulator, or rendering concerns.
//! This module defines the traits those collaborators implement, plus
//! working reference implementations used throughout the test suite.

pub mod testbed;
pub mod traits;

pub use testbed::{CircleFactory, TestbedSimulator};
pub use traits::{Application, BodyFactory, DirtyFlags, FixedClock, SceneLink, Simulator};
