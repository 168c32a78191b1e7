//! # Error Types
//!
//! All errors that can surface from the replication engine. Conditions the
//! protocol treats as soft (empty queues, unknown body ids in snapshots,
//! releases the host ignores) are no-ops and never appear here.

use thiserror::Error;

use ember_core::Vec2;

/// Errors that can occur in the replication engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A frame carried a tag no registered event type claims.
    #[error("unknown event tag {0}")]
    UnknownEventTag(u8),

    /// A frame was shorter than the envelope header.
    #[error("truncated frame: {0} bytes")]
    TruncatedFrame(usize),

    /// A payload decoded to no known subtype.
    #[error("malformed event payload")]
    MalformedPayload,

    /// A body was created with its pose outside the world bounds.
    #[error("body created out of bounds at ({}, {})", .0.x, .0.y)]
    OutOfBounds(Vec2),

    /// A creation named a factory id that was never attached.
    #[error("unknown body factory {0}")]
    UnknownFactory(u32),

    /// The transport refused to open or act.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type for replication operations.
pub type SyncResult<T> = Result<T, SyncError>;
