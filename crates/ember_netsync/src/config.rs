//! # Engine Configuration
//!
//! Tuning knobs for the replication engine. Defaults reproduce the
//! behavior the engine ships with; all values can be loaded from
//! application config files via serde.

use serde::{Deserialize, Serialize};

use crate::replication::InterpolationMode;

/// Replication tuning parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How reconciled positions converge on their targets.
    pub interpolation_mode: InterpolationMode,
    /// Upper bound on interpolation step counts.
    pub max_interpolation_steps: u32,
    /// How many high-velocity bodies a priority sync includes.
    pub priority_cap: usize,
    /// Size of the rolling window a priority sync appends.
    pub rotation_window: usize,
    /// Host cadence for automatic full syncs, in ticks. `0` disables them.
    pub full_sync_interval: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interpolation_mode: InterpolationMode::Linear,
            max_interpolation_steps: 30,
            priority_cap: 60,
            rotation_window: 20,
            full_sync_interval: 1,
        }
    }
}
