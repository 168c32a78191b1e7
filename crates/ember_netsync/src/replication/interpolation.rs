//! # Interpolation
//!
//! Remote snapshots are never applied as hard snaps; the engine drives each
//! body toward the authoritative state over a bounded number of simulation
//! ticks. This module holds the target bookkeeping and the pure math for
//! the four convergence modes.

use serde::{Deserialize, Serialize};

use ember_core::Vec2;

/// Steps scheduled per world unit of positional error.
pub const STEPS_PER_UNIT_ERROR: f32 = 30.0;

/// Weight of angular error (radians) when deriving step counts.
pub const ANGLE_ERROR_GAIN: f32 = 10.0;

/// Divisor turning a velocity into a spline control-point offset.
pub const CONTROL_POINT_SCALE: f32 = 10.0;

// PID gains for the velocity-control mode.
const PID_PROPORTIONAL: f32 = 10.0;
const PID_INTEGRAL: f32 = 0.01;
const PID_DERIVATIVE: f32 = 0.5;

/// How reconciled positions converge on their targets.
///
/// Angle and angular velocity always converge linearly regardless of mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationMode {
    /// Per-tick linear convergence of position and velocity.
    #[default]
    Linear,
    /// Cubic Bezier position blend with velocity-derived control points.
    Bezier,
    /// Hermite position blend using end-point velocities.
    Hermite,
    /// PID control applied to linear velocity; position follows physically.
    Pid,
}

/// Cached authoritative state a body is being driven toward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolationTarget {
    /// Steps taken so far.
    pub current_step: u32,
    /// Total steps scheduled for this target.
    pub total_steps: u32,
    /// Body position when the target was adopted.
    pub source: Vec2,
    /// First spline control point.
    pub control1: Vec2,
    /// Second spline control point.
    pub control2: Vec2,
    /// Authoritative position.
    pub target_position: Vec2,
    /// Authoritative linear velocity.
    pub target_velocity: Vec2,
    /// Authoritative angle.
    pub target_angle: f32,
    /// Authoritative angular velocity.
    pub target_angular_velocity: f32,
    /// Accumulated positional error for the PID mode.
    pub integral: Vec2,
    /// Number of error terms accumulated.
    pub integral_count: u64,
}

impl InterpolationTarget {
    /// Builds a target from the current body state and an authoritative
    /// snapshot, scheduling `total_steps` ticks of convergence.
    #[must_use]
    pub fn new(
        total_steps: u32,
        position: Vec2,
        velocity: Vec2,
        target_position: Vec2,
        target_velocity: Vec2,
        target_angle: f32,
        target_angular_velocity: f32,
    ) -> Self {
        Self {
            current_step: 0,
            total_steps,
            source: position,
            control1: position + velocity / CONTROL_POINT_SCALE,
            control2: target_position - target_velocity / CONTROL_POINT_SCALE,
            target_position,
            target_velocity,
            target_angle,
            target_angular_velocity,
            integral: Vec2::ZERO,
            integral_count: 0,
        }
    }

    /// Steps not yet taken.
    #[must_use]
    pub const fn steps_left(&self) -> u32 {
        self.total_steps.saturating_sub(self.current_step)
    }
}

/// Derives the step count for a given positional and angular error.
///
/// `N = clamp(max(⌊30·distance⌋, ⌊10·|angle_error|⌋), 1, max_steps)`.
#[must_use]
pub fn step_count(distance: f32, angle_error: f32, max_steps: u32) -> u32 {
    let by_distance = (distance * STEPS_PER_UNIT_ERROR) as u32;
    let by_angle = (ANGLE_ERROR_GAIN * angle_error.abs()) as u32;
    by_distance.max(by_angle).clamp(1, max_steps)
}

/// One step of linear convergence: `source + (target − source) / steps_left`.
#[must_use]
pub fn converge(steps_left: u32, target: f32, source: f32) -> f32 {
    (target - source) / steps_left as f32 + source
}

/// Evaluates a cubic Bezier curve at `t ∈ [0, 1]`.
#[must_use]
pub fn bezier(t: f32, p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2) -> Vec2 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Evaluates a Hermite blend at `t ∈ [0, 1]` using end-point velocities as
/// tangents.
#[must_use]
pub fn hermite(t: f32, p0: Vec2, v0: Vec2, p1: Vec2, v1: Vec2) -> Vec2 {
    let t2 = t * t;
    let t3 = t2 * t;
    (2.0 * t3 - 3.0 * t2 + 1.0) * p0
        + (t3 - 2.0 * t2 + t) * v0
        + (-2.0 * t3 + 3.0 * t2) * p1
        + (t3 - t2) * v1
}

/// One step of PID velocity control toward `target.target_position`.
///
/// Returns the new linear velocity; the integral state in `target` is
/// updated in place.
#[must_use]
pub fn pid_velocity(target: &mut InterpolationTarget, position: Vec2, velocity: Vec2) -> Vec2 {
    let error = target.target_position - position;
    target.integral_count += 1;
    target.integral = target.integral + error;

    let proportional = error * PID_PROPORTIONAL;
    let integral = target.integral * PID_INTEGRAL;
    let derivative = velocity * PID_DERIVATIVE;
    velocity + proportional - derivative + integral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_count_scales_with_distance() {
        // Ten units of error wants 300 steps, clamped to the maximum.
        assert_eq!(step_count(10.0, 0.0, 30), 30);
        // Tiny error still schedules one step.
        assert_eq!(step_count(0.001, 0.0, 30), 1);
        // Half a unit: floor(15) steps.
        assert_eq!(step_count(0.5, 0.0, 30), 15);
    }

    #[test]
    fn test_step_count_angle_term() {
        // 1.2 radians of error: floor(12) steps, dominating the distance term.
        assert_eq!(step_count(0.1, 1.2, 30), 12);
        assert_eq!(step_count(0.1, -1.2, 30), 12);
    }

    #[test]
    fn test_converge_monotonically_approaches() {
        let target = 10.0;
        let mut value = 0.0;
        for steps_left in (2..=30).rev() {
            let next = converge(steps_left, target, value);
            assert!((target - next).abs() < (target - value).abs());
            value = next;
        }
        // The final step lands exactly.
        assert_eq!(converge(1, target, value), target);
    }

    #[test]
    fn test_bezier_endpoints() {
        let p0 = Vec2::new(0.0, 0.0);
        let p1 = Vec2::new(1.0, 2.0);
        let p2 = Vec2::new(3.0, 2.0);
        let p3 = Vec2::new(4.0, 0.0);

        assert_eq!(bezier(0.0, p0, p1, p2, p3), p0);
        assert_eq!(bezier(1.0, p0, p1, p2, p3), p3);
    }

    #[test]
    fn test_hermite_endpoints() {
        let p0 = Vec2::new(1.0, 1.0);
        let p1 = Vec2::new(5.0, -1.0);
        let v = Vec2::new(0.5, 0.5);

        assert_eq!(hermite(0.0, p0, v, p1, v), p0);
        assert_eq!(hermite(1.0, p0, v, p1, v), p1);
    }

    #[test]
    fn test_pid_accumulates_integral() {
        let mut target = InterpolationTarget::new(
            10,
            Vec2::ZERO,
            Vec2::ZERO,
            Vec2::new(1.0, 0.0),
            Vec2::ZERO,
            0.0,
            0.0,
        );

        let v1 = pid_velocity(&mut target, Vec2::ZERO, Vec2::ZERO);
        assert!(v1.x > 0.0);
        assert_eq!(target.integral_count, 1);
        assert_eq!(target.integral, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_target_control_points() {
        let target = InterpolationTarget::new(
            5,
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(-10.0, 0.0),
            0.0,
            0.0,
        );
        assert_eq!(target.control1, Vec2::new(1.0, 0.0));
        assert_eq!(target.control2, Vec2::new(5.0, 0.0));
        assert_eq!(target.steps_left(), 5);
    }
}
