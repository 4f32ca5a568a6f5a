//! Step Configuration
//!
//! The recognized option bundle for one solver step, plus the solver-wide
//! tuning constants. The configuration is plain serializable data: the caller
//! owns where it comes from (settings file, editor UI, network) and simply
//! passes the current bundle to every step. Options are revalidated per step,
//! so swapping the bundle between steps is always safe.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;

// ============================================================================
// Solver Constants
// ============================================================================

/// Allowed contact penetration before position correction engages, in meters.
pub const LINEAR_SLOP: f32 = 0.005;

/// Allowed joint angle error before position correction engages, in radians.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * core::f32::consts::PI;

/// Fraction of a position error corrected per NGS round.
pub const BAUMGARTE: f32 = 0.2;

/// Approach speed below which restitution is ignored, in m/s.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// An island whose contact or joint count exceeds this is solved up front on
/// the current thread instead of being fanned out.
pub const LARGE_ISLAND_THRESHOLD: usize = 32;

/// Upper bound on pooled islands per step.
pub const MAX_ISLANDS: usize = 4096;

// ============================================================================
// StepConfig
// ============================================================================

/// Configuration bundle consumed by [`Stepper::step`](crate::world::Stepper::step).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Uniform gravity applied to dynamic bodies, in m/s².
    pub gravity: Vec2,
    /// Seed constraint solving with last step's accumulated impulses.
    pub warm_starting: bool,
    /// Number of sequential-impulse velocity iterations per island.
    pub velocity_iterations: u32,
    /// Maximum nonlinear position-correction rounds per island.
    pub position_iterations: u32,
    /// Largest positional correction applied in one NGS round, in meters.
    pub max_linear_correction: f32,
    /// Largest angular correction applied in one NGS round, in radians.
    pub max_angular_correction: f32,
    /// Largest translation a body may cover in one step, in meters. Velocity
    /// is scaled down when the integrated translation would exceed this.
    pub max_linear_velocity: f32,
    /// Largest rotation a body may cover in one step, in radians.
    pub max_angular_velocity: f32,
    /// Master switch for the sleep manager.
    pub sleep_allowed: bool,
    /// Squared linear speed below which a body counts as settled, in (m/s)².
    pub linear_sleep_tolerance_sq: f32,
    /// Squared angular speed below which a body counts as settled, in (rad/s)².
    pub angular_sleep_tolerance_sq: f32,
    /// Time a body (or island) must stay settled before sleeping, in seconds.
    pub time_to_sleep: f32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.81),
            warm_starting: true,
            velocity_iterations: 8,
            position_iterations: 3,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * core::f32::consts::PI,
            max_linear_velocity: 2.0,
            max_angular_velocity: 0.5 * core::f32::consts::PI,
            sleep_allowed: true,
            linear_sleep_tolerance_sq: 0.01 * 0.01,
            angular_sleep_tolerance_sq: {
                let tol = 2.0 / 180.0 * core::f32::consts::PI;
                tol * tol
            },
            time_to_sleep: 0.5,
        }
    }
}

impl StepConfig {
    /// Check the bundle for values the solver cannot run with.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "gravity must be finite",
            });
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "velocity iterations must be at least 1",
            });
        }
        if !(self.max_linear_correction > 0.0) || !(self.max_angular_correction > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "correction limits must be positive",
            });
        }
        if !(self.max_linear_velocity > 0.0) || !(self.max_angular_velocity > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "velocity caps must be positive",
            });
        }
        if self.linear_sleep_tolerance_sq < 0.0
            || self.angular_sleep_tolerance_sq < 0.0
            || self.time_to_sleep < 0.0
        {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "sleep thresholds must be non-negative",
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
