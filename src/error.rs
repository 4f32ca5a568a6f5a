//! Solver Error Types
//!
//! Unified error type for the island solver. Functions that can fail
//! (stepping with a bad configuration, adding a constraint against a missing
//! body, exhausting the island pool) return `Result<T, PhysicsError>` instead
//! of raw booleans or panicking.
//!
//! Author: Moroya Sakamoto

use core::fmt;

/// Unified error type for solver operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// Body index is out of range or refers to a removed body.
    InvalidBodyIndex {
        /// The invalid index that was provided
        index: usize,
        /// Current number of body slots in the world
        count: usize,
    },
    /// A constraint references a body that does not exist.
    InvalidConstraint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// A capacity limit was exceeded (too many islands this step).
    CapacityExceeded {
        /// What resource was exhausted
        resource: &'static str,
        /// The limit that was exceeded
        limit: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBodyIndex { index, count } => {
                write!(f, "body index {index} out of range (count={count})")
            }
            Self::InvalidConstraint { reason } => {
                write!(f, "invalid constraint: {reason}")
            }
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "{resource} capacity exceeded (limit={limit})")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for PhysicsError {}

// ============================================================================
// Tests
// ============================================================================
