//! # ALICE-Islands
//!
//! **Island-Based Constraint Solver for 2D Rigid-Body Physics**
//!
//! A Rust library implementing the solver core of a 2D physics engine:
//! island construction, warm-started sequential-impulse velocity solving,
//! full nonlinear Gauss-Seidel position correction, parallel island
//! scheduling, and sleep management. Collision detection, scene storage, and
//! entity lifecycles live outside and talk to the solver through narrow
//! interfaces.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Islands** | Awake bodies partitioned into connected components, solved independently |
//! | **Sequential Impulse** | Warm-started contact/joint velocity solving with accumulated clamping |
//! | **Full NGS** | Position correction that recomputes Jacobian and effective mass every round |
//! | **Parallel Scheduling** | Large islands first, the rest fanned out over disjoint buffer ranges |
//! | **Sleeping** | Independent timers in the lone bucket, minimum-timer gating in coupled islands |
//!
//! ## Quick Start
//!
//! ```rust
//! use alice_islands::prelude::*;
//! use glam::Vec2;
//!
//! let mut world = WorldState::new();
//! world.add_body(Body::dynamic(Vec2::new(0.0, 10.0), 1.0, 1.0));
//!
//! let mut stepper = Stepper::new();
//! let config = StepConfig::default();
//! let report = stepper
//!     .step(&mut world, &NoHierarchy, &config, 1.0 / 60.0, false)
//!     .unwrap();
//!
//! assert_eq!(report.islands, 1); // one lone-island bucket
//! assert!(world.body(0).unwrap().linear_velocity.y < 0.0);
//! ```
//!
//! ## Design Principles
//!
//! - **Single-writer phases**: island construction and state commit are
//!   single-threaded; only the island solves run concurrently, each over its
//!   own pre-split slice of the shared result buffer.
//! - **Pooled scratch**: islands and per-step buffers are rented and returned
//!   every step; misuse trips debug assertions.
//! - **No inline dispatch**: joint breaks and step hooks are queued as events
//!   and drained by the caller after the step.
//! - **Fail soft at the edges**: missing entities are logged and purged;
//!   non-finite solver output never reaches the live scene.

pub mod body;
pub mod config;
pub mod contact;
pub mod error;
pub mod event;
pub mod island;
pub mod joint;
pub mod math;
pub mod scratch;
pub mod sleep;
pub mod world;

mod scheduler;
mod solver;

pub use body::{Body, BodyId, BodyKind};
pub use config::StepConfig;
pub use contact::{Contact, ContactId, ContactPoint};
pub use error::PhysicsError;
pub use event::{StepEvent, StepEvents, StepReport};
pub use joint::{Joint, JointId, JointKind};
pub use world::{NoHierarchy, Stepper, TransformHierarchy, WorldState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::body::{Body, BodyId, BodyKind};
    pub use crate::config::StepConfig;
    pub use crate::contact::{Contact, ContactId, ContactPoint};
    pub use crate::error::PhysicsError;
    pub use crate::event::{IslandSummary, StepEvent, StepEvents, StepReport};
    pub use crate::joint::{AngleLimits, Joint, JointId, JointKind};
    pub use crate::math::{Rot2, Transform2};
    pub use crate::world::{NoHierarchy, Stepper, TransformHierarchy, WorldState};
}
