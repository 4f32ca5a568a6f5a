//! Step Event Queue
//!
//! Events are collected during `step()` and drained by the caller afterward;
//! nothing is dispatched inline while the solver runs. A broken joint
//! produces three events per occurrence: one addressed to each endpoint body
//! and one for the general listener.

use crate::body::BodyId;
use crate::joint::JointId;

/// One outbound event produced by a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepEvent {
    /// Emitted before any solving, as the step's opening hook.
    StepBegan {
        /// Timestep, seconds
        dt: f32,
    },
    /// A joint's reaction force exceeded its breaking force this step.
    /// `body` is the addressed endpoint; `None` addresses the general
    /// listener.
    JointBroken {
        joint: JointId,
        body: Option<BodyId>,
        /// Worst reaction force observed this step, newtons
        error: f32,
    },
    /// A body transitioned to the sleeping state this step.
    BodySlept { body: BodyId },
    /// Emitted after write-back and sleep management, as the closing hook.
    StepEnded {
        /// Islands solved this step (lone bucket included)
        islands: usize,
        /// Bodies put to sleep this step
        bodies_slept: usize,
    },
}

/// Outbound event queue for one step.
#[derive(Clone, Debug, Default)]
pub struct StepEvents {
    events: Vec<StepEvent>,
}

impl StepEvents {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[inline]
    pub fn push(&mut self, event: StepEvent) {
        self.events.push(event);
    }

    /// Iterate without consuming.
    pub fn iter(&self) -> core::slice::Iter<'_, StepEvent> {
        self.events.iter()
    }

    /// Drain all collected events.
    pub fn drain(&mut self) -> impl Iterator<Item = StepEvent> + '_ {
        self.events.drain(..)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Summary of one island, reported for observability and tests.
#[derive(Clone, Debug)]
pub struct IslandSummary {
    /// Member bodies in island order
    pub bodies: Vec<BodyId>,
    /// Contacts assigned to this island
    pub contact_count: usize,
    /// Joints assigned to this island
    pub joint_count: usize,
    /// This is the shared bucket of unconnected bodies
    pub lone: bool,
    /// Position correction converged within the iteration budget
    pub position_solved: bool,
}

/// Result of one solver step.
#[derive(Clone, Debug, Default)]
pub struct StepReport {
    /// Islands solved, lone bucket included
    pub islands: usize,
    /// Bodies in the lone bucket
    pub lone_bodies: usize,
    /// Contacts assigned to islands this step
    pub contacts: usize,
    /// Joints assigned to islands this step
    pub joints: usize,
    /// Bodies put to sleep this step
    pub bodies_slept: usize,
    /// Islands solved on worker threads
    pub parallel_islands: usize,
    /// Per-island membership summaries
    pub island_summaries: Vec<IslandSummary>,
    /// Outbound events, drained by the caller
    pub events: StepEvents,
}

// ============================================================================
// Tests
// ============================================================================
