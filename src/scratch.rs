//! Pooled Per-Step Buffers
//!
//! Everything the solver allocates per step comes from here and goes back
//! here: the island pool, the shared body-state result buffer the islands
//! write into through disjoint offset ranges, and the bitsets that replace
//! per-entity "visited this step" flags.
//!
//! # Rent/Return Discipline
//!
//! Islands are rented at the start of a step and must all be returned before
//! the step ends. Double returns and leaked rentals are programming errors
//! and trip debug assertions; release builds degrade to allocating fresh
//! containers.
//!
//! Author: Moroya Sakamoto

use glam::Vec2;

use crate::config::MAX_ISLANDS;
use crate::error::PhysicsError;
use crate::island::Island;

// ============================================================================
// BodyState — Shared Result Buffer Entry
// ============================================================================

/// Snapshot of one body's pose and velocity, solved in place and written back
/// to the live body during the sequential commit.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyState {
    /// World-space center of mass
    pub position: Vec2,
    /// World-space rotation angle, radians
    pub angle: f32,
    /// Linear velocity, m/s
    pub linear_velocity: Vec2,
    /// Angular velocity, rad/s
    pub angular_velocity: f32,
    /// Parent-relative position, filled by re-localization
    pub local_position: Vec2,
    /// Parent-relative rotation angle, filled by re-localization
    pub local_angle: f32,
}

// ============================================================================
// BitSet — Per-Step Visited Marks
// ============================================================================

/// Fixed-stride bitmap keyed by stable entity index. Cleared once per step
/// instead of touching a flag on every entity.
#[derive(Clone, Debug, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Grow to cover indices `0..len` and clear every bit.
    pub fn reset(&mut self, len: usize) {
        let words = len.div_ceil(64);
        self.words.clear();
        self.words.resize(words, 0);
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    #[inline]
    pub fn unset(&mut self, index: usize) {
        self.words[index / 64] &= !(1 << (index % 64));
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }
}

// ============================================================================
// IslandPool
// ============================================================================

/// Reusable island containers, bounded by [`MAX_ISLANDS`].
#[derive(Debug, Default)]
pub struct IslandPool {
    free: Vec<Island>,
    /// Containers ever created, counted against [`MAX_ISLANDS`]
    created: usize,
    /// Containers currently rented out
    outstanding: usize,
}

impl IslandPool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            created: 0,
            outstanding: 0,
        }
    }

    /// Rent a cleared island container.
    pub fn rent(&mut self) -> Result<Island, PhysicsError> {
        let island = match self.free.pop() {
            Some(island) => island,
            None => {
                if self.created >= MAX_ISLANDS {
                    return Err(PhysicsError::CapacityExceeded {
                        resource: "islands",
                        limit: MAX_ISLANDS,
                    });
                }
                self.created += 1;
                Island::new()
            }
        };
        self.outstanding += 1;
        Ok(island)
    }

    /// Return a rented island. The container is cleared and recycled.
    pub fn give_back(&mut self, mut island: Island) {
        debug_assert!(self.outstanding > 0, "island returned twice");
        self.outstanding = self.outstanding.saturating_sub(1);
        island.clear();
        self.free.push(island);
    }

    /// Assert every rental came back. Called at the end of a step.
    pub fn assert_balanced(&self) {
        debug_assert_eq!(self.outstanding, 0, "leaked island rental");
    }

    /// Containers currently rented out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

// ============================================================================
// Offset Layout
// ============================================================================

/// Assign each island its offset into the shared result buffer as a prefix
/// sum over island body counts, and return the total size. Offsets are
/// verified disjoint: each island's range starts exactly where the previous
/// one ended.
pub fn compute_offsets(islands: &mut [Island]) -> usize {
    let mut total = 0;
    for island in islands.iter_mut() {
        island.offset = total;
        total += island.bodies.len();
    }
    debug_assert!(
        islands.windows(2).all(|w| w[0].offset + w[0].bodies.len() == w[1].offset),
        "island offset ranges overlap"
    );
    total
}

/// Split the shared result buffer into one disjoint mutable chunk per island,
/// in island order. Overlap is unrepresentable: chunks are produced by
/// successive `split_at_mut`.
pub fn split_island_chunks<'a>(
    mut states: &'a mut [BodyState],
    islands: &[Island],
) -> Vec<&'a mut [BodyState]> {
    let mut chunks = Vec::with_capacity(islands.len());
    for island in islands {
        let (chunk, rest) = states.split_at_mut(island.bodies.len());
        chunks.push(chunk);
        states = rest;
    }
    chunks
}

// ============================================================================
// Tests
// ============================================================================
