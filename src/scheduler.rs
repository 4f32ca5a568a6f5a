//! Parallel Island Scheduling
//!
//! Islands are independent by construction, so the solve phase is the one
//! place this crate goes wide. Islands are ordered by a coarse cost heuristic
//! (contact count + joint count, descending). Large islands are solved up
//! front one at a time; everything else is fanned out across worker threads,
//! one task per island, each writing only its own pre-split slice of the
//! shared result buffer.
//!
//! With the `parallel` feature disabled the fan-out degrades to a plain loop
//! with identical results.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::LARGE_ISLAND_THRESHOLD;
use crate::island::Island;
use crate::scratch::{BodyState, split_island_chunks};
use crate::solver::{SolveContext, solve_island};
use crate::world::TransformHierarchy;

/// Solve every island against its disjoint chunk of `states`. Returns the
/// number of islands handed to the fan-out (0 without the `parallel`
/// feature).
pub(crate) fn solve_islands<H: TransformHierarchy + Sync>(
    islands: &mut [Island],
    states: &mut [BodyState],
    ctx: &SolveContext<'_>,
    hierarchy: &H,
) -> usize {
    let chunks = split_island_chunks(states, islands);
    let mut paired: Vec<(&mut Island, &mut [BodyState])> =
        islands.iter_mut().zip(chunks).collect();

    paired.sort_by(|x, y| y.0.cost().cmp(&x.0.cost()));

    let (large, small): (Vec<_>, Vec<_>) = paired.into_iter().partition(|(island, _)| {
        island.contacts.len() > LARGE_ISLAND_THRESHOLD
            || island.joints.len() > LARGE_ISLAND_THRESHOLD
    });

    // Large islands are assumed to dominate the step; solving them first and
    // alone avoids stacking them behind a fleet of small tasks.
    for (island, chunk) in large {
        guarded_solve(island, chunk, ctx, hierarchy);
    }

    #[cfg(feature = "parallel")]
    {
        let fanned_out = small.len();
        small
            .into_par_iter()
            .for_each(|(island, chunk)| guarded_solve(island, chunk, ctx, hierarchy));
        fanned_out
    }
    #[cfg(not(feature = "parallel"))]
    {
        for (island, chunk) in small {
            guarded_solve(island, chunk, ctx, hierarchy);
        }
        0
    }
}

/// Solve one island, containing any panic to that island. A faulted island
/// keeps its snapshot state, so the commit writes back unchanged values.
fn guarded_solve<H: TransformHierarchy>(
    island: &mut Island,
    chunk: &mut [BodyState],
    ctx: &SolveContext<'_>,
    hierarchy: &H,
) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        solve_island(island, chunk, ctx, hierarchy);
    }));
    if outcome.is_err() {
        log::error!(
            "island solve panicked; keeping snapshot state for {} bodies",
            island.bodies.len()
        );
        island.position_solved = false;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::config::StepConfig;
    use crate::contact::Contact;
    use crate::island::IslandBuilder;
    use crate::scratch::{IslandPool, compute_offsets};
    use crate::world::{NoHierarchy, WorldState};
    use glam::Vec2;

    #[test]
    fn all_islands_receive_a_solve() {
        // Two disjoint touching pairs plus one lone body: three islands.
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::new(0.0, 1.0), 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(0.0, 2.0), 1.0, 1.0));
        let c = world.add_body(Body::dynamic(Vec2::new(10.0, 1.0), 1.0, 1.0));
        let d = world.add_body(Body::dynamic(Vec2::new(10.0, 2.0), 1.0, 1.0));
        world.add_body(Body::dynamic(Vec2::new(50.0, 0.0), 1.0, 1.0));
        world
            .contacts
            .push(Contact::new(a, b, Vec2::Y).with_point(Vec2::ZERO, Vec2::ZERO));
        world
            .contacts
            .push(Contact::new(c, d, Vec2::Y).with_point(Vec2::ZERO, Vec2::ZERO));

        let mut builder = IslandBuilder::new();
        let mut pool = IslandPool::new();
        let mut islands = Vec::new();
        builder.build(&world, false, &mut pool, &mut islands).unwrap();
        assert_eq!(islands.len(), 3);

        let total = compute_offsets(&mut islands);
        let mut states = vec![BodyState::default(); total];
        for island in &islands {
            for (i, &id) in island.bodies.iter().enumerate() {
                let body = world.body(id).unwrap();
                states[island.offset + i].position = body.position;
                states[island.offset + i].linear_velocity = body.linear_velocity;
            }
        }

        let config = StepConfig::default();
        let dt = 1.0 / 60.0;
        let ctx = SolveContext {
            world: &world,
            config: &config,
            dt,
            inv_dt: 1.0 / dt,
        };
        solve_islands(&mut islands, &mut states, &ctx, &NoHierarchy);

        // Gravity reached every chunk: all dynamic bodies gained downward
        // velocity this step.
        for state in &states {
            assert!(state.linear_velocity.y < 0.0);
        }
        for island in islands.drain(..) {
            pool.give_back(island);
        }
        pool.assert_balanced();
    }
}
