//! Sleep Management
//!
//! Decides, per island, which bodies stop being simulated. Two policies:
//!
//! - **Lone bucket**: every body carries its own timer and sleeps alone the
//!   tick its timer reaches the threshold.
//! - **Coupled island**: the island sleeps as a unit when the *minimum*
//!   member timer reaches the threshold, so one moving body keeps the whole
//!   structure awake and a structure never freezes piecemeal.
//!
//! Both policies additionally require that the island's position correction
//! converged this step; an island still being pushed apart must not freeze
//! mid-correction.

use crate::body::{Body, BodyKind};
use crate::config::StepConfig;
use crate::event::{StepEvent, StepEvents};
use crate::island::Island;
use crate::world::WorldState;

/// Advance one body's sleep timer: reset when the body refuses sleep or
/// still moves beyond tolerance, accumulate otherwise.
fn advanced_timer(body: &Body, config: &StepConfig, dt: f32) -> f32 {
    let spinning = body.angular_velocity * body.angular_velocity
        > config.angular_sleep_tolerance_sq;
    let translating =
        body.linear_velocity.length_squared() > config.linear_sleep_tolerance_sq;
    if body.sleep_disallowed || spinning || translating {
        0.0
    } else {
        body.sleep_timer + dt
    }
}

/// Update sleep timers for one island's bodies and put the eligible ones to
/// sleep. Returns the number of bodies slept.
pub(crate) fn update_island_sleep(
    island: &Island,
    world: &mut WorldState,
    config: &StepConfig,
    dt: f32,
    events: &mut StepEvents,
) -> usize {
    let mut slept = 0;

    if island.lone {
        for &id in &island.bodies {
            let Some(body) = world.body_mut(id) else { continue };
            let timer = advanced_timer(body, config, dt);
            body.sleep_timer = timer;
            if config.sleep_allowed && island.position_solved && timer >= config.time_to_sleep {
                body.sleep();
                events.push(StepEvent::BodySlept { body: id });
                slept += 1;
            }
        }
        return slept;
    }

    // Coupled island: gate on the minimum timer across the members.
    let mut min_timer = f32::INFINITY;
    for &id in &island.bodies {
        let Some(body) = world.body_mut(id) else { continue };
        if body.kind == BodyKind::Static {
            continue;
        }
        let timer = advanced_timer(body, config, dt);
        body.sleep_timer = timer;
        min_timer = min_timer.min(timer);
    }

    if config.sleep_allowed && island.position_solved && min_timer >= config.time_to_sleep {
        for &id in &island.bodies {
            let Some(body) = world.body_mut(id) else { continue };
            if body.kind == BodyKind::Static {
                continue;
            }
            body.sleep();
            events.push(StepEvent::BodySlept { body: id });
            slept += 1;
        }
    }

    slept
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use glam::Vec2;

    fn lone_island(bodies: Vec<usize>) -> Island {
        let mut island = Island::new();
        island.bodies = bodies;
        island.lone = true;
        island.position_solved = true;
        island
    }

    fn coupled_island(bodies: Vec<usize>) -> Island {
        let mut island = Island::new();
        island.bodies = bodies;
        island.position_solved = true;
        island
    }

    #[test]
    fn lone_body_sleeps_on_the_exact_tick() {
        // dt = 1/64 is exact in binary, so 32 ticks accumulate to exactly 0.5.
        let dt = 1.0 / 64.0;
        let config = StepConfig {
            time_to_sleep: 0.5,
            ..StepConfig::default()
        };

        let mut world = WorldState::new();
        let id = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let island = lone_island(vec![id]);
        let mut events = StepEvents::new();

        for tick in 1..=32 {
            let slept = update_island_sleep(&island, &mut world, &config, dt, &mut events);
            if tick < 32 {
                assert_eq!(slept, 0, "slept early on tick {tick}");
                assert!(world.body(id).unwrap().awake);
            } else {
                assert_eq!(slept, 1, "did not sleep on tick {tick}");
                assert!(!world.body(id).unwrap().awake);
            }
        }
    }

    #[test]
    fn unconverged_island_never_sleeps() {
        let dt = 1.0 / 64.0;
        let config = StepConfig {
            time_to_sleep: 0.1,
            ..StepConfig::default()
        };

        let mut world = WorldState::new();
        let id = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let mut island = lone_island(vec![id]);
        island.position_solved = false;
        let mut events = StepEvents::new();

        for _ in 0..100 {
            assert_eq!(
                update_island_sleep(&island, &mut world, &config, dt, &mut events),
                0
            );
        }
    }

    #[test]
    fn moving_body_resets_its_timer() {
        let dt = 1.0 / 64.0;
        let config = StepConfig {
            time_to_sleep: 0.5,
            ..StepConfig::default()
        };

        let mut world = WorldState::new();
        let id = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let island = lone_island(vec![id]);
        let mut events = StepEvents::new();

        for _ in 0..31 {
            update_island_sleep(&island, &mut world, &config, dt, &mut events);
        }
        // A spike above tolerance on tick 32 resets the timer; tick 33 starts
        // accumulating from zero.
        world.body_mut(id).unwrap().linear_velocity = Vec2::new(1.0, 0.0);
        update_island_sleep(&island, &mut world, &config, dt, &mut events);
        assert_eq!(world.body(id).unwrap().sleep_timer, 0.0);
        assert!(world.body(id).unwrap().awake);
    }

    #[test]
    fn coupled_island_gates_on_minimum_timer() {
        let dt = 1.0 / 64.0;
        let config = StepConfig {
            time_to_sleep: 0.5,
            ..StepConfig::default()
        };

        let mut world = WorldState::new();
        let calm = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let restless = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        let island = coupled_island(vec![calm, restless]);
        let mut events = StepEvents::new();

        for _ in 0..31 {
            update_island_sleep(&island, &mut world, &config, dt, &mut events);
        }
        // Spike only the second body: the whole island must stay awake even
        // though the first body's timer alone would cross the threshold.
        world.body_mut(restless).unwrap().linear_velocity = Vec2::new(5.0, 0.0);
        let slept = update_island_sleep(&island, &mut world, &config, dt, &mut events);
        assert_eq!(slept, 0);
        assert!(world.body(calm).unwrap().awake);

        // Once the spike settles, the coupled island needs the full window
        // again before both bodies sleep together.
        world.body_mut(restless).unwrap().linear_velocity = Vec2::ZERO;
        let mut slept_tick = None;
        for tick in 1..=40 {
            let slept = update_island_sleep(&island, &mut world, &config, dt, &mut events);
            if slept > 0 {
                slept_tick = Some((tick, slept));
                break;
            }
        }
        assert_eq!(slept_tick, Some((32, 2)), "island must sleep as one unit");
    }

    #[test]
    fn statics_do_not_gate_coupled_sleep() {
        let dt = 1.0 / 64.0;
        let config = StepConfig {
            time_to_sleep: 0.1,
            ..StepConfig::default()
        };

        let mut world = WorldState::new();
        let wall = world.add_body(Body::fixed(Vec2::ZERO));
        let block = world.add_body(Body::dynamic(Vec2::new(0.0, 1.0), 1.0, 1.0));
        let island = coupled_island(vec![wall, block]);
        let mut events = StepEvents::new();

        let mut slept = 0;
        for _ in 0..10 {
            slept = update_island_sleep(&island, &mut world, &config, dt, &mut events);
            if slept > 0 {
                break;
            }
        }
        assert_eq!(slept, 1, "only the dynamic body sleeps");
        assert!(!world.body(block).unwrap().awake);
    }
}
