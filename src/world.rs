//! World State and the Step Entry Point
//!
//! [`WorldState`] is the narrow hand-off from the surrounding framework: body
//! slots, the current contact list from the collision layer, and the joint
//! list. [`Stepper`] owns every pooled buffer and drives one fixed timestep
//! end to end:
//!
//! 1. build islands (single-threaded),
//! 2. snapshot body state into the shared result buffer (single-threaded),
//! 3. solve islands concurrently over disjoint buffer ranges,
//! 4. commit results, store warm-start impulses, emit events, run sleep
//!    management (single-threaded).
//!
//! Write-back is guarded: a non-finite solver result leaves the corresponding
//! live field unmodified, preferring stale-but-valid state over corruption.

use crate::body::{Body, BodyId};
use crate::config::StepConfig;
use crate::contact::{Contact, ContactId};
use crate::error::PhysicsError;
use crate::event::{IslandSummary, StepEvent, StepReport};
use crate::island::{Island, IslandBuilder};
use crate::joint::{Joint, JointId};
use crate::math::Transform2;
use crate::scheduler;
use crate::scratch::{BodyState, IslandPool, compute_offsets};
use crate::sleep;
use crate::solver::SolveContext;

// ============================================================================
// Scene-Graph Interface
// ============================================================================

/// Narrow read-only view of the scene graph, queried during re-localization.
pub trait TransformHierarchy {
    /// Inverse world transform of `body`'s parent, or `None` when the body
    /// sits directly under the scene root.
    fn parent_inverse_world(&self, body: BodyId) -> Option<Transform2>;
}

/// Hierarchy with every body at the scene root: local pose equals world pose.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHierarchy;

impl TransformHierarchy for NoHierarchy {
    fn parent_inverse_world(&self, _body: BodyId) -> Option<Transform2> {
        None
    }
}

// ============================================================================
// WorldState
// ============================================================================

/// Mutable simulation state borrowed by the solver for one step. Bodies keep
/// their slot for the lifetime of the world; a removed body leaves a `None`
/// slot behind so stale contact/joint references stay detectable.
#[derive(Debug, Default)]
pub struct WorldState {
    /// Body slots, indexed by [`BodyId`]
    pub bodies: Vec<Option<Body>>,
    /// Current touching contacts, replaced by the collision layer as needed
    pub contacts: Vec<Contact>,
    /// Joints, owned by the caller
    pub joints: Vec<Joint>,
}

impl WorldState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body, returning its stable id.
    pub fn add_body(&mut self, body: Body) -> BodyId {
        self.bodies.push(Some(body));
        self.bodies.len() - 1
    }

    /// Remove a body, leaving its slot empty. Constraints referencing it are
    /// purged lazily during the next island build.
    pub fn remove_body(&mut self, id: BodyId) -> Result<Body, PhysicsError> {
        match self.bodies.get_mut(id).and_then(Option::take) {
            Some(body) => Ok(body),
            None => Err(PhysicsError::InvalidBodyIndex {
                index: id,
                count: self.bodies.len(),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id).and_then(Option::as_ref)
    }

    #[inline]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id).and_then(Option::as_mut)
    }

    /// Add a contact after validating both endpoints.
    pub fn add_contact(&mut self, contact: Contact) -> Result<ContactId, PhysicsError> {
        if self.body(contact.body_a).is_none() || self.body(contact.body_b).is_none() {
            return Err(PhysicsError::InvalidConstraint {
                reason: "contact endpoint does not exist",
            });
        }
        self.contacts.push(contact);
        Ok(self.contacts.len() - 1)
    }

    /// Add a joint after validating both endpoints.
    pub fn add_joint(&mut self, joint: Joint) -> Result<JointId, PhysicsError> {
        if joint.body_a == joint.body_b {
            return Err(PhysicsError::InvalidConstraint {
                reason: "joint endpoints must differ",
            });
        }
        if self.body(joint.body_a).is_none() || self.body(joint.body_b).is_none() {
            return Err(PhysicsError::InvalidConstraint {
                reason: "joint endpoint does not exist",
            });
        }
        self.joints.push(joint);
        Ok(self.joints.len() - 1)
    }

    /// Wake a single body.
    pub fn wake_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let count = self.bodies.len();
        match self.body_mut(id) {
            Some(body) => {
                body.wake();
                Ok(())
            }
            None => Err(PhysicsError::InvalidBodyIndex { index: id, count }),
        }
    }

    /// Wake every body.
    pub fn wake_all(&mut self) {
        for body in self.bodies.iter_mut().flatten() {
            body.wake();
        }
    }

    /// Number of live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }
}

// ============================================================================
// Stepper
// ============================================================================

/// Owns all pooled per-step buffers and exposes the single per-tick entry
/// point. One `Stepper` drives one world; the containers it rents are
/// returned unconditionally before [`Stepper::step`] returns.
#[derive(Debug, Default)]
pub struct Stepper {
    builder: IslandBuilder,
    pool: IslandPool,
    islands: Vec<Island>,
    states: Vec<BodyState>,
}

impl Stepper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the world by one fixed timestep.
    ///
    /// `is_prediction` marks speculative steps: bodies that opt out of
    /// prediction are left untouched. Events collected during the step are
    /// returned in the report for the caller to drain.
    pub fn step<H: TransformHierarchy + Sync>(
        &mut self,
        world: &mut WorldState,
        hierarchy: &H,
        config: &StepConfig,
        dt: f32,
        is_prediction: bool,
    ) -> Result<StepReport, PhysicsError> {
        config.validate()?;
        if !(dt > 0.0) || !dt.is_finite() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "timestep must be positive and finite",
            });
        }

        let mut report = StepReport::default();
        report.events.push(StepEvent::StepBegan { dt });

        self.islands.clear();
        if let Err(err) =
            self.builder
                .build(world, is_prediction, &mut self.pool, &mut self.islands)
        {
            for island in self.islands.drain(..) {
                self.pool.give_back(island);
            }
            return Err(err);
        }

        // Disjoint offsets first, then a sequential snapshot, so every chunk
        // holds valid state before any island starts solving.
        let total = compute_offsets(&mut self.islands);
        self.states.clear();
        self.states.resize(total, BodyState::default());
        for island in &self.islands {
            for (i, &id) in island.bodies.iter().enumerate() {
                let Some(body) = world.body(id) else { continue };
                self.states[island.offset + i] = BodyState {
                    position: body.position,
                    angle: body.angle,
                    linear_velocity: body.linear_velocity,
                    angular_velocity: body.angular_velocity,
                    local_position: body.local_position,
                    local_angle: body.local_angle,
                };
            }
        }

        let parallel_islands = {
            let ctx = SolveContext {
                world,
                config,
                dt,
                inv_dt: 1.0 / dt,
            };
            scheduler::solve_islands(&mut self.islands, &mut self.states, &ctx, hierarchy)
        };

        // Sequential commit: write solved state onto the live bodies, store
        // warm-start impulses, turn recorded joint breaks into events.
        for island in &self.islands {
            for (i, &id) in island.bodies.iter().enumerate() {
                let state = self.states[island.offset + i];
                let Some(body) = world.body_mut(id) else { continue };
                if body.is_static() {
                    continue;
                }
                commit_state(body, &state, id);
            }

            for cc in &island.contact_constraints {
                let contact = &mut world.contacts[cc.contact];
                for (stored, solved) in contact
                    .points
                    .iter_mut()
                    .zip(&cc.points)
                    .take(cc.point_count)
                {
                    stored.normal_impulse = solved.normal_impulse;
                    stored.tangent_impulse = solved.tangent_impulse;
                }
            }
            for jc in &island.joint_constraints {
                let joint = &mut world.joints[jc.joint];
                joint.impulse = jc.impulse;
                joint.limit_impulse = jc.limit_impulse;
            }

            for &(jid, error) in &island.broken {
                let joint = &world.joints[jid];
                let (body_a, body_b) = (joint.body_a, joint.body_b);
                report.events.push(StepEvent::JointBroken {
                    joint: jid,
                    body: Some(body_a),
                    error,
                });
                report.events.push(StepEvent::JointBroken {
                    joint: jid,
                    body: Some(body_b),
                    error,
                });
                report.events.push(StepEvent::JointBroken {
                    joint: jid,
                    body: None,
                    error,
                });
            }
        }

        // Sleep management runs against the committed velocities.
        let mut bodies_slept = 0;
        for island in &self.islands {
            bodies_slept +=
                sleep::update_island_sleep(island, world, config, dt, &mut report.events);
        }

        report.islands = self.islands.len();
        report.bodies_slept = bodies_slept;
        report.parallel_islands = parallel_islands;
        for island in &self.islands {
            if island.lone {
                report.lone_bodies = island.bodies.len();
            }
            report.contacts += island.contacts.len();
            report.joints += island.joints.len();
            report.island_summaries.push(IslandSummary {
                bodies: island.bodies.clone(),
                contact_count: island.contacts.len(),
                joint_count: island.joints.len(),
                lone: island.lone,
                position_solved: island.position_solved,
            });
        }

        for island in self.islands.drain(..) {
            self.pool.give_back(island);
        }
        self.pool.assert_balanced();

        report.events.push(StepEvent::StepEnded {
            islands: report.islands,
            bodies_slept,
        });
        log::debug!(
            "step: {} islands ({} lone bodies), {} contacts, {} joints, {} slept",
            report.islands,
            report.lone_bodies,
            report.contacts,
            report.joints,
            bodies_slept
        );
        Ok(report)
    }
}

/// Write one solved state onto a live body, field by field. Any non-finite
/// field is dropped and the body keeps its previous value.
fn commit_state(body: &mut Body, state: &BodyState, id: BodyId) {
    let mut dropped = false;

    if state.position.is_finite() {
        body.position = state.position;
    } else {
        dropped = true;
    }
    if state.angle.is_finite() {
        body.angle = state.angle;
    } else {
        dropped = true;
    }
    if state.linear_velocity.is_finite() {
        body.linear_velocity = state.linear_velocity;
    } else {
        dropped = true;
    }
    if state.angular_velocity.is_finite() {
        body.angular_velocity = state.angular_velocity;
    } else {
        dropped = true;
    }
    if state.local_position.is_finite() {
        body.local_position = state.local_position;
    } else {
        dropped = true;
    }
    if state.local_angle.is_finite() {
        body.local_angle = state.local_angle;
    } else {
        dropped = true;
    }

    if dropped {
        log::warn!("non-finite solver result for body {id}; stale fields kept");
    }

    body.force = glam::Vec2::ZERO;
    body.torque = 0.0;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn add_and_remove_bodies() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::X, 1.0, 1.0));
        assert_eq!(world.body_count(), 2);

        world.remove_body(a).unwrap();
        assert_eq!(world.body_count(), 1);
        assert!(world.body(a).is_none());
        assert!(world.body(b).is_some());
        assert!(world.remove_body(a).is_err());
    }

    #[test]
    fn add_joint_validates_endpoints() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        assert!(world
            .add_joint(Joint::distance(a, a, Vec2::ZERO, Vec2::ZERO, 1.0))
            .is_err());
        assert!(world
            .add_joint(Joint::distance(a, 99, Vec2::ZERO, Vec2::ZERO, 1.0))
            .is_err());
    }

    #[test]
    fn step_rejects_bad_timestep() {
        let mut world = WorldState::new();
        let mut stepper = Stepper::new();
        let config = StepConfig::default();
        assert!(stepper
            .step(&mut world, &NoHierarchy, &config, 0.0, false)
            .is_err());
        assert!(stepper
            .step(&mut world, &NoHierarchy, &config, f32::NAN, false)
            .is_err());
    }

    #[test]
    fn commit_drops_only_non_finite_fields() {
        let mut body = Body::dynamic(Vec2::new(1.0, 2.0), 1.0, 1.0);
        body.linear_velocity = Vec2::new(3.0, 4.0);
        let state = BodyState {
            position: Vec2::new(f32::NAN, 0.0),
            angle: 0.5,
            linear_velocity: Vec2::new(7.0, 8.0),
            angular_velocity: f32::INFINITY,
            local_position: Vec2::new(9.0, 9.0),
            local_angle: 0.5,
        };
        commit_state(&mut body, &state, 0);

        // Corrupt fields kept their old values, healthy fields were written.
        assert_eq!(body.position, Vec2::new(1.0, 2.0));
        assert_eq!(body.angular_velocity, 0.0);
        assert_eq!(body.angle, 0.5);
        assert_eq!(body.linear_velocity, Vec2::new(7.0, 8.0));
        assert_eq!(body.local_position, Vec2::new(9.0, 9.0));
    }

    #[test]
    fn relocalization_uses_parent_inverse() {
        struct OffsetParent;
        impl TransformHierarchy for OffsetParent {
            fn parent_inverse_world(&self, _body: BodyId) -> Option<Transform2> {
                // Parent sits at (10, 0) with no rotation; its inverse
                // subtracts that offset.
                Some(Transform2::new(Vec2::new(-10.0, 0.0), 0.0))
            }
        }

        let mut world = WorldState::new();
        let id = world.add_body(Body::dynamic(Vec2::new(12.0, 0.0), 1.0, 1.0));
        world.body_mut(id).unwrap().ignore_gravity = true;

        let mut stepper = Stepper::new();
        let config = StepConfig::default();
        stepper
            .step(&mut world, &OffsetParent, &config, 1.0 / 60.0, false)
            .unwrap();

        let body = world.body(id).unwrap();
        assert!((body.local_position.x - 2.0).abs() < 1e-5);
        assert_eq!(body.position.x, 12.0);
    }

    #[test]
    fn forces_are_cleared_after_integration() {
        let mut world = WorldState::new();
        let id = world.add_body(Body::dynamic(Vec2::ZERO, 2.0, 1.0));
        world.body_mut(id).unwrap().ignore_gravity = true;
        world.body_mut(id).unwrap().apply_force(Vec2::new(12.0, 0.0));

        let mut stepper = Stepper::new();
        let config = StepConfig::default();
        let dt = 1.0 / 60.0;
        stepper
            .step(&mut world, &NoHierarchy, &config, dt, false)
            .unwrap();

        let body = world.body(id).unwrap();
        // a = F/m = 6 m/s²; one step of dt seconds.
        assert!((body.linear_velocity.x - 6.0 * dt).abs() < 1e-5);
        assert_eq!(body.force, Vec2::ZERO);
    }
}
