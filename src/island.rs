//! Island Construction
//!
//! Partitions the awake, collidable, non-static bodies into connected
//! components using touching contacts and enabled joints as edges. Each
//! component becomes an [`Island`] solved independently; bodies with no
//! edges at all are merged into one shared lone-island bucket.
//!
//! Traversal is an explicit index-stack depth-first search over stable body
//! indices. Per-step visited marks live in builder-owned bitsets, never on
//! the entities themselves. Static bodies anchor constraints but do not
//! propagate connectivity: they are appended to the island without scanning
//! their edges, and their visited marks are released when the island
//! completes so later islands can include them again.

use crate::body::{BodyId, BodyKind};
use crate::contact::ContactId;
use crate::error::PhysicsError;
use crate::joint::{JointConstraint, JointId};
use crate::scratch::{BitSet, IslandPool};
use crate::solver::ContactConstraint;
use crate::world::WorldState;

/// A constraint assigned to an island, with the island-local indices of its
/// endpoint bodies baked in after construction.
#[derive(Clone, Copy, Debug)]
pub struct ConstraintRef {
    /// Index into the world's contact or joint list
    pub index: usize,
    /// Island-local index of the first endpoint's state
    pub local_a: u32,
    /// Island-local index of the second endpoint's state
    pub local_b: u32,
}

/// One connected component of interacting bodies, or the shared lone bucket.
/// Ephemeral: built fresh each step from pooled containers.
#[derive(Clone, Debug, Default)]
pub struct Island {
    /// Member bodies in discovery order
    pub bodies: Vec<BodyId>,
    /// Contacts assigned to this island
    pub contacts: Vec<ConstraintRef>,
    /// Joints assigned to this island
    pub joints: Vec<ConstraintRef>,
    /// Start of this island's range in the shared result buffer
    pub offset: usize,
    /// Joints whose reaction force exceeded their breaking force, with the
    /// worst force observed
    pub broken: Vec<(JointId, f32)>,
    /// Position correction converged within the iteration budget
    pub position_solved: bool,
    /// This is the shared bucket of unconnected bodies
    pub lone: bool,
    /// Per-step contact constraint scratch, pooled with the island
    pub(crate) contact_constraints: Vec<ContactConstraint>,
    /// Per-step joint constraint scratch, pooled with the island
    pub(crate) joint_constraints: Vec<JointConstraint>,
}

impl Island {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for reuse; keeps allocations.
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.offset = 0;
        self.broken.clear();
        self.position_solved = false;
        self.lone = false;
        self.contact_constraints.clear();
        self.joint_constraints.clear();
    }

    /// Load-balance heuristic for scheduling.
    #[inline]
    #[must_use]
    pub fn cost(&self) -> usize {
        self.contacts.len() + self.joints.len()
    }

    /// Record a joint over its breaking force, keeping the worst error.
    pub(crate) fn record_broken(&mut self, joint: JointId, error: f32) {
        if let Some(entry) = self.broken.iter_mut().find(|(id, _)| *id == joint) {
            entry.1 = entry.1.max(error);
        } else {
            self.broken.push((joint, error));
        }
    }
}

// ============================================================================
// IslandBuilder
// ============================================================================

/// Builds the step's islands. Owns all traversal scratch so construction
/// allocates nothing in the steady state.
#[derive(Debug, Default)]
pub struct IslandBuilder {
    visited: BitSet,
    contact_assigned: BitSet,
    joint_assigned: BitSet,
    contacts_by_body: Vec<Vec<ContactId>>,
    joints_by_body: Vec<Vec<JointId>>,
    stack: Vec<BodyId>,
    static_marks: Vec<BodyId>,
    local_index: Vec<u32>,
}

impl IslandBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition the world's awake set into islands, appended to `out`.
    /// Containers are rented from `pool`; the caller returns them after the
    /// step.
    pub fn build(
        &mut self,
        world: &WorldState,
        is_prediction: bool,
        pool: &mut IslandPool,
        out: &mut Vec<Island>,
    ) -> Result<(), PhysicsError> {
        let body_count = world.bodies.len();
        self.visited.reset(body_count);
        self.contact_assigned.reset(world.contacts.len());
        self.joint_assigned.reset(world.joints.len());
        self.local_index.resize(body_count, 0);
        self.build_adjacency(world);

        let mut lone: Option<Island> = None;

        for seed in 0..body_count {
            let Some(body) = world.body(seed) else { continue };
            if !body.awake
                || self.visited.contains(seed)
                || (body.paused && !body.pause_exempt)
                || (is_prediction && !body.predict)
                || !body.collidable
                || body.kind == BodyKind::Static
            {
                continue;
            }

            let mut island = match pool.rent() {
                Ok(island) => island,
                Err(err) => {
                    // Keep the pool balanced on the failure path; the caller
                    // returns the islands already in `out`.
                    if let Some(bucket) = lone.take() {
                        pool.give_back(bucket);
                    }
                    return Err(err);
                }
            };
            self.stack.clear();
            self.static_marks.clear();
            self.stack.push(seed);
            self.visited.set(seed);

            while let Some(id) = self.stack.pop() {
                let Some(body) = world.body(id) else { continue };
                island.bodies.push(id);

                if body.kind == BodyKind::Static {
                    // Statics anchor the island but never extend it. The mark
                    // is released below so other islands may reuse this body.
                    self.static_marks.push(id);
                    continue;
                }

                for &cid in &self.contacts_by_body[id] {
                    if self.contact_assigned.contains(cid) {
                        continue;
                    }
                    let contact = &world.contacts[cid];
                    if !contact.enabled || !contact.touching || !contact.is_solid() {
                        continue;
                    }
                    let other = contact.other(id);
                    if world.body(other).is_none() {
                        log::warn!(
                            "contact {cid} references missing body {other}; purging from awake set"
                        );
                        self.contact_assigned.set(cid);
                        continue;
                    }
                    self.contact_assigned.set(cid);
                    island.contacts.push(ConstraintRef {
                        index: cid,
                        local_a: 0,
                        local_b: 0,
                    });
                    if !self.visited.contains(other) {
                        self.visited.set(other);
                        self.stack.push(other);
                    }
                }

                for &jid in &self.joints_by_body[id] {
                    if self.joint_assigned.contains(jid) {
                        continue;
                    }
                    let joint = &world.joints[jid];
                    if !joint.enabled {
                        continue;
                    }
                    let other = joint.other(id);
                    let Some(other_body) = world.body(other) else {
                        log::warn!(
                            "joint {jid} references missing body {other}; purging from awake set"
                        );
                        self.joint_assigned.set(jid);
                        continue;
                    };
                    if !other_body.collidable {
                        continue;
                    }
                    self.joint_assigned.set(jid);
                    island.joints.push(ConstraintRef {
                        index: jid,
                        local_a: 0,
                        local_b: 0,
                    });
                    if !self.visited.contains(other) {
                        self.visited.set(other);
                        self.stack.push(other);
                    }
                }
            }

            for &id in &self.static_marks {
                self.visited.unset(id);
            }

            if island.bodies.len() == 1 && island.contacts.is_empty() && island.joints.is_empty() {
                // Unconnected body: merge into the shared lone bucket.
                let body = island.bodies[0];
                island.clear();
                pool.give_back(island);
                if lone.is_none() {
                    let mut bucket = pool.rent()?;
                    bucket.lone = true;
                    lone = Some(bucket);
                }
                lone.as_mut().unwrap().bodies.push(body);
            } else {
                self.bake_local_indices(world, &mut island);
                out.push(island);
            }
        }

        if let Some(bucket) = lone {
            out.push(bucket);
        }
        Ok(())
    }

    /// Per-body edge lists, rebuilt each step from the flat contact/joint
    /// arrays. Endpoints pointing at removed bodies keep the edge on the
    /// surviving side so traversal can log and purge it.
    fn build_adjacency(&mut self, world: &WorldState) {
        let n = world.bodies.len();
        self.contacts_by_body.resize_with(n, Vec::new);
        self.joints_by_body.resize_with(n, Vec::new);
        for list in &mut self.contacts_by_body {
            list.clear();
        }
        for list in &mut self.joints_by_body {
            list.clear();
        }

        for (cid, contact) in world.contacts.iter().enumerate() {
            if contact.body_a < n {
                self.contacts_by_body[contact.body_a].push(cid);
            }
            if contact.body_b < n {
                self.contacts_by_body[contact.body_b].push(cid);
            }
        }
        for (jid, joint) in world.joints.iter().enumerate() {
            if joint.body_a < n {
                self.joints_by_body[joint.body_a].push(jid);
            }
            if joint.body_b < n {
                self.joints_by_body[joint.body_b].push(jid);
            }
        }
    }

    /// Record each body's index within its island's local arrays and bake
    /// those indices into the island's constraint references. Statics get a
    /// fresh local index in every island that includes them, so this runs
    /// per island while the entries are hot.
    fn bake_local_indices(&mut self, world: &WorldState, island: &mut Island) {
        for (local, &body) in island.bodies.iter().enumerate() {
            self.local_index[body] = local as u32;
        }
        for cref in &mut island.contacts {
            let contact = &world.contacts[cref.index];
            cref.local_a = self.local_index[contact.body_a];
            cref.local_b = self.local_index[contact.body_b];
        }
        for jref in &mut island.joints {
            let joint = &world.joints[jref.index];
            jref.local_a = self.local_index[joint.body_a];
            jref.local_b = self.local_index[joint.body_b];
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::contact::Contact;
    use crate::joint::Joint;
    use glam::Vec2;

    fn build(world: &WorldState) -> Vec<Island> {
        let mut builder = IslandBuilder::new();
        let mut pool = IslandPool::new();
        let mut out = Vec::new();
        builder.build(world, false, &mut pool, &mut out).unwrap();
        out
    }

    #[test]
    fn touching_pair_forms_one_island() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        world.contacts.push(Contact::new(a, b, Vec2::X).with_point(Vec2::ZERO, Vec2::ZERO));

        let islands = build(&world);
        assert_eq!(islands.len(), 1);
        assert!(!islands[0].lone);
        assert_eq!(islands[0].bodies.len(), 2);
        assert_eq!(islands[0].contacts.len(), 1);
    }

    #[test]
    fn static_body_does_not_propagate() {
        // Two dynamics resting on the same static ground, not touching each
        // other: two distinct islands, the static in both.
        let mut world = WorldState::new();
        let ground = world.add_body(Body::fixed(Vec2::ZERO));
        let left = world.add_body(Body::dynamic(Vec2::new(-1.0, 1.0), 1.0, 1.0));
        let right = world.add_body(Body::dynamic(Vec2::new(1.0, 1.0), 1.0, 1.0));
        world
            .contacts
            .push(Contact::new(left, ground, Vec2::Y).with_point(Vec2::ZERO, Vec2::ZERO));
        world
            .contacts
            .push(Contact::new(right, ground, Vec2::Y).with_point(Vec2::ZERO, Vec2::ZERO));

        let islands = build(&world);
        assert_eq!(islands.len(), 2);
        for island in &islands {
            assert_eq!(island.bodies.len(), 2);
            assert!(island.bodies.contains(&ground));
        }
        assert!(islands[0].bodies.iter().any(|&b| b == left) != islands[1].bodies.iter().any(|&b| b == left));
    }

    #[test]
    fn unconnected_bodies_share_lone_bucket() {
        let mut world = WorldState::new();
        world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        world.add_body(Body::dynamic(Vec2::new(5.0, 0.0), 1.0, 1.0));

        let islands = build(&world);
        assert_eq!(islands.len(), 1);
        assert!(islands[0].lone);
        assert_eq!(islands[0].bodies.len(), 2);
    }

    #[test]
    fn sensor_contact_is_not_an_edge() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        let mut contact = Contact::new(a, b, Vec2::X).with_point(Vec2::ZERO, Vec2::ZERO);
        contact.hard_a = false;
        world.contacts.push(contact);

        let islands = build(&world);
        assert_eq!(islands.len(), 1);
        assert!(islands[0].lone, "sensor pair must not couple bodies");
    }

    #[test]
    fn joint_to_missing_body_is_purged_not_fatal() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        world
            .joints
            .push(Joint::distance(a, b, Vec2::ZERO, Vec2::ZERO, 1.0));
        world.remove_body(b).unwrap();

        let islands = build(&world);
        assert_eq!(islands.len(), 1);
        assert!(islands[0].lone);
        assert_eq!(islands[0].bodies, vec![a]);
    }

    #[test]
    fn sleeping_and_paused_bodies_are_not_seeds() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        world.body_mut(a).unwrap().sleep();
        world.body_mut(b).unwrap().paused = true;

        let islands = build(&world);
        assert!(islands.is_empty());
    }

    #[test]
    fn prediction_opt_out_is_skipped_only_when_predicting() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        world.body_mut(a).unwrap().predict = false;

        let mut builder = IslandBuilder::new();
        let mut pool = IslandPool::new();

        let mut normal = Vec::new();
        builder.build(&world, false, &mut pool, &mut normal).unwrap();
        assert_eq!(normal.len(), 1);
        for island in normal.drain(..) {
            pool.give_back(island);
        }

        let mut predicted = Vec::new();
        builder.build(&world, true, &mut pool, &mut predicted).unwrap();
        assert!(predicted.is_empty());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let mut world = WorldState::new();
        let a = world.add_body(Body::dynamic(Vec2::ZERO, 1.0, 1.0));
        let b = world.add_body(Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0));
        let c = world.add_body(Body::dynamic(Vec2::new(9.0, 0.0), 1.0, 1.0));
        world.contacts.push(Contact::new(a, b, Vec2::X).with_point(Vec2::ZERO, Vec2::ZERO));
        world
            .joints
            .push(Joint::distance(b, c, Vec2::ZERO, Vec2::ZERO, 8.0));

        let first = build(&world);
        let second = build(&world);
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(&second) {
            let mut bodies_x = x.bodies.clone();
            let mut bodies_y = y.bodies.clone();
            bodies_x.sort_unstable();
            bodies_y.sort_unstable();
            assert_eq!(bodies_x, bodies_y);
        }
    }
}
