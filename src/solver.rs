//! Per-Island Constraint Solver
//!
//! Runs the full solve pipeline for one island against its disjoint slice of
//! the shared result buffer: force integration, warm-started sequential
//! impulse velocity solving for joints and contacts, capped position
//! integration, full nonlinear Gauss-Seidel position correction, and
//! re-localization of the solved poses into parent space.
//!
//! The island's bodies, contacts, and joints are read through the world; the
//! only mutable state is the island itself and its `BodyState` slice, which
//! is what makes islands safe to solve concurrently.
//!
//! Author: Moroya Sakamoto

use glam::Vec2;

use crate::body::{Body, BodyKind};
use crate::config::{BAUMGARTE, LINEAR_SLOP, StepConfig, VELOCITY_THRESHOLD};
use crate::contact::{Contact, ContactId, MAX_CONTACT_POINTS};
use crate::island::{ConstraintRef, Island};
use crate::joint::JointConstraint;
use crate::math::{Rot2, cross_scalar_vec};
use crate::scratch::BodyState;
use crate::world::{TransformHierarchy, WorldState};

/// Shared read-only inputs for one step's solve phase.
pub(crate) struct SolveContext<'a> {
    pub world: &'a WorldState,
    pub config: &'a StepConfig,
    pub dt: f32,
    pub inv_dt: f32,
}

// ============================================================================
// Contact Constraints (Solver Side)
// ============================================================================

/// Per-point velocity/position constraint state.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ContactConstraintPoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    /// Accumulated normal impulse, stored back to the contact at commit
    pub normal_impulse: f32,
    /// Accumulated tangent impulse, stored back to the contact at commit
    pub tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

/// Per-step constraint state for one contact, island-local.
#[derive(Clone, Debug)]
pub(crate) struct ContactConstraint {
    /// Contact this constraint was built from
    pub contact: ContactId,
    /// Island-local index of body A's state
    pub a: usize,
    /// Island-local index of body B's state
    pub b: usize,
    local_normal: Vec2,
    normal: Vec2,
    friction: f32,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    pub points: [ContactConstraintPoint; MAX_CONTACT_POINTS],
    pub point_count: usize,
}

impl ContactConstraint {
    /// Build normal/tangent effective masses and the restitution bias from
    /// the current island state.
    pub fn initialize(
        contact: &Contact,
        cref: &ConstraintRef,
        body_a: &Body,
        body_b: &Body,
        states: &[BodyState],
        warm_starting: bool,
    ) -> Self {
        let a = cref.local_a as usize;
        let b = cref.local_b as usize;
        let sa = &states[a];
        let sb = &states[b];
        let rot_a = Rot2::from_angle(sa.angle);
        let rot_b = Rot2::from_angle(sb.angle);
        let (m_a, m_b) = (body_a.inv_mass, body_b.inv_mass);
        let (i_a, i_b) = (body_a.inv_inertia, body_b.inv_inertia);

        let normal = rot_a.apply(contact.local_normal);
        let tangent = normal.perp();

        let mut points = [ContactConstraintPoint::default(); MAX_CONTACT_POINTS];
        for (j, point) in points.iter_mut().enumerate().take(contact.point_count) {
            let cp = &contact.points[j];
            let world_a = sa.position + rot_a.apply(cp.local_anchor_a);
            let world_b = sb.position + rot_b.apply(cp.local_anchor_b);
            let mid = 0.5 * (world_a + world_b);
            let r_a = mid - sa.position;
            let r_b = mid - sb.position;

            let rn_a = r_a.perp_dot(normal);
            let rn_b = r_b.perp_dot(normal);
            let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

            let rt_a = r_a.perp_dot(tangent);
            let rt_b = r_b.perp_dot(tangent);
            let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;

            // Restitution bias from the pre-solve approach speed.
            let v_rel = normal.dot(
                sb.linear_velocity + cross_scalar_vec(sb.angular_velocity, r_b)
                    - sa.linear_velocity
                    - cross_scalar_vec(sa.angular_velocity, r_a),
            );
            let velocity_bias = if v_rel < -VELOCITY_THRESHOLD {
                -contact.restitution * v_rel
            } else {
                0.0
            };

            let (normal_impulse, tangent_impulse) = if warm_starting {
                (cp.normal_impulse, cp.tangent_impulse)
            } else {
                (0.0, 0.0)
            };

            *point = ContactConstraintPoint {
                local_anchor_a: cp.local_anchor_a,
                local_anchor_b: cp.local_anchor_b,
                r_a,
                r_b,
                normal_impulse,
                tangent_impulse,
                normal_mass: if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 },
                tangent_mass: if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 },
                velocity_bias,
            };
        }

        Self {
            contact: cref.index,
            a,
            b,
            local_normal: contact.local_normal,
            normal,
            friction: contact.friction,
            inv_mass_a: m_a,
            inv_mass_b: m_b,
            inv_inertia_a: i_a,
            inv_inertia_b: i_b,
            points,
            point_count: contact.point_count,
        }
    }

    /// Apply the accumulated impulses carried over from the previous step.
    pub fn warm_start(&self, states: &mut [BodyState]) {
        let tangent = self.normal.perp();
        for point in &self.points[..self.point_count] {
            let p = point.normal_impulse * self.normal + point.tangent_impulse * tangent;

            let sa = &mut states[self.a];
            sa.linear_velocity -= self.inv_mass_a * p;
            sa.angular_velocity -= self.inv_inertia_a * point.r_a.perp_dot(p);

            let sb = &mut states[self.b];
            sb.linear_velocity += self.inv_mass_b * p;
            sb.angular_velocity += self.inv_inertia_b * point.r_b.perp_dot(p);
        }
    }

    /// One sequential-impulse sweep. Friction is solved before the normal
    /// constraint, both with accumulated-impulse clamping.
    pub fn solve_velocity(&mut self, states: &mut [BodyState]) {
        let mut v_a = states[self.a].linear_velocity;
        let mut w_a = states[self.a].angular_velocity;
        let mut v_b = states[self.b].linear_velocity;
        let mut w_b = states[self.b].angular_velocity;

        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_inertia_a, self.inv_inertia_b);
        let normal = self.normal;
        let tangent = normal.perp();

        for point in &mut self.points[..self.point_count] {
            let dv = v_b + cross_scalar_vec(w_b, point.r_b)
                - v_a
                - cross_scalar_vec(w_a, point.r_a);
            let vt = dv.dot(tangent);
            let lambda = point.tangent_mass * -vt;

            let max_friction = self.friction * point.normal_impulse;
            let new_impulse = (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
            let lambda = new_impulse - point.tangent_impulse;
            point.tangent_impulse = new_impulse;

            let p = lambda * tangent;
            v_a -= m_a * p;
            w_a -= i_a * point.r_a.perp_dot(p);
            v_b += m_b * p;
            w_b += i_b * point.r_b.perp_dot(p);
        }

        for point in &mut self.points[..self.point_count] {
            let dv = v_b + cross_scalar_vec(w_b, point.r_b)
                - v_a
                - cross_scalar_vec(w_a, point.r_a);
            let vn = dv.dot(normal);
            let lambda = -point.normal_mass * (vn - point.velocity_bias);

            let new_impulse = (point.normal_impulse + lambda).max(0.0);
            let lambda = new_impulse - point.normal_impulse;
            point.normal_impulse = new_impulse;

            let p = lambda * normal;
            v_a -= m_a * p;
            w_a -= i_a * point.r_a.perp_dot(p);
            v_b += m_b * p;
            w_b += i_b * point.r_b.perp_dot(p);
        }

        states[self.a].linear_velocity = v_a;
        states[self.a].angular_velocity = w_a;
        states[self.b].linear_velocity = v_b;
        states[self.b].angular_velocity = w_b;
    }

    /// One nonlinear Gauss-Seidel sweep over this contact's points. The
    /// separation, Jacobian, and effective mass are recomputed from the
    /// current iterate. Returns the worst separation seen.
    pub fn solve_position(&self, states: &mut [BodyState], config: &StepConfig) -> f32 {
        let mut c_a = states[self.a].position;
        let mut a_a = states[self.a].angle;
        let mut c_b = states[self.b].position;
        let mut a_b = states[self.b].angle;

        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_inertia_a, self.inv_inertia_b);

        let mut min_separation = 0.0_f32;

        for point in &self.points[..self.point_count] {
            let rot_a = Rot2::from_angle(a_a);
            let rot_b = Rot2::from_angle(a_b);
            let world_a = c_a + rot_a.apply(point.local_anchor_a);
            let world_b = c_b + rot_b.apply(point.local_anchor_b);
            let normal = rot_a.apply(self.local_normal);
            let separation = (world_b - world_a).dot(normal);
            let mid = 0.5 * (world_a + world_b);
            let r_a = mid - c_a;
            let r_b = mid - c_b;

            min_separation = min_separation.min(separation);

            let c = (BAUMGARTE * (separation + LINEAR_SLOP))
                .clamp(-config.max_linear_correction, 0.0);

            let rn_a = r_a.perp_dot(normal);
            let rn_b = r_b.perp_dot(normal);
            let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
            let impulse = if k > 0.0 { -c / k } else { 0.0 };
            let p = impulse * normal;

            c_a -= m_a * p;
            a_a -= i_a * r_a.perp_dot(p);
            c_b += m_b * p;
            a_b += i_b * r_b.perp_dot(p);
        }

        states[self.a].position = c_a;
        states[self.a].angle = a_a;
        states[self.b].position = c_b;
        states[self.b].angle = a_b;

        min_separation
    }
}

// ============================================================================
// Island Solve Pipeline
// ============================================================================

/// Integrate one body's velocity into its pose, scaling the velocity down
/// first when the integrated translation or rotation would exceed the caps.
fn integrate_position(state: &mut BodyState, dt: f32, config: &StepConfig) {
    let mut v = state.linear_velocity;
    let mut w = state.angular_velocity;

    let translation = v * dt;
    let max_translation_sq = config.max_linear_velocity * config.max_linear_velocity;
    if translation.length_squared() > max_translation_sq {
        v *= config.max_linear_velocity / translation.length();
    }
    let rotation = w * dt;
    if rotation * rotation > config.max_angular_velocity * config.max_angular_velocity {
        w *= config.max_angular_velocity / rotation.abs();
    }

    state.linear_velocity = v;
    state.angular_velocity = w;
    state.position += v * dt;
    state.angle += w * dt;
}

/// Solve one island in place. `states` is the island's disjoint slice of the
/// shared result buffer, already snapshotted from the live bodies.
pub(crate) fn solve_island<H: TransformHierarchy>(
    island: &mut Island,
    states: &mut [BodyState],
    ctx: &SolveContext<'_>,
    hierarchy: &H,
) {
    let config = ctx.config;
    let dt = ctx.dt;

    // Force integration, dynamic bodies only.
    for (i, &id) in island.bodies.iter().enumerate() {
        let Some(body) = ctx.world.body(id) else { continue };
        if body.kind != BodyKind::Dynamic {
            continue;
        }
        let state = &mut states[i];
        let mut v = state.linear_velocity;
        let mut w = state.angular_velocity;
        if !body.ignore_gravity {
            v += dt * config.gravity;
        }
        v += dt * body.inv_mass * body.force;
        w += dt * body.inv_inertia * body.torque;
        v *= (1.0 - dt * body.linear_damping).clamp(0.0, 1.0);
        w *= (1.0 - dt * body.angular_damping).clamp(0.0, 1.0);
        state.linear_velocity = v;
        state.angular_velocity = w;
    }

    // Constraint setup from the current positions and velocities.
    island.contact_constraints.clear();
    for cref in &island.contacts {
        let contact = &ctx.world.contacts[cref.index];
        let (Some(body_a), Some(body_b)) =
            (ctx.world.body(contact.body_a), ctx.world.body(contact.body_b))
        else {
            continue;
        };
        island.contact_constraints.push(ContactConstraint::initialize(
            contact,
            cref,
            body_a,
            body_b,
            states,
            config.warm_starting,
        ));
    }
    island.joint_constraints.clear();
    for jref in &island.joints {
        let joint = &ctx.world.joints[jref.index];
        let (Some(body_a), Some(body_b)) =
            (ctx.world.body(joint.body_a), ctx.world.body(joint.body_b))
        else {
            continue;
        };
        island.joint_constraints.push(JointConstraint::initialize(
            joint,
            jref.index,
            jref.local_a as usize,
            jref.local_b as usize,
            body_a,
            body_b,
            states,
            config.warm_starting,
        ));
    }

    if config.warm_starting {
        for jc in &island.joint_constraints {
            jc.warm_start(states);
        }
        for cc in &island.contact_constraints {
            cc.warm_start(states);
        }
    }

    // Velocity iterations: joints (with break validation) then one
    // sequential-impulse sweep over the contacts, in island order.
    for _ in 0..config.velocity_iterations {
        for k in 0..island.joint_constraints.len() {
            let jc = &mut island.joint_constraints[k];
            let joint = &ctx.world.joints[jc.joint];
            if !joint.enabled {
                continue;
            }
            jc.solve_velocity(states);
            let force = jc.reaction_force(ctx.inv_dt);
            if force > joint.breaking_force {
                let id = jc.joint;
                island.record_broken(id, force);
            }
        }
        for cc in &mut island.contact_constraints {
            cc.solve_velocity(states);
        }
    }
    // Accumulated impulses stay in the constraints; the sequential commit
    // stores them back onto the contacts and joints for warm starting.

    for state in states.iter_mut() {
        integrate_position(state, dt, config);
    }

    // Full NGS position correction: every round recomputes each constraint's
    // error, Jacobian, and effective mass from the current iterate.
    let mut solved =
        island.contact_constraints.is_empty() && island.joint_constraints.is_empty();
    for _ in 0..config.position_iterations {
        let mut min_separation = 0.0_f32;
        for cc in &island.contact_constraints {
            min_separation = min_separation.min(cc.solve_position(states, config));
        }
        let contacts_ok = min_separation >= -3.0 * LINEAR_SLOP;

        let mut joints_ok = true;
        for jc in &island.joint_constraints {
            joints_ok &= jc.solve_position(states, config);
        }

        if contacts_ok && joints_ok {
            solved = true;
            break;
        }
    }
    island.position_solved = solved;

    // Re-localize: express the solved world pose in the parent's frame so the
    // sequential commit can write local poses without touching the scene
    // graph again.
    for (i, &id) in island.bodies.iter().enumerate() {
        let state = &mut states[i];
        match hierarchy.parent_inverse_world(id) {
            Some(inv) => {
                state.local_position = inv.apply_point(state.position);
                state.local_angle = state.angle + inv.angle();
            }
            None => {
                state.local_position = state.position;
                state.local_angle = state.angle;
            }
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
    use crate::island::ConstraintRef;

    fn state_at(position: Vec2, velocity: Vec2) -> BodyState {
        BodyState {
            position,
            angle: 0.0,
            linear_velocity: velocity,
            angular_velocity: 0.0,
            local_position: position,
            local_angle: 0.0,
        }
    }

    fn head_on_constraint(restitution: f32, states: &[BodyState]) -> ContactConstraint {
        let body_a = Body::dynamic(Vec2::ZERO, 1.0, 1.0);
        let body_b = Body::dynamic(Vec2::new(1.0, 0.0), 1.0, 1.0);
        let contact = Contact::new(0, 1, Vec2::X)
            .with_point(Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0))
            .with_material(0.0, restitution);
        let cref = ConstraintRef {
            index: 0,
            local_a: 0,
            local_b: 1,
        };
        ContactConstraint::initialize(&contact, &cref, &body_a, &body_b, states, false)
    }

    #[test]
    fn contact_solve_removes_approach_velocity() {
        // B approaches A at 2 m/s along the contact normal.
        let mut states = vec![
            state_at(Vec2::ZERO, Vec2::ZERO),
            state_at(Vec2::new(1.0, 0.0), Vec2::new(-2.0, 0.0)),
        ];
        let mut constraint = head_on_constraint(0.0, &states);

        for _ in 0..8 {
            constraint.solve_velocity(&mut states);
        }

        let vn = (states[1].linear_velocity - states[0].linear_velocity).dot(Vec2::X);
        assert!(vn >= -1e-4, "bodies still approaching: {vn}");
        assert!(constraint.points[0].normal_impulse > 0.0);
    }

    #[test]
    fn restitution_reflects_fast_approach() {
        let mut states = vec![
            state_at(Vec2::ZERO, Vec2::ZERO),
            state_at(Vec2::new(1.0, 0.0), Vec2::new(-4.0, 0.0)),
        ];
        let mut constraint = head_on_constraint(1.0, &states);

        for _ in 0..16 {
            constraint.solve_velocity(&mut states);
        }

        // Perfectly elastic: the 4 m/s approach becomes a 4 m/s separation.
        let vn = (states[1].linear_velocity - states[0].linear_velocity).dot(Vec2::X);
        assert!((vn - 4.0).abs() < 0.05, "separation speed: {vn}");
    }

    #[test]
    fn ngs_pushes_out_of_penetration() {
        // Anchors interpenetrate by 0.1 m along the normal.
        let mut states = vec![
            state_at(Vec2::ZERO, Vec2::ZERO),
            state_at(Vec2::new(0.9, 0.0), Vec2::ZERO),
        ];
        let constraint = head_on_constraint(0.0, &states);

        let config = StepConfig::default();
        let mut min_separation = f32::MIN;
        for _ in 0..20 {
            min_separation = constraint.solve_position(&mut states, &config);
            if min_separation >= -3.0 * LINEAR_SLOP {
                break;
            }
        }
        assert!(
            min_separation >= -3.0 * LINEAR_SLOP,
            "still penetrating: {min_separation}"
        );
        assert!(states[1].position.x > 0.9);
        assert!(states[0].position.x < 0.0);
    }

    #[test]
    fn velocity_caps_scale_velocity_not_position() {
        let config = StepConfig {
            max_linear_velocity: 0.1,
            ..StepConfig::default()
        };
        let mut state = state_at(Vec2::ZERO, Vec2::new(1000.0, 0.0));
        integrate_position(&mut state, 1.0 / 60.0, &config);

        // The translation this step is exactly the cap, and the stored
        // velocity was scaled to match.
        assert!((state.position.x - 0.1).abs() < 1e-4);
        assert!((state.linear_velocity.x - 0.1 * 60.0).abs() < 1e-2);
    }

    #[test]
    fn angular_cap_scales_spin() {
        let config = StepConfig {
            max_angular_velocity: 0.25,
            ..StepConfig::default()
        };
        let mut state = state_at(Vec2::ZERO, Vec2::ZERO);
        state.angular_velocity = -500.0;
        integrate_position(&mut state, 1.0 / 60.0, &config);
        assert!((state.angle + 0.25).abs() < 1e-4);
    }
}
