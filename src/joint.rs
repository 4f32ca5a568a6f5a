//! Joint Constraints
//!
//! Joints connect two bodies and remove degrees of freedom. Each kind carries
//! its own parameters and knows how to solve its velocity constraint
//! (sequential impulse) and its position constraint (nonlinear Gauss-Seidel,
//! with the Jacobian and effective mass recomputed from the current iterate
//! every round).
//!
//! # Joint Kinds
//!
//! - **Distance**: rigid rod between two anchor points.
//! - **Revolute**: pin joint, optionally with angle limits.
//!
//! A joint with a finite breaking force is reported (not removed) whenever
//! its reaction force exceeds that threshold; removal stays the owner's call.
//!
//! Author: Moroya Sakamoto

use glam::{Mat2, Vec2};

use crate::body::{Body, BodyId};
use crate::config::{ANGULAR_SLOP, LINEAR_SLOP, StepConfig};
use crate::math::{Rot2, cross_scalar_vec};
use crate::scratch::BodyState;

/// Stable joint index inside [`WorldState`](crate::world::WorldState).
pub type JointId = usize;

/// Inclusive angle bounds for a revolute joint, radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngleLimits {
    pub lower: f32,
    pub upper: f32,
}

/// Kind-specific joint parameters.
#[derive(Clone, Debug)]
pub enum JointKind {
    /// Rigid rod keeping two anchor points at a fixed distance.
    Distance {
        /// Anchor in body A's local frame
        local_anchor_a: Vec2,
        /// Anchor in body B's local frame
        local_anchor_b: Vec2,
        /// Target distance between the world anchors, meters
        rest_length: f32,
    },
    /// Pin joint forcing two anchor points to coincide.
    Revolute {
        /// Anchor in body A's local frame
        local_anchor_a: Vec2,
        /// Anchor in body B's local frame
        local_anchor_b: Vec2,
        /// Rest angle of B relative to A, radians
        reference_angle: f32,
        /// Optional relative-angle bounds
        limits: Option<AngleLimits>,
    },
}

/// A two-body joint constraint.
#[derive(Clone, Debug)]
pub struct Joint {
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Kind-specific parameters
    pub kind: JointKind,
    /// The joint participates in solving and island building
    pub enabled: bool,
    /// Reaction force above which the joint is reported as broken.
    /// `f32::INFINITY` means unbreakable.
    pub breaking_force: f32,
    /// Accumulated constraint impulse (warm start seed). Distance joints use
    /// only the x component.
    pub impulse: Vec2,
    /// Accumulated angle-limit impulse (warm start seed)
    pub limit_impulse: f32,
}

impl Joint {
    /// A rigid rod between two local anchors.
    #[must_use]
    pub fn distance(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        rest_length: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            kind: JointKind::Distance {
                local_anchor_a,
                local_anchor_b,
                rest_length,
            },
            enabled: true,
            breaking_force: f32::INFINITY,
            impulse: Vec2::ZERO,
            limit_impulse: 0.0,
        }
    }

    /// A pin joint between two local anchors.
    #[must_use]
    pub fn revolute(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
    ) -> Self {
        Self {
            body_a,
            body_b,
            kind: JointKind::Revolute {
                local_anchor_a,
                local_anchor_b,
                reference_angle: 0.0,
                limits: None,
            },
            enabled: true,
            breaking_force: f32::INFINITY,
            impulse: Vec2::ZERO,
            limit_impulse: 0.0,
        }
    }

    /// Builder-style breaking-force assignment.
    #[must_use]
    pub fn with_breaking_force(mut self, force: f32) -> Self {
        self.breaking_force = force;
        self
    }

    /// Builder-style angle limits for revolute joints. No effect on other
    /// kinds.
    #[must_use]
    pub fn with_angle_limits(mut self, lower: f32, upper: f32) -> Self {
        if let JointKind::Revolute { limits, .. } = &mut self.kind {
            *limits = Some(AngleLimits { lower, upper });
        }
        self
    }

    /// The endpoint that is not `body`.
    #[inline]
    #[must_use]
    pub fn other(&self, body: BodyId) -> BodyId {
        if body == self.body_a {
            self.body_b
        } else {
            self.body_a
        }
    }
}

// ============================================================================
// Solver-Side Constraint State
// ============================================================================

/// Angle-limit engagement computed at setup from the current relative angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LimitState {
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

#[derive(Clone, Debug)]
pub(crate) enum JointConstraintKind {
    Distance {
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        rest_length: f32,
        axis: Vec2,
        mass: f32,
    },
    Revolute {
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        reference_angle: f32,
        limits: Option<AngleLimits>,
        mass: Mat2,
        motor_mass: f32,
        limit_state: LimitState,
    },
}

/// Per-step velocity/position constraint state for one joint, island-local.
#[derive(Clone, Debug)]
pub(crate) struct JointConstraint {
    /// Joint this constraint was built from
    pub joint: JointId,
    /// Island-local index of body A's state
    pub a: usize,
    /// Island-local index of body B's state
    pub b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_inertia_a: f32,
    inv_inertia_b: f32,
    r_a: Vec2,
    r_b: Vec2,
    /// Accumulated impulse, stored back to the joint at commit
    pub impulse: Vec2,
    /// Accumulated limit impulse, stored back at commit
    pub limit_impulse: f32,
    kind: JointConstraintKind,
}

fn invert_2x2(k: Mat2) -> Mat2 {
    let det = k.determinant();
    if det != 0.0 {
        k.inverse()
    } else {
        Mat2::ZERO
    }
}

impl JointConstraint {
    /// Build the velocity constraint from the current island state.
    pub fn initialize(
        joint: &Joint,
        joint_id: JointId,
        a: usize,
        b: usize,
        body_a: &Body,
        body_b: &Body,
        states: &[BodyState],
        warm_starting: bool,
    ) -> Self {
        let sa = &states[a];
        let sb = &states[b];
        let rot_a = Rot2::from_angle(sa.angle);
        let rot_b = Rot2::from_angle(sb.angle);
        let (m_a, m_b) = (body_a.inv_mass, body_b.inv_mass);
        let (i_a, i_b) = (body_a.inv_inertia, body_b.inv_inertia);

        let (r_a, r_b, kind) = match &joint.kind {
            JointKind::Distance {
                local_anchor_a,
                local_anchor_b,
                rest_length,
            } => {
                let r_a = rot_a.apply(*local_anchor_a);
                let r_b = rot_b.apply(*local_anchor_b);
                let d = (sb.position + r_b) - (sa.position + r_a);
                let length = d.length();
                let axis = if length > LINEAR_SLOP { d / length } else { Vec2::ZERO };
                let cr_a = r_a.perp_dot(axis);
                let cr_b = r_b.perp_dot(axis);
                let inv_mass = m_a + m_b + i_a * cr_a * cr_a + i_b * cr_b * cr_b;
                let mass = if inv_mass > 0.0 { 1.0 / inv_mass } else { 0.0 };
                (
                    r_a,
                    r_b,
                    JointConstraintKind::Distance {
                        local_anchor_a: *local_anchor_a,
                        local_anchor_b: *local_anchor_b,
                        rest_length: *rest_length,
                        axis,
                        mass,
                    },
                )
            }
            JointKind::Revolute {
                local_anchor_a,
                local_anchor_b,
                reference_angle,
                limits,
            } => {
                let r_a = rot_a.apply(*local_anchor_a);
                let r_b = rot_b.apply(*local_anchor_b);
                let k = Mat2::from_cols(
                    Vec2::new(
                        m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                    ),
                    Vec2::new(
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                        m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
                    ),
                );
                let motor_inv_mass = i_a + i_b;
                let motor_mass = if motor_inv_mass > 0.0 {
                    1.0 / motor_inv_mass
                } else {
                    0.0
                };
                let limit_state = match limits {
                    None => LimitState::Inactive,
                    Some(lim) => {
                        let angle = sb.angle - sa.angle - reference_angle;
                        if (lim.upper - lim.lower).abs() < 2.0 * ANGULAR_SLOP {
                            LimitState::Equal
                        } else if angle <= lim.lower {
                            LimitState::AtLower
                        } else if angle >= lim.upper {
                            LimitState::AtUpper
                        } else {
                            LimitState::Inactive
                        }
                    }
                };
                (
                    r_a,
                    r_b,
                    JointConstraintKind::Revolute {
                        local_anchor_a: *local_anchor_a,
                        local_anchor_b: *local_anchor_b,
                        reference_angle: *reference_angle,
                        limits: *limits,
                        mass: invert_2x2(k),
                        motor_mass,
                        limit_state,
                    },
                )
            }
        };

        let (impulse, limit_impulse) = if warm_starting {
            (joint.impulse, joint.limit_impulse)
        } else {
            (Vec2::ZERO, 0.0)
        };

        Self {
            joint: joint_id,
            a,
            b,
            inv_mass_a: m_a,
            inv_mass_b: m_b,
            inv_inertia_a: i_a,
            inv_inertia_b: i_b,
            r_a,
            r_b,
            impulse,
            limit_impulse,
            kind,
        }
    }

    /// Apply the accumulated impulses carried over from the previous step.
    pub fn warm_start(&self, states: &mut [BodyState]) {
        let p = match &self.kind {
            JointConstraintKind::Distance { axis, .. } => self.impulse.x * *axis,
            JointConstraintKind::Revolute { .. } => self.impulse,
        };

        let sa = &mut states[self.a];
        sa.linear_velocity -= self.inv_mass_a * p;
        sa.angular_velocity -= self.inv_inertia_a * (self.r_a.perp_dot(p) + self.limit_impulse);

        let sb = &mut states[self.b];
        sb.linear_velocity += self.inv_mass_b * p;
        sb.angular_velocity += self.inv_inertia_b * (self.r_b.perp_dot(p) + self.limit_impulse);
    }

    /// One sequential-impulse sweep of the velocity constraint.
    pub fn solve_velocity(&mut self, states: &mut [BodyState]) {
        let mut v_a = states[self.a].linear_velocity;
        let mut w_a = states[self.a].angular_velocity;
        let mut v_b = states[self.b].linear_velocity;
        let mut w_b = states[self.b].angular_velocity;

        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_inertia_a, self.inv_inertia_b);

        match &mut self.kind {
            JointConstraintKind::Distance { axis, mass, .. } => {
                let vp_a = v_a + cross_scalar_vec(w_a, self.r_a);
                let vp_b = v_b + cross_scalar_vec(w_b, self.r_b);
                let c_dot = axis.dot(vp_b - vp_a);

                let lambda = -*mass * c_dot;
                self.impulse.x += lambda;

                let p = lambda * *axis;
                v_a -= m_a * p;
                w_a -= i_a * self.r_a.perp_dot(p);
                v_b += m_b * p;
                w_b += i_b * self.r_b.perp_dot(p);
            }
            JointConstraintKind::Revolute {
                mass,
                motor_mass,
                limit_state,
                ..
            } => {
                // Angle limit first, so the point constraint sees the
                // corrected angular velocities.
                if *limit_state != LimitState::Inactive {
                    let c_dot = w_b - w_a;
                    let mut lambda = -*motor_mass * c_dot;
                    match *limit_state {
                        LimitState::Equal => self.limit_impulse += lambda,
                        LimitState::AtLower => {
                            let new_impulse = (self.limit_impulse + lambda).max(0.0);
                            lambda = new_impulse - self.limit_impulse;
                            self.limit_impulse = new_impulse;
                        }
                        LimitState::AtUpper => {
                            let new_impulse = (self.limit_impulse + lambda).min(0.0);
                            lambda = new_impulse - self.limit_impulse;
                            self.limit_impulse = new_impulse;
                        }
                        LimitState::Inactive => unreachable!(),
                    }
                    w_a -= i_a * lambda;
                    w_b += i_b * lambda;
                }

                let c_dot = v_b + cross_scalar_vec(w_b, self.r_b)
                    - v_a
                    - cross_scalar_vec(w_a, self.r_a);
                let p = -(*mass * c_dot);
                self.impulse += p;

                v_a -= m_a * p;
                w_a -= i_a * self.r_a.perp_dot(p);
                v_b += m_b * p;
                w_b += i_b * self.r_b.perp_dot(p);
            }
        }

        states[self.a].linear_velocity = v_a;
        states[self.a].angular_velocity = w_a;
        states[self.b].linear_velocity = v_b;
        states[self.b].angular_velocity = w_b;
    }

    /// Magnitude of the constraint reaction force for the given inverse
    /// timestep. Compared against [`Joint::breaking_force`] after each
    /// velocity iteration.
    #[must_use]
    pub fn reaction_force(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointConstraintKind::Distance { .. } => self.impulse.x.abs() * inv_dt,
            JointConstraintKind::Revolute { .. } => self.impulse.length() * inv_dt,
        }
    }

    /// One nonlinear Gauss-Seidel round of the position constraint. Anchors,
    /// Jacobian, and effective mass are all recomputed from the current
    /// iterate. Returns whether the joint is within slop.
    pub fn solve_position(&self, states: &mut [BodyState], config: &StepConfig) -> bool {
        let mut c_a = states[self.a].position;
        let mut a_a = states[self.a].angle;
        let mut c_b = states[self.b].position;
        let mut a_b = states[self.b].angle;

        let (m_a, m_b) = (self.inv_mass_a, self.inv_mass_b);
        let (i_a, i_b) = (self.inv_inertia_a, self.inv_inertia_b);

        let converged = match &self.kind {
            JointConstraintKind::Distance {
                local_anchor_a,
                local_anchor_b,
                rest_length,
                ..
            } => {
                let r_a = Rot2::from_angle(a_a).apply(*local_anchor_a);
                let r_b = Rot2::from_angle(a_b).apply(*local_anchor_b);
                let d = (c_b + r_b) - (c_a + r_a);
                let length = d.length();
                let axis = if length > LINEAR_SLOP { d / length } else { Vec2::ZERO };

                let c = (length - rest_length)
                    .clamp(-config.max_linear_correction, config.max_linear_correction);

                let cr_a = r_a.perp_dot(axis);
                let cr_b = r_b.perp_dot(axis);
                let inv_mass = m_a + m_b + i_a * cr_a * cr_a + i_b * cr_b * cr_b;
                let impulse = if inv_mass > 0.0 { -c / inv_mass } else { 0.0 };
                let p = impulse * axis;

                c_a -= m_a * p;
                a_a -= i_a * r_a.perp_dot(p);
                c_b += m_b * p;
                a_b += i_b * r_b.perp_dot(p);

                c.abs() < LINEAR_SLOP
            }
            JointConstraintKind::Revolute {
                local_anchor_a,
                local_anchor_b,
                reference_angle,
                limits,
                motor_mass,
                limit_state,
                ..
            } => {
                let mut angular_error = 0.0;

                if let Some(lim) = limits {
                    if *limit_state != LimitState::Inactive {
                        let angle = a_b - a_a - reference_angle;
                        let c = match *limit_state {
                            LimitState::Equal => {
                                let c = (angle - lim.lower).clamp(
                                    -config.max_angular_correction,
                                    config.max_angular_correction,
                                );
                                angular_error = c.abs();
                                c
                            }
                            LimitState::AtLower => {
                                let raw = angle - lim.lower;
                                angular_error = (-raw).max(0.0);
                                (raw + ANGULAR_SLOP).clamp(-config.max_angular_correction, 0.0)
                            }
                            LimitState::AtUpper => {
                                let raw = angle - lim.upper;
                                angular_error = raw.max(0.0);
                                (raw - ANGULAR_SLOP).clamp(0.0, config.max_angular_correction)
                            }
                            LimitState::Inactive => unreachable!(),
                        };
                        let limit_impulse = -*motor_mass * c;
                        a_a -= i_a * limit_impulse;
                        a_b += i_b * limit_impulse;
                    }
                }

                // Point constraint, with anchors re-derived after the angular
                // fix above.
                let r_a = Rot2::from_angle(a_a).apply(*local_anchor_a);
                let r_b = Rot2::from_angle(a_b).apply(*local_anchor_b);
                let c = (c_b + r_b) - (c_a + r_a);
                let position_error = c.length();

                let k = Mat2::from_cols(
                    Vec2::new(
                        m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                    ),
                    Vec2::new(
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                        m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
                    ),
                );
                let p = -(invert_2x2(k) * c);

                c_a -= m_a * p;
                a_a -= i_a * r_a.perp_dot(p);
                c_b += m_b * p;
                a_b += i_b * r_b.perp_dot(p);

                position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
            }
        };

        states[self.a].position = c_a;
        states[self.a].angle = a_a;
        states[self.b].position = c_b;
        states[self.b].angle = a_b;

        converged
    }
}

// ============================================================================
// Tests
// ============================================================================
