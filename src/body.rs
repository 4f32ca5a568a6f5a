//! Rigid Body State
//!
//! Mutable per-body simulation state. Bodies are owned by the surrounding
//! entity framework; the solver borrows read/write access for the duration of
//! one step. Pose is tracked twice: the world-space pose the solver works in,
//! and the parent-relative local pose the scene graph reads, refreshed from
//! the solved world pose at the end of every step.
//!
//! Author: Moroya Sakamoto

use glam::Vec2;

/// Stable body index inside [`WorldState`](crate::world::WorldState).
pub type BodyId = usize;

/// Simulation role of a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// Never moves; anchors constraints without propagating island
    /// connectivity.
    Static,
    /// Moved by user code at a prescribed velocity; pushes dynamic bodies but
    /// is not pushed back.
    Kinematic,
    /// Fully simulated: gravity, forces, constraints, impulses.
    Dynamic,
}

/// Rigid body simulation state.
#[derive(Clone, Debug)]
pub struct Body {
    /// Simulation role
    pub kind: BodyKind,
    /// World-space center of mass
    pub position: Vec2,
    /// World-space rotation angle, radians
    pub angle: f32,
    /// Parent-relative position, refreshed at the end of each step
    pub local_position: Vec2,
    /// Parent-relative rotation angle, refreshed at the end of each step
    pub local_angle: f32,
    /// Linear velocity, m/s
    pub linear_velocity: Vec2,
    /// Angular velocity, rad/s
    pub angular_velocity: f32,
    /// Force accumulated since the last step, cleared after integration
    pub force: Vec2,
    /// Torque accumulated since the last step, cleared after integration
    pub torque: f32,
    /// Mass in kg (0 for static/kinematic)
    pub mass: f32,
    /// Inverse mass (0 for static/kinematic)
    pub inv_mass: f32,
    /// Rotational inertia about the center of mass, kg·m²
    pub inertia: f32,
    /// Inverse rotational inertia (0 for static/kinematic)
    pub inv_inertia: f32,
    /// Linear damping coefficient
    pub linear_damping: f32,
    /// Angular damping coefficient
    pub angular_damping: f32,
    /// Whether the body is currently simulated
    pub awake: bool,
    /// Whether the body participates in the simulation at all
    pub collidable: bool,
    /// Never allow this body to fall asleep
    pub sleep_disallowed: bool,
    /// Skip gravity during force integration
    pub ignore_gravity: bool,
    /// Body is paused and excluded from island seeding
    pub paused: bool,
    /// Seed this body even while paused
    pub pause_exempt: bool,
    /// Participate in prediction steps
    pub predict: bool,
    /// Seconds this body has stayed below the sleep tolerances
    pub sleep_timer: f32,
}

impl Body {
    /// Create a body of the given kind at the origin. Static and kinematic
    /// bodies get zero inverse mass and inertia.
    #[must_use]
    pub fn new(kind: BodyKind) -> Self {
        Self {
            kind,
            position: Vec2::ZERO,
            angle: 0.0,
            local_position: Vec2::ZERO,
            local_angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            awake: true,
            collidable: true,
            sleep_disallowed: false,
            ignore_gravity: false,
            paused: false,
            pause_exempt: false,
            predict: true,
            sleep_timer: 0.0,
        }
    }

    /// Create a dynamic body with the given mass and rotational inertia.
    #[must_use]
    pub fn dynamic(position: Vec2, mass: f32, inertia: f32) -> Self {
        let mut body = Self::new(BodyKind::Dynamic);
        body.position = position;
        body.local_position = position;
        body.set_mass(mass);
        body.set_inertia(inertia);
        body
    }

    /// Create a static body at the given position.
    #[must_use]
    pub fn fixed(position: Vec2) -> Self {
        let mut body = Self::new(BodyKind::Static);
        body.position = position;
        body.local_position = position;
        body
    }

    /// Create a kinematic body at the given position.
    #[must_use]
    pub fn kinematic(position: Vec2) -> Self {
        let mut body = Self::new(BodyKind::Kinematic);
        body.position = position;
        body.local_position = position;
        body
    }

    /// Set mass, recomputing the inverse. Non-dynamic bodies keep zero
    /// inverse mass regardless.
    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.inv_mass = if self.kind == BodyKind::Dynamic && mass > 0.0 {
            1.0 / mass
        } else {
            0.0
        };
    }

    /// Set rotational inertia, recomputing the inverse.
    pub fn set_inertia(&mut self, inertia: f32) {
        self.inertia = inertia;
        self.inv_inertia = if self.kind == BodyKind::Dynamic && inertia > 0.0 {
            1.0 / inertia
        } else {
            0.0
        };
    }

    /// Builder-style damping assignment.
    #[must_use]
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Builder-style initial velocity assignment.
    #[must_use]
    pub fn with_velocity(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.kind == BodyKind::Static
    }

    #[inline]
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    /// Accumulate a force through the center of mass for the next step.
    /// Wakes the body.
    pub fn apply_force(&mut self, force: Vec2) {
        self.force += force;
        self.wake();
    }

    /// Accumulate a torque for the next step. Wakes the body.
    pub fn apply_torque(&mut self, torque: f32) {
        self.torque += torque;
        self.wake();
    }

    /// Instantaneously change linear velocity by `impulse / mass`. Wakes the
    /// body.
    pub fn apply_impulse_linear(&mut self, impulse: Vec2) {
        self.linear_velocity += self.inv_mass * impulse;
        self.wake();
    }

    /// Instantaneously change angular velocity by `impulse / inertia`. Wakes
    /// the body.
    pub fn apply_impulse_angular(&mut self, impulse: f32) {
        self.angular_velocity += self.inv_inertia * impulse;
        self.wake();
    }

    /// Wake the body and restart its sleep timer.
    pub fn wake(&mut self) {
        self.awake = true;
        self.sleep_timer = 0.0;
    }

    /// Put the body to sleep: stop simulating it and drop any residual motion
    /// and pending forces.
    pub fn sleep(&mut self) {
        self.awake = false;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }
}

// ============================================================================
// Tests
// ============================================================================
