//! Contact Constraints (Input Side)
//!
//! A [`Contact`] is the narrow-phase hand-off: a touching pair with
//! precomputed local anchors and a contact normal, plus the accumulated
//! impulses the solver stores back for next-step warm starting. The solver
//! never generates or updates manifolds itself; the collision layer replaces
//! the anchor data whenever geometry changes.

use glam::Vec2;

use crate::body::BodyId;

/// Stable contact index inside [`WorldState`](crate::world::WorldState).
pub type ContactId = usize;

/// Maximum manifold points per contact.
pub const MAX_CONTACT_POINTS: usize = 2;

/// One manifold point of a contact.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactPoint {
    /// Anchor in body A's local frame
    pub local_anchor_a: Vec2,
    /// Anchor in body B's local frame
    pub local_anchor_b: Vec2,
    /// Accumulated normal impulse from the previous step (warm start seed)
    pub normal_impulse: f32,
    /// Accumulated tangent impulse from the previous step (warm start seed)
    pub tangent_impulse: f32,
}

/// A touching pair handed over by the collision layer.
#[derive(Clone, Debug)]
pub struct Contact {
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Contact normal in body A's local frame, pointing from A to B
    pub local_normal: Vec2,
    /// Manifold points
    pub points: [ContactPoint; MAX_CONTACT_POINTS],
    /// Number of valid entries in `points`
    pub point_count: usize,
    /// Combined friction coefficient
    pub friction: f32,
    /// Combined restitution coefficient
    pub restitution: f32,
    /// The shapes currently overlap
    pub touching: bool,
    /// The contact participates in solving
    pub enabled: bool,
    /// Fixture A responds to collisions (false = sensor)
    pub hard_a: bool,
    /// Fixture B responds to collisions (false = sensor)
    pub hard_b: bool,
}

impl Contact {
    /// Create an enabled, touching contact with no manifold points yet.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId, local_normal: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_normal,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            point_count: 0,
            friction: 0.3,
            restitution: 0.0,
            touching: true,
            enabled: true,
            hard_a: true,
            hard_b: true,
        }
    }

    /// Builder-style manifold point append. Panics if the manifold is full;
    /// the collision layer never produces more than [`MAX_CONTACT_POINTS`].
    #[must_use]
    pub fn with_point(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        assert!(self.point_count < MAX_CONTACT_POINTS, "contact manifold full");
        self.points[self.point_count] = ContactPoint {
            local_anchor_a,
            local_anchor_b,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
        };
        self.point_count += 1;
        self
    }

    /// Builder-style material assignment.
    #[must_use]
    pub fn with_material(mut self, friction: f32, restitution: f32) -> Self {
        self.friction = friction;
        self.restitution = restitution;
        self
    }

    /// Both fixtures respond to collisions; sensor pairs never become island
    /// edges.
    #[inline]
    #[must_use]
    pub fn is_solid(&self) -> bool {
        self.hard_a && self.hard_b
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
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_endpoint() {
        let contact = Contact::new(3, 7, Vec2::Y);
        assert_eq!(contact.other(3), 7);
        assert_eq!(contact.other(7), 3);
    }

    #[test]
    fn sensor_pair_is_not_solid() {
        let mut contact = Contact::new(0, 1, Vec2::Y);
        assert!(contact.is_solid());
        contact.hard_b = false;
        assert!(!contact.is_solid());
    }

    #[test]
    fn with_point_appends() {
        let contact = Contact::new(0, 1, Vec2::Y)
            .with_point(Vec2::new(0.5, -0.5), Vec2::new(0.5, 0.5))
            .with_point(Vec2::new(-0.5, -0.5), Vec2::new(-0.5, 0.5));
        assert_eq!(contact.point_count, 2);
        assert_eq!(contact.points[1].local_anchor_a, Vec2::new(-0.5, -0.5));
    }
}
