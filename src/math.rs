//! 2D Solver Mathematics
//!
//! Rotations, rigid transforms, and the 2D cross-product helpers the
//! constraint solver is written in terms of. Vectors and 2x2 matrices come
//! from [`glam`]; this module adds the types glam does not carry.
//!
//! # Conventions
//!
//! - Angles are radians, counter-clockwise positive.
//! - `cross(a, b)` of two vectors is the scalar `a.x * b.y - a.y * b.x`
//!   ([`Vec2::perp_dot`]).
//! - `cross(w, v)` of a scalar angular velocity and a vector is the tangential
//!   velocity `(-w * v.y, w * v.x)` ([`cross_scalar_vec`]).

pub use glam::{Mat2, Vec2};

/// Cross product of a scalar (angular velocity) and a vector.
///
/// Returns the tangential velocity of a point at offset `v` from the rotation
/// center when rotating at `w` rad/s.
#[inline]
#[must_use]
pub fn cross_scalar_vec(w: f32, v: Vec2) -> Vec2 {
    Vec2::new(-w * v.y, w * v.x)
}

// ============================================================================
// Rot2 — 2D Rotation
// ============================================================================

/// A 2D rotation stored as sine/cosine, so applying it needs no trigonometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rot2 {
    /// Sine of the rotation angle
    pub sin: f32,
    /// Cosine of the rotation angle
    pub cos: f32,
}

impl Rot2 {
    /// The identity rotation (zero angle).
    pub const IDENTITY: Self = Self { sin: 0.0, cos: 1.0 };

    /// Create a rotation from an angle in radians.
    #[inline]
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self { sin, cos }
    }

    /// The rotation angle in radians, in `(-PI, PI]`.
    #[inline]
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.sin.atan2(self.cos)
    }

    /// Rotate a vector.
    #[inline]
    #[must_use]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    /// Rotate a vector by the inverse rotation.
    #[inline]
    #[must_use]
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }

    /// The inverse rotation.
    #[inline]
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self { sin: -self.sin, cos: self.cos }
    }
}

impl Default for Rot2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Transform2 — Rigid 2D Transform
// ============================================================================

/// A rigid 2D transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2 {
    /// Rotation part
    pub rotation: Rot2,
    /// Translation part
    pub translation: Vec2,
}

impl Transform2 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: Rot2::IDENTITY,
        translation: Vec2::ZERO,
    };

    /// Create a transform from a translation and a rotation angle.
    #[inline]
    #[must_use]
    pub fn new(translation: Vec2, angle: f32) -> Self {
        Self {
            rotation: Rot2::from_angle(angle),
            translation,
        }
    }

    /// Transform a point.
    #[inline]
    #[must_use]
    pub fn apply_point(&self, p: Vec2) -> Vec2 {
        self.rotation.apply(p) + self.translation
    }

    /// Transform a direction (rotation only).
    #[inline]
    #[must_use]
    pub fn apply_vector(&self, v: Vec2) -> Vec2 {
        self.rotation.apply(v)
    }

    /// The inverse transform.
    #[inline]
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        Self {
            rotation: inv_rot,
            translation: inv_rot.apply(-self.translation),
        }
    }

    /// The rotation angle in radians.
    #[inline]
    #[must_use]
    pub fn angle(&self) -> f32 {
        self.rotation.angle()
    }
}

impl Default for Transform2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn rotation_roundtrip() {
        let rot = Rot2::from_angle(0.7);
        let v = Vec2::new(3.0, -2.0);
        let back = rot.apply_inverse(rot.apply(v));
        assert!((back - v).length() < EPS);
        assert!((rot.angle() - 0.7).abs() < EPS);
    }

    #[test]
    fn transform_inverse_cancels() {
        let xf = Transform2::new(Vec2::new(5.0, -1.0), 1.2);
        let p = Vec2::new(-0.5, 2.5);
        let back = xf.inverse().apply_point(xf.apply_point(p));
        assert!((back - p).length() < EPS);
    }

    #[test]
    fn scalar_cross_is_tangential() {
        // A point one unit along +X rotating at 2 rad/s moves along +Y.
        let v = cross_scalar_vec(2.0, Vec2::X);
        assert!((v - Vec2::new(0.0, 2.0)).length() < EPS);
    }
}
