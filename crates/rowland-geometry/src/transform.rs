//! Oriented frames and rigid transformations.
//!
//! A [`Frame`] places a local coordinate system inside a parent one: a
//! rotation followed by a translation. Frames are used to move source and
//! sink points into the array frame, to carry particles between the
//! laboratory and the component, and to enter and leave each slab.
//!
//! Axes follow the usual neutron-optics convention: `z` along the nominal
//! beam, `y` vertical, `x` completing a right-handed set.

use nalgebra::{Rotation3, Vector3};

/// A rigid transformation: local coordinates are rotated by `rotation`, then
/// offset by `origin`, to give parent coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Rotation from local to parent axes.
    pub rotation: Rotation3<f64>,
    /// Position of the local origin in parent coordinates.
    pub origin: Vector3<f64>,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            rotation: Rotation3::identity(),
            origin: Vector3::zeros(),
        }
    }
}

/// Rotation by `angle` (radians) about the vertical `y` axis.
///
/// Positive angles turn `+x` towards `-z` and `+z` towards `+x`.
pub fn rotation_about_vertical(angle: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), angle)
}

impl Frame {
    /// A frame at `origin`, rotated by `angle` about the vertical axis.
    pub fn vertical(origin: Vector3<f64>, angle: f64) -> Self {
        Self {
            rotation: rotation_about_vertical(angle),
            origin,
        }
    }

    /// Express a parent-frame point in local coordinates.
    pub fn to_local(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(&(point - self.origin))
    }

    /// Express a local point in parent coordinates.
    pub fn to_parent(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.origin
    }

    /// Rotate a parent-frame direction (velocity, spin) into local axes.
    pub fn direction_to_local(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(v)
    }

    /// Rotate a local direction into parent axes.
    pub fn direction_to_parent(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Compose two frames: `inner` is given relative to `self`, the result
    /// places `inner` directly in `self`'s parent.
    pub fn then(&self, inner: &Frame) -> Frame {
        Frame {
            rotation: self.rotation * inner.rotation,
            origin: self.rotation * inner.origin + self.origin,
        }
    }

    /// The transformation taking coordinates of `self` to coordinates of
    /// `other`, where both frames are given in the same parent.
    pub fn relative_to(&self, other: &Frame) -> Frame {
        Frame {
            rotation: other.rotation.inverse() * self.rotation,
            origin: other.to_local(&self.origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_frame() {
        let f = Frame::default();
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_abs_diff_eq!(f.to_local(&p), p, epsilon = 1e-12);
        assert_abs_diff_eq!(f.to_parent(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_vertical_rotation_sense() {
        let r = rotation_about_vertical(std::f64::consts::FRAC_PI_2);
        assert_abs_diff_eq!(r * Vector3::x(), -Vector3::z(), epsilon = 1e-12);
        assert_abs_diff_eq!(r * Vector3::z(), Vector3::x(), epsilon = 1e-12);
        assert_abs_diff_eq!(r * Vector3::y(), Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let f = Frame::vertical(Vector3::new(0.3, -0.1, 2.0), 0.37);
        let p = Vector3::new(-1.0, 0.5, 4.0);
        assert_abs_diff_eq!(f.to_parent(&f.to_local(&p)), p, epsilon = 1e-12);
        let v = Vector3::new(10.0, -3.0, 2000.0);
        assert_abs_diff_eq!(f.direction_to_parent(&f.direction_to_local(&v)), v, epsilon = 1e-9);
    }

    #[test]
    fn test_compose_and_relative() {
        let outer = Frame::vertical(Vector3::new(1.0, 0.0, 5.0), 0.2);
        let inner = Frame::vertical(Vector3::new(0.0, 0.1, 0.5), -0.7);
        let composed = outer.then(&inner);
        let p = Vector3::new(0.2, 0.3, -0.4);
        assert_abs_diff_eq!(
            composed.to_parent(&p),
            outer.to_parent(&inner.to_parent(&p)),
            epsilon = 1e-12
        );

        let other = Frame::vertical(Vector3::new(-2.0, 0.0, 1.0), 1.1);
        let rel = composed.relative_to(&other);
        assert_abs_diff_eq!(
            rel.to_parent(&p),
            other.to_local(&composed.to_parent(&p)),
            epsilon = 1e-12
        );
    }
}
