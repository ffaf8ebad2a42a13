//! # Rowland Geometry
//!
//! Geometry handling for the Rowland crystal array. This crate provides:
//!
//! - **Circle constructions** ([`circle`]): the circle through two points
//!   and the origin, aperture limit points, and the exact-focus plane angle.
//! - **Frames** ([`transform`]): oriented coordinate frames and rotations
//!   about the vertical axis.
//! - **Bounding shapes** ([`primitives`]): the vertical bounding cylinder of
//!   the array and the rectangular slab face.

pub mod circle;
pub mod primitives;
pub mod transform;

pub use circle::{Circle, GeometryError, Side};
pub use transform::Frame;

use nalgebra::{Vector2, Vector3};

/// Project a 3D point onto the horizontal `(x, z)` plane.
pub fn horizontal(v: &Vector3<f64>) -> Vector2<f64> {
    Vector2::new(v.x, v.z)
}

/// Lift a horizontal-plane point to 3D at height `y`.
pub fn lift(p: &Vector2<f64>, y: f64) -> Vector3<f64> {
    Vector3::new(p.x, y, p.y)
}
