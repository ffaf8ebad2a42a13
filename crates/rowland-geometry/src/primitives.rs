//! Bounding shapes used to locate slab hits.
//!
//! The array is enclosed by a [`VerticalCylinder`] whose axis is vertical
//! and whose curved side is the Rowland circle. Each slab is a thin
//! [`SlabBox`] in its own frame.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// A finite cylinder with a vertical axis, centred on `y = 0`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerticalCylinder {
    /// Axis position in the horizontal plane `(x, z)`.
    pub centre: Vector2<f64>,
    /// Radius (m).
    pub radius: f64,
    /// Full height along `y` (m).
    pub height: f64,
}

/// Which surface of the cylinder a trajectory leaves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSurface {
    /// The curved side.
    Side,
    /// One of the flat ends.
    Cap,
}

/// Entry and exit times of a straight trajectory through a cylinder.
#[derive(Debug, Clone, Copy)]
pub struct CylinderHit {
    pub t_in: f64,
    pub t_out: f64,
    pub exit: ExitSurface,
}

impl VerticalCylinder {
    /// Intersect the line `position + t * velocity` with the cylinder.
    ///
    /// Returns `None` when the line misses the curved side or passes above
    /// or below it. If the line crosses a flat end before reaching the side,
    /// the corresponding time is clamped to the end crossing.
    pub fn intersect(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> Option<CylinderHit> {
        let dx = position.x - self.centre.x;
        let dz = position.z - self.centre.y;
        let a = velocity.x * velocity.x + velocity.z * velocity.z;
        if a == 0.0 {
            return None;
        }
        let b = 2.0 * (dx * velocity.x + dz * velocity.z);
        let c = dx * dx + dz * dz - self.radius * self.radius;
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let sq = disc.sqrt();
        // Stable form of the quadratic roots.
        let q = -0.5 * (b + b.signum() * sq);
        let (mut t0, mut t1) = if q == 0.0 {
            (0.0, 0.0)
        } else {
            let r0 = q / a;
            let r1 = c / q;
            (r0.min(r1), r0.max(r1))
        };

        let half = 0.5 * self.height;
        let mut exit = ExitSurface::Side;
        if velocity.y == 0.0 {
            if position.y.abs() > half {
                return None;
            }
        } else {
            let ta = (-half - position.y) / velocity.y;
            let tb = (half - position.y) / velocity.y;
            let (ty0, ty1) = (ta.min(tb), ta.max(tb));
            if ty0 > t1 || ty1 < t0 {
                return None;
            }
            if ty0 > t0 {
                t0 = ty0;
            }
            if ty1 < t1 {
                t1 = ty1;
                exit = ExitSurface::Cap;
            }
        }

        Some(CylinderHit {
            t_in: t0,
            t_out: t1,
            exit,
        })
    }
}

/// A rectangular slab lying in the local `y`-`z` plane, normal along `x`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlabBox {
    /// Extent along `z` (m).
    pub width: f64,
    /// Extent along `y` (m).
    pub height: f64,
}

impl SlabBox {
    /// Whether a point on the `x = 0` plane lies on the slab face.
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        point.z.abs() <= 0.5 * self.width && point.y.abs() <= 0.5 * self.height
    }
}
