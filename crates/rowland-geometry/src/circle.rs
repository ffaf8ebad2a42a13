//! Circle constructions in the horizontal plane.
//!
//! All functions here work on 2D points of the horizontal `(x, z)` plane of
//! the array frame, stored as [`Vector2`] with `.x = x` and `.y = z`. The
//! vertical axis plays no part in the Rowland construction.
//!
//! The functions are pure and allocation-free so they can be called from
//! any number of particle tasks at once.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance below which three points are treated as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-12;

/// Errors from circle constructions.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Points ({x0}, {z0}), (0, 0) and ({x1}, {z1}) are collinear: no circle passes through them")]
    Collinear { x0: f64, z0: f64, x1: f64, z1: f64 },

    #[error("Degenerate circle: radius {0} is not strictly positive and finite")]
    DegenerateRadius(f64),
}

/// A circle in the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Centre `(x, z)`.
    pub centre: Vector2<f64>,
    /// Radius, strictly positive.
    pub radius: f64,
}

impl Circle {
    /// Polar angle of `point` seen from the centre, in `(-π, π]`.
    pub fn angle_of(&self, point: &Vector2<f64>) -> f64 {
        let d = point - self.centre;
        d.y.atan2(d.x)
    }

    /// Point on the circle at polar angle `angle`.
    pub fn point_at(&self, angle: f64) -> Vector2<f64> {
        self.centre + self.radius * Vector2::new(angle.cos(), angle.sin())
    }
}

/// Direction of travel around a circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Decreasing polar angle.
    Clockwise,
    /// Increasing polar angle.
    CounterClockwise,
}

impl Side {
    fn sign(self) -> f64 {
        match self {
            Side::Clockwise => -1.0,
            Side::CounterClockwise => 1.0,
        }
    }
}

/// Fit the unique circle through `p0`, `p1` and the origin.
///
/// A circle through the origin satisfies $x^2 + z^2 + D x + E z = 0$, which
/// gives a 2x2 linear system in $(D, E)$. The system is solved by
/// elimination on the row with the larger pivot, so nearly vertical chords
/// do not divide by a vanishing slope. The determinant is the cross product
/// of the two points: it vanishes exactly when their slopes from the origin
/// are equal, which is reported as [`GeometryError::Collinear`].
pub fn fit_circle(p0: &Vector2<f64>, p1: &Vector2<f64>) -> Result<Circle, GeometryError> {
    let collinear = || GeometryError::Collinear {
        x0: p0.x,
        z0: p0.y,
        x1: p1.x,
        z1: p1.y,
    };

    let det = p0.x * p1.y - p1.x * p0.y;
    let scale = p0.norm() * p1.norm();
    if scale == 0.0 || det.abs() <= COLLINEAR_TOLERANCE * scale {
        return Err(collinear());
    }

    let r0 = -p0.norm_squared();
    let r1 = -p1.norm_squared();

    // Pivot on the row whose x coefficient is larger in magnitude.
    let (a, ra, b, rb) = if p0.x.abs() >= p1.x.abs() {
        (p0, r0, p1, r1)
    } else {
        (p1, r1, p0, r0)
    };
    let m = b.x / a.x;
    let e_coeff = b.y - m * a.y;
    if e_coeff == 0.0 {
        return Err(collinear());
    }
    let e = (rb - m * ra) / e_coeff;
    let d = (ra - a.y * e) / a.x;

    let centre = Vector2::new(-0.5 * d, -0.5 * e);
    let radius = centre.norm();
    if !radius.is_finite() || radius <= 0.0 {
        return Err(GeometryError::DegenerateRadius(radius));
    }
    Ok(Circle { centre, radius })
}

/// Walk around `circle` from `point` by `half_angle` in the direction `side`.
///
/// The two sides give the two angular limits of an aperture centred on
/// `point`. The result is built from the circle's parametric form rather
/// than by rotating `point`, so it lies exactly on the circle even when
/// `point` carries rounding error.
pub fn aperture_limit_point(
    side: Side,
    point: &Vector2<f64>,
    half_angle: f64,
    circle: &Circle,
) -> Vector2<f64> {
    let start = circle.angle_of(point);
    circle.point_at(start + side.sign() * half_angle)
}

/// Signed angle by which a reflecting plane at `point` must be rotated,
/// relative to the plane at the origin, to reflect `a` onto `b`.
///
/// The ideal plane normal at any point bisects the directions towards the
/// two foci. This returns the angle from the bisector at `point` to the
/// bisector at the origin, oriented like a rotation about the vertical axis
/// (positive angles turn `+x` towards `-z`). For points on the circle
/// through `a`, `b` and the origin it equals minus half the polar angle
/// between `point` and the origin.
pub fn exact_focus_angle(a: &Vector2<f64>, b: &Vector2<f64>, point: &Vector2<f64>) -> f64 {
    let reference = bisector(a, b);
    let local = bisector(&(a - point), &(b - point));
    let cross = local.x * reference.y - local.y * reference.x;
    let dot = local.dot(&reference);
    cross.atan2(dot)
}

/// Unit bisector of the directions of `u` and `v`.
fn bisector(u: &Vector2<f64>, v: &Vector2<f64>) -> Vector2<f64> {
    let sum = u.normalize() + v.normalize();
    let n = sum.norm();
    if n == 0.0 {
        // Opposite directions: the bisector is the common perpendicular.
        let u = u.normalize();
        Vector2::new(-u.y, u.x)
    } else {
        sum / n
    }
}

/// Wrap `angle` into `(reference - π, reference + π]`.
pub fn unwrap_angle(angle: f64, reference: f64) -> f64 {
    let tau = 2.0 * std::f64::consts::PI;
    let mut d = (angle - reference) % tau;
    if d <= -std::f64::consts::PI {
        d += tau;
    } else if d > std::f64::consts::PI {
        d -= tau;
    }
    reference + d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fit_circle_passes_through_all_points() {
        let cases = [
            (Vector2::new(1.5, -2.0), Vector2::new(1.2, 2.5)),
            (Vector2::new(-1.5, -2.0), Vector2::new(-1.0, 1.7)),
            (Vector2::new(0.0, -3.0), Vector2::new(4.0, 0.0)),
            (Vector2::new(1e-3, 5.0), Vector2::new(2.0, -7.0)),
        ];
        for (p0, p1) in cases {
            let c = fit_circle(&p0, &p1).unwrap();
            assert_abs_diff_eq!((p0 - c.centre).norm(), c.radius, epsilon = 1e-9);
            assert_abs_diff_eq!((p1 - c.centre).norm(), c.radius, epsilon = 1e-9);
            assert_abs_diff_eq!(c.centre.norm(), c.radius, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_circle_symmetric_points() {
        let c = fit_circle(&Vector2::new(2.0, -2.0), &Vector2::new(2.0, 2.0)).unwrap();
        assert_abs_diff_eq!(c.centre.x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.centre.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.radius, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_circle_rejects_collinear() {
        let err = fit_circle(&Vector2::new(1.0, 2.0), &Vector2::new(-3.0, -6.0)).unwrap_err();
        assert!(matches!(err, GeometryError::Collinear { .. }));

        let err = fit_circle(&Vector2::new(0.0, 1.0), &Vector2::new(0.0, 5.0)).unwrap_err();
        assert!(matches!(err, GeometryError::Collinear { .. }));

        assert!(fit_circle(&Vector2::zeros(), &Vector2::new(1.0, 1.0)).is_err());
    }

    #[test]
    fn test_aperture_limit_points_are_on_circle() {
        let c = fit_circle(&Vector2::new(1.5, -2.0), &Vector2::new(1.2, 2.5)).unwrap();
        let origin = Vector2::zeros();
        let lo = aperture_limit_point(Side::Clockwise, &origin, 0.1, &c);
        let hi = aperture_limit_point(Side::CounterClockwise, &origin, 0.1, &c);
        assert_abs_diff_eq!((lo - c.centre).norm(), c.radius, epsilon = 1e-12);
        assert_abs_diff_eq!((hi - c.centre).norm(), c.radius, epsilon = 1e-12);
        let om = c.angle_of(&origin);
        assert_abs_diff_eq!(unwrap_angle(c.angle_of(&lo), om) - om, -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(unwrap_angle(c.angle_of(&hi), om) - om, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_exact_focus_angle_is_half_the_polar_offset() {
        for (a, b) in [
            (Vector2::new(1.5, -2.0), Vector2::new(1.2, 2.5)),
            (Vector2::new(-1.5, -2.0), Vector2::new(-1.0, 1.7)),
        ] {
            let c = fit_circle(&a, &b).unwrap();
            let om = c.angle_of(&Vector2::zeros());
            for offset in [0.05, -0.1, 0.2] {
                let p = c.point_at(om + offset);
                assert_abs_diff_eq!(exact_focus_angle(&a, &b, &p), -0.5 * offset, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_exact_focus_angle_zero_at_origin() {
        let a = Vector2::new(2.0, -2.0);
        let b = Vector2::new(2.0, 2.0);
        assert_abs_diff_eq!(exact_focus_angle(&a, &b, &Vector2::zeros()), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_unwrap_angle() {
        let pi = std::f64::consts::PI;
        assert_abs_diff_eq!(unwrap_angle(-pi + 0.1, pi), pi + 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(unwrap_angle(pi - 0.1, -pi + 0.05), -pi - 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(unwrap_angle(0.3, 0.0), 0.3, epsilon = 1e-15);
    }
}
