//! Rowland array layout.
//!
//! Builds the static geometry of the array once, before any neutron is
//! traced: the Rowland circle through the source, the array origin and the
//! sink; the angular coverage and its split into slab windows; and the
//! position and tilt of every slab.
//!
//! Angles around the circle are polar angles seen from the circle centre in
//! the horizontal `(x, z)` plane. Slabs are tilted about the vertical axis
//! with the sense of [`rotation_about_vertical`](rowland_geometry::transform::rotation_about_vertical).

use std::f64::consts::PI;

use nalgebra::{Vector2, Vector3};
use rowland_geometry::circle::{aperture_limit_point, exact_focus_angle, fit_circle};
use rowland_geometry::primitives::{SlabBox, VerticalCylinder};
use rowland_geometry::{horizontal, lift, Circle, Frame, Side};
use serde::{Deserialize, Serialize};

use crate::component::ComponentError;

/// Relative tolerance for reporting a negative derived gap.
const GAP_TOLERANCE: f64 = 1e-12;

/// Focusing strategy requested for the array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    /// No derived focusing; an explicit focus radius still applies.
    #[default]
    None,
    /// Spherical bending for a parallel incoming beam.
    Parallel,
    /// Spherical bending for a point source.
    Point,
    /// Each slab tilted for exact Rowland focusing.
    Exact,
}

impl FocusMode {
    /// Parse a focusing tag. Unknown tags fall back to [`FocusMode::None`]
    /// with a warning.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "unset" => FocusMode::None,
            "parallel" => FocusMode::Parallel,
            "point" => FocusMode::Point,
            "exact" => FocusMode::Exact,
            other => {
                log::warn!("Unknown focusing mode '{}', using no focusing", other);
                FocusMode::None
            }
        }
    }
}

/// How slab tilts are computed, resolved from [`FocusMode`] at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Focusing {
    /// All slabs parallel to the array face.
    Flat,
    /// Tilt $\arcsin(z / R_H)$ for a signed bending radius $R_H$ (m).
    Spherical { radius: f64 },
    /// Tilt of half the polar offset from the array origin.
    Exact,
}

/// Geometric parameters of the array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayParams {
    /// Number of slabs.
    pub nh: usize,
    /// Slab width along the arc (m).
    pub width: f64,
    /// Slab height (m).
    pub height: f64,
    /// Gap between neighbouring slabs (m). Zero or negative derives the gap
    /// from the angular coverage.
    pub gap: f64,
    /// Explicit horizontal focus radius (m), 0 for none. Positive when the
    /// circle centre lies on the `+x` side of the array.
    pub rh: f64,
    /// Full horizontal angle subtended at the source (rad), 0 to derive it
    /// from the slab count, width and gap.
    pub angle_h: f64,
    /// Full vertical angle subtended at the source (rad). When positive it
    /// overrides `height`.
    pub angle_v: f64,
    pub focus: FocusMode,
    /// Log the slab summary at info level instead of debug.
    pub verbose: bool,
}

impl Default for ArrayParams {
    fn default() -> Self {
        Self {
            nh: 11,
            width: 0.02,
            height: 0.2,
            gap: 0.0005,
            rh: 0.0,
            angle_h: 0.0,
            angle_v: 0.0,
            focus: FocusMode::None,
            verbose: false,
        }
    }
}

/// One crystal slab.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Slab {
    /// Centre of the slab face in the array frame (m), always at `y = 0`.
    pub position: Vector3<f64>,
    /// Rotation about the vertical axis (rad).
    pub tilt: f64,
    /// Polar angle of the slab on the circle (rad).
    pub angle: f64,
}

impl Slab {
    /// The slab's own frame inside the array frame.
    pub fn frame(&self) -> Frame {
        Frame::vertical(self.position, self.tilt)
    }
}

/// Immutable geometry of a Rowland array.
#[derive(Debug, Clone, Serialize)]
pub struct RowlandGeometry {
    /// The Rowland circle in the horizontal plane.
    pub circle: Circle,
    /// Source point in the array's horizontal plane.
    pub source: Vector2<f64>,
    /// Sink (focus) point in the array's horizontal plane.
    pub sink: Vector2<f64>,
    /// Polar angle of the array origin seen from the circle centre.
    pub reference_angle: f64,
    /// Total angular coverage (rad).
    pub coverage: f64,
    /// Angular width allotted to each slab (rad).
    pub slab_angle: f64,
    /// Angular gap between slabs (rad); negative when slabs overlap.
    pub gap_angle: f64,
    pub slabs: Vec<Slab>,
    /// `nh + 1` strictly increasing window boundaries.
    pub edges: Vec<f64>,
    pub focusing: Focusing,
    /// Physical extent of every slab.
    pub slab_size: SlabBox,
}

impl RowlandGeometry {
    /// Construct the array geometry.
    ///
    /// `source` and `sink` are absolute positions; `placement` is the array
    /// frame in the same absolute coordinates.
    pub fn build(
        params: &ArrayParams,
        placement: &Frame,
        source: &Vector3<f64>,
        sink: &Vector3<f64>,
    ) -> Result<Self, ComponentError> {
        if params.nh == 0 {
            return Err(ComponentError::NoSlabs);
        }
        if !(params.width > 0.0) {
            return Err(ComponentError::InvalidDimensions(format!(
                "slab width must be positive, got {}",
                params.width
            )));
        }

        let source_local = placement.to_local(source);
        let sink_local = placement.to_local(sink);
        let source = horizontal(&source_local);
        let sink = horizontal(&sink_local);
        let circle = fit_circle(&source, &sink)?;
        let radius = circle.radius;
        let reference_angle = circle.angle_of(&Vector2::zeros());

        let height = if params.angle_v > 0.0 {
            2.0 * source_local.norm() * (0.5 * params.angle_v).tan()
        } else {
            params.height
        };
        if !(height > 0.0) {
            return Err(ComponentError::InvalidDimensions(format!(
                "slab height must be positive, got {}",
                height
            )));
        }
        if params.width >= 2.0 * radius {
            return Err(ComponentError::InvalidDimensions(format!(
                "slab width {} exceeds the Rowland circle diameter {}",
                params.width,
                2.0 * radius
            )));
        }

        let nh = params.nh;
        let nhf = nh as f64;
        // Angle subtended at the centre by one slab's chord.
        let chord = 2.0 * (params.width / (2.0 * radius)).asin();
        let linear_gap = if params.gap > 0.0 { params.gap / radius } else { 0.0 };

        // The aperture is seen from the source, which sits on the circle:
        // the inscribed angle is half the central one.
        let coverage = if params.angle_h > 0.0 {
            2.0 * params.angle_h
        } else {
            nhf * chord + (nhf - 1.0) * linear_gap
        };

        let (slab_angle, gap_angle) = if nh == 1 {
            (coverage, 0.0)
        } else if params.gap <= 0.0 {
            (chord, (coverage - nhf * chord) / (nhf - 1.0))
        } else {
            ((coverage - (nhf - 1.0) * linear_gap) / nhf, linear_gap)
        };
        let step = slab_angle + gap_angle;
        if !(slab_angle > 0.0) || !(step > 0.0) || coverage >= 2.0 * PI {
            return Err(ComponentError::Overconstrained {
                coverage,
                slab_angle,
                nh,
            });
        }
        if nh > 1 && step - chord < -GAP_TOLERANCE * coverage {
            log::warn!(
                "Derived angular gap {:.3e} rad is negative: slabs of width {} m overlap in {:.3e} rad coverage",
                step - chord,
                params.width,
                coverage
            );
        }

        let focusing = match params.focus {
            FocusMode::Parallel | FocusMode::Point => Focusing::Spherical {
                radius: focus_radius(params.focus, &source, &sink, &circle),
            },
            FocusMode::Exact => Focusing::Exact,
            FocusMode::None if params.rh != 0.0 => Focusing::Spherical { radius: params.rh },
            FocusMode::None => Focusing::Flat,
        };

        let slabs = (0..nh)
            .map(|h| {
                let angle = reference_angle + (h as f64 - 0.5 * (nhf - 1.0)) * step;
                let position = lift(&circle.point_at(angle), 0.0);
                let tilt = match focusing {
                    Focusing::Flat => 0.0,
                    Focusing::Spherical { radius } => (position.z / radius).clamp(-1.0, 1.0).asin(),
                    Focusing::Exact => -0.5 * (angle - reference_angle),
                };
                Slab {
                    position,
                    tilt,
                    angle,
                }
            })
            .collect();

        let first = reference_angle - 0.5 * coverage;
        let mut edges = Vec::with_capacity(nh + 1);
        edges.push(first);
        for i in 1..nh {
            edges.push(first + 0.5 * slab_angle + (i as f64 - 0.5) * step);
        }
        edges.push(first + coverage);

        let geometry = Self {
            circle,
            source,
            sink,
            reference_angle,
            coverage,
            slab_angle,
            gap_angle,
            slabs,
            edges,
            focusing,
            slab_size: SlabBox {
                width: params.width,
                height,
            },
        };
        geometry.log_summary(params.verbose);
        Ok(geometry)
    }

    /// Index of the slab whose window contains `angle`.
    ///
    /// `angle` must already be unwrapped around
    /// [`reference_angle`](Self::reference_angle). The first matching window
    /// wins.
    pub fn slab_at_angle(&self, angle: f64) -> Option<usize> {
        self.edges
            .windows(2)
            .position(|w| angle >= w[0] && angle < w[1])
    }

    /// The vertical cylinder whose curved side is the Rowland circle.
    pub fn bounding_cylinder(&self) -> VerticalCylinder {
        VerticalCylinder {
            centre: self.circle.centre,
            radius: self.circle.radius,
            height: self.slab_size.height,
        }
    }

    /// End points of the covered arc.
    pub fn aperture_limits(&self) -> (Vector2<f64>, Vector2<f64>) {
        let origin = Vector2::zeros();
        let half = 0.5 * self.coverage;
        (
            aperture_limit_point(Side::Clockwise, &origin, half, &self.circle),
            aperture_limit_point(Side::CounterClockwise, &origin, half, &self.circle),
        )
    }

    /// Difference between slab `h`'s tilt and the exact-focus tilt at its
    /// position (rad).
    pub fn focus_error(&self, h: usize) -> f64 {
        let slab = &self.slabs[h];
        slab.tilt - exact_focus_angle(&self.source, &self.sink, &horizontal(&slab.position))
    }

    fn log_summary(&self, verbose: bool) {
        let level = if verbose { log::Level::Info } else { log::Level::Debug };
        if !log::log_enabled!(level) {
            return;
        }
        log::log!(
            level,
            "Rowland circle: centre=({:.4}, {:.4}) m, radius={:.4} m, coverage={:.4} deg",
            self.circle.centre.x,
            self.circle.centre.y,
            self.circle.radius,
            self.coverage.to_degrees()
        );
        log::log!(
            level,
            "  {} slabs: angular width={:.4} deg, gap={:.4} deg, focusing={:?}",
            self.slabs.len(),
            self.slab_angle.to_degrees(),
            self.gap_angle.to_degrees(),
            self.focusing
        );
        for (h, slab) in self.slabs.iter().enumerate() {
            log::log!(
                level,
                "  slab {:>3}: x={:+.5} z={:+.5} m, tilt={:+.4} deg, window=[{:.4}, {:.4}] deg",
                h,
                slab.position.x,
                slab.position.z,
                slab.tilt.to_degrees(),
                self.edges[h].to_degrees(),
                self.edges[h + 1].to_degrees()
            );
        }
    }
}

/// Signed spherical focus radius for the approximate focusing modes.
///
/// With $L_1$, $L_2$ the distances to source and sink and $\theta$ the
/// grazing angle, half the supplement of the angle between their
/// directions:
///
/// - point source: $R_H = 2 L_1 L_2 / ((L_1 + L_2)\sin\theta)$
/// - parallel beam: $R_H = 2 L_2 / \sin\theta$
///
/// The sign follows the side of the array on which the circle centre lies.
pub fn focus_radius(
    mode: FocusMode,
    source: &Vector2<f64>,
    sink: &Vector2<f64>,
    circle: &Circle,
) -> f64 {
    let l1 = source.norm();
    let l2 = sink.norm();
    // |s + k| / 2 = cos(alpha / 2) = sin(theta)
    let sin_theta = 0.5 * (source / l1 + sink / l2).norm();
    let radius = match mode {
        FocusMode::Parallel => 2.0 * l2 / sin_theta,
        _ => 2.0 * l1 * l2 / ((l1 + l2) * sin_theta),
    };
    radius * circle.centre.x.signum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn symmetric() -> (Vector3<f64>, Vector3<f64>) {
        (Vector3::new(1.0, 0.0, -2.0), Vector3::new(1.0, 0.0, 2.0))
    }

    fn build(params: &ArrayParams) -> RowlandGeometry {
        let (src, snk) = symmetric();
        RowlandGeometry::build(params, &Frame::default(), &src, &snk).unwrap()
    }

    #[test]
    fn test_symmetric_circle() {
        let g = build(&ArrayParams::default());
        assert_abs_diff_eq!(g.circle.centre.x, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(g.circle.centre.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.circle.radius, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(g.reference_angle.abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_seven_slabs_four_degrees_partition_coverage() {
        let params = ArrayParams {
            nh: 7,
            angle_h: 4f64.to_radians(),
            gap: 0.0,
            ..Default::default()
        };
        let g = build(&params);
        assert_abs_diff_eq!(g.coverage, 8f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(7.0 * g.slab_angle + 6.0 * g.gap_angle, g.coverage, epsilon = 1e-12);
        assert!(g.gap_angle > 0.0);
    }

    #[test]
    fn test_edges_increase_and_span_coverage() {
        for params in [
            ArrayParams::default(),
            ArrayParams { nh: 7, angle_h: 0.07, gap: 0.0, ..Default::default() },
            ArrayParams { nh: 4, angle_h: 0.05, gap: 0.003, ..Default::default() },
            ArrayParams { nh: 1, ..Default::default() },
        ] {
            let g = build(&params);
            assert_eq!(g.edges.len(), params.nh + 1);
            assert!(g.edges.windows(2).all(|w| w[1] > w[0]), "edges not increasing: {:?}", g.edges);
            assert_abs_diff_eq!(g.edges[params.nh] - g.edges[0], g.coverage, epsilon = 1e-12);
            for (h, slab) in g.slabs.iter().enumerate() {
                assert!(slab.angle > g.edges[h] && slab.angle < g.edges[h + 1]);
                assert_eq!(g.slab_at_angle(slab.angle), Some(h));
            }
        }
    }

    #[test]
    fn test_derived_coverage_tiles_slabs() {
        let params = ArrayParams { nh: 5, gap: 0.0, ..Default::default() };
        let g = build(&params);
        let chord = 2.0 * (params.width / (2.0 * g.circle.radius)).asin();
        assert_abs_diff_eq!(g.slab_angle, chord, epsilon = 1e-15);
        assert_abs_diff_eq!(g.gap_angle, 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(g.coverage, 5.0 * chord, epsilon = 1e-15);
    }

    #[test]
    fn test_linear_gap_converted_at_radius() {
        let params = ArrayParams { nh: 3, gap: 0.01, ..Default::default() };
        let g = build(&params);
        assert_abs_diff_eq!(g.gap_angle, 0.01 / 2.5, epsilon = 1e-15);
    }

    #[test]
    fn test_slabs_lie_on_circle_at_y_zero() {
        let g = build(&ArrayParams {
            focus: FocusMode::Exact,
            ..Default::default()
        });
        for slab in &g.slabs {
            assert_eq!(slab.position.y, 0.0);
            let p = horizontal(&slab.position);
            assert_abs_diff_eq!((p - g.circle.centre).norm(), g.circle.radius, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_exact_focus_centre_slab_is_untilted() {
        let g = build(&ArrayParams {
            nh: 9,
            focus: FocusMode::Exact,
            ..Default::default()
        });
        assert_abs_diff_eq!(g.slabs[4].tilt, 0.0, epsilon = 1e-15);
        for h in 0..9 {
            assert_abs_diff_eq!(g.focus_error(h), 0.0, epsilon = 1e-9);
        }
        // Tilt grows with distance from the centre, with opposite signs
        assert!(g.slabs[0].tilt * g.slabs[8].tilt < 0.0);
    }

    #[test]
    fn test_point_focus_radius_is_rowland_diameter() {
        let g = build(&ArrayParams {
            focus: FocusMode::Point,
            ..Default::default()
        });
        match g.focusing {
            Focusing::Spherical { radius } => assert_abs_diff_eq!(radius, 5.0, epsilon = 1e-12),
            other => panic!("expected spherical focusing, got {other:?}"),
        }
        // Spherical tilts approximate exact focusing near the centre
        for h in 0..g.slabs.len() {
            assert!(g.focus_error(h).abs() < 1e-5);
        }
    }

    #[test]
    fn test_parallel_focus_radius() {
        let g = build(&ArrayParams {
            focus: FocusMode::Parallel,
            ..Default::default()
        });
        let l2 = 5f64.sqrt();
        let sin_theta = 1.0 / l2;
        match g.focusing {
            Focusing::Spherical { radius } => {
                assert_abs_diff_eq!(radius, 2.0 * l2 / sin_theta, epsilon = 1e-12)
            }
            other => panic!("expected spherical focusing, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_radius_and_flat() {
        let g = build(&ArrayParams {
            rh: 3.0,
            ..Default::default()
        });
        assert_eq!(g.focusing, Focusing::Spherical { radius: 3.0 });
        let g = build(&ArrayParams::default());
        assert_eq!(g.focusing, Focusing::Flat);
        assert!(g.slabs.iter().all(|s| s.tilt == 0.0));
    }

    #[test]
    fn test_unknown_focus_tag_falls_back() {
        assert_eq!(FocusMode::from_tag("Exact"), FocusMode::Exact);
        assert_eq!(FocusMode::from_tag(" point "), FocusMode::Point);
        assert_eq!(FocusMode::from_tag(""), FocusMode::None);
        assert_eq!(FocusMode::from_tag("banana"), FocusMode::None);
    }

    #[test]
    fn test_fatal_conditions() {
        let (src, snk) = symmetric();
        let err = RowlandGeometry::build(
            &ArrayParams { nh: 0, ..Default::default() },
            &Frame::default(),
            &src,
            &snk,
        )
        .unwrap_err();
        assert!(matches!(err, ComponentError::NoSlabs));

        let err = RowlandGeometry::build(
            &ArrayParams::default(),
            &Frame::default(),
            &Vector3::new(0.0, 0.0, -2.0),
            &Vector3::new(0.0, 0.5, 3.0),
        )
        .unwrap_err();
        assert!(matches!(err, ComponentError::Geometry(_)));

        let err = RowlandGeometry::build(
            &ArrayParams { nh: 5, angle_h: 1e-4, ..Default::default() },
            &Frame::default(),
            &src,
            &snk,
        )
        .unwrap_err();
        assert!(matches!(err, ComponentError::Overconstrained { .. }));
    }

    #[test]
    fn test_overlapping_slabs_still_build() {
        // 5 slabs of 20 mm need about 2.3 deg; squeeze them into 2 deg
        let g = build(&ArrayParams {
            nh: 5,
            angle_h: 1f64.to_radians(),
            gap: 0.0,
            ..Default::default()
        });
        assert!(g.gap_angle < 0.0);
        assert!(g.edges.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_vertical_aperture_sets_height() {
        let g = build(&ArrayParams {
            angle_v: 0.1,
            ..Default::default()
        });
        let l1 = 5f64.sqrt();
        assert_abs_diff_eq!(g.slab_size.height, 2.0 * l1 * 0.05f64.tan(), epsilon = 1e-12);
    }

    #[test]
    fn test_placement_frame_is_applied() {
        let (src, snk) = symmetric();
        let placement = Frame::vertical(Vector3::new(0.5, 0.0, 10.0), 0.3);
        let g = RowlandGeometry::build(
            &ArrayParams::default(),
            &placement,
            &placement.to_parent(&src),
            &placement.to_parent(&snk),
        )
        .unwrap();
        assert_abs_diff_eq!(g.circle.radius, 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(g.source, Vector2::new(1.0, -2.0), epsilon = 1e-9);
    }

    #[test]
    fn test_aperture_limits_match_outer_edges() {
        let g = build(&ArrayParams {
            nh: 7,
            angle_h: 0.05,
            ..Default::default()
        });
        let (lo, hi) = g.aperture_limits();
        assert_abs_diff_eq!(lo, g.circle.point_at(g.edges[0]), epsilon = 1e-12);
        assert_abs_diff_eq!(hi, g.circle.point_at(g.edges[7]), epsilon = 1e-12);
    }
}
