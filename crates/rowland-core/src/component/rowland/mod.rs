//! The Rowland monochromator: a horizontally curved array of mosaic crystal
//! slabs on the Rowland circle through a source, the array origin and a
//! sink.
//!
//! The component is assembled once by [`RowlandMonochromator::new`] and is
//! read-only afterwards. Each call to
//! [`interact`](OpticalComponent::interact) locates the slab a trajectory
//! reaches, moves the neutron into that slab's frame, runs the
//! [`MosaicCrystal`] model and moves it back.

pub mod layout;
pub mod mosaic;
pub mod quadrature;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::Vector3;
use rand::{Rng, RngCore};
use rowland_geometry::circle::unwrap_angle;
use rowland_geometry::primitives::ExitSurface;
use rowland_geometry::{horizontal, Frame};
use rowland_materials::{LookupTable, ResponseCurve};

pub use layout::{ArrayParams, FocusMode, Focusing, RowlandGeometry, Slab};
pub use mosaic::MosaicCrystal;

use super::{ComponentError, OpticalComponent};
use crate::types::{CrystalProperties, Neutron, Outcome, K2V};

/// Construction parameters of a [`RowlandMonochromator`].
///
/// Angles are in radians, lengths in metres, `tau` in Å⁻¹.
#[derive(Debug, Clone)]
pub struct MonochromatorParams {
    pub array: ArrayParams,
    /// Scattering vector magnitude $2\pi/d$.
    pub tau: f64,
    /// Required diffraction order, 0 for any.
    pub order: u32,
    pub r0: f64,
    pub t0: f64,
    /// RMS mosaic about the vertical axis.
    pub rms_y: f64,
    /// RMS mosaic about the in-plane horizontal axis.
    pub rms_z: f64,
    /// Reflectivity table replacing `r0`.
    pub reflectivity: Option<PathBuf>,
    /// Transmission table replacing `t0`.
    pub transmission: Option<PathBuf>,
}

/// A Rowland-circle array of mosaic crystal slabs.
#[derive(Debug, Clone)]
pub struct RowlandMonochromator {
    name: String,
    geometry: RowlandGeometry,
    crystal: MosaicCrystal,
}

impl RowlandMonochromator {
    /// Build the array.
    ///
    /// `source` and `sink` are absolute positions and `placement` is the
    /// component frame in the same coordinates. Lookup tables are read here
    /// and never again.
    pub fn new(
        name: impl Into<String>,
        params: &MonochromatorParams,
        placement: &Frame,
        source: &Vector3<f64>,
        sink: &Vector3<f64>,
    ) -> Result<Self, ComponentError> {
        let name = name.into();
        let props = CrystalProperties::new(
            params.tau,
            params.order,
            params.r0,
            params.t0,
            params.rms_y,
            params.rms_z,
        )?;
        let geometry = RowlandGeometry::build(&params.array, placement, source, sink)?;
        let crystal = MosaicCrystal {
            props,
            reflectivity: load_curve(params.reflectivity.as_deref())?,
            transmission: load_curve(params.transmission.as_deref())?,
        };
        log::info!(
            "{}: {} slabs, d={:.4} Å, radius={:.4} m",
            name,
            geometry.slabs.len(),
            props.d_spacing(),
            geometry.circle.radius
        );
        Ok(Self {
            name,
            geometry,
            crystal,
        })
    }

    pub fn geometry(&self) -> &RowlandGeometry {
        &self.geometry
    }

    pub fn crystal(&self) -> &MosaicCrystal {
        &self.crystal
    }

    /// Index of the slab the trajectory of `neutron` reaches, if any.
    pub fn find_slab(&self, neutron: &Neutron) -> Option<usize> {
        let hit = self
            .geometry
            .bounding_cylinder()
            .intersect(&neutron.position, &neutron.velocity)?;
        if hit.t_out < 0.0 || hit.exit == ExitSurface::Cap {
            return None;
        }
        let exit = neutron.position + neutron.velocity * hit.t_out;
        if exit.y.abs() > 0.5 * self.geometry.slab_size.height {
            return None;
        }
        let angle = unwrap_angle(
            self.geometry.circle.angle_of(&horizontal(&exit)),
            self.geometry.reference_angle,
        );
        self.geometry.slab_at_angle(angle)
    }

    /// Trace one neutron given in the component frame.
    ///
    /// On [`Outcome::NoInteraction`] the neutron is left untouched.
    /// Otherwise it ends on the face of the slab it met, still in the
    /// component frame.
    pub fn trace<R: Rng + ?Sized>(&self, neutron: &mut Neutron, rng: &mut R) -> Outcome {
        let Some(h) = self.find_slab(neutron) else {
            return Outcome::NoInteraction;
        };
        let frame = self.geometry.slabs[h].frame();
        let mut local = neutron.to_local(&frame);

        if local.velocity.x == 0.0 {
            return Outcome::NoInteraction;
        }
        let dt = -local.position.x / local.velocity.x;
        if dt < 0.0 {
            return Outcome::NoInteraction;
        }
        local.propagate(dt);
        local.position.x = 0.0;
        if !self.geometry.slab_size.contains(&local.position) {
            return Outcome::NoInteraction;
        }

        let mut k = local.wavevector();
        let outcome = self.crystal.interact(&mut k, &mut local.weight, rng);
        local.velocity = k * K2V;
        *neutron = local.to_parent(&frame);
        log::trace!("slab {}: {:?}, weight {:.4}", h, outcome, neutron.weight);
        outcome
    }
}

impl OpticalComponent for RowlandMonochromator {
    fn interact(&self, neutron: &mut Neutron, rng: &mut dyn RngCore) -> Outcome {
        self.trace(neutron, rng)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load an optional response table; a disabled or empty table yields `None`.
fn load_curve(path: Option<&Path>) -> Result<Option<Arc<dyn ResponseCurve>>, ComponentError> {
    let Some(path) = path else {
        return Ok(None);
    };
    Ok(LookupTable::load(path)?.map(|t| Arc::new(t) as Arc<dyn ResponseCurve>))
}

/// Speed (m/s) of a neutron of wavenumber `k` (Å⁻¹).
pub fn speed_for_wavenumber(k: f64) -> f64 {
    k * K2V
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rowland_geometry::lift;
    use rand_chacha::ChaCha8Rng;
    use std::io::Write;

    const D_PG: f64 = 3.355;

    fn params(r0: f64, focus: FocusMode) -> MonochromatorParams {
        MonochromatorParams {
            array: ArrayParams {
                nh: 7,
                angle_h: 2f64.to_radians(),
                gap: 0.0,
                focus,
                ..Default::default()
            },
            tau: 2.0 * std::f64::consts::PI / D_PG,
            order: 0,
            r0,
            t0: 0.9,
            rms_y: 0.0,
            rms_z: 0.0,
            reflectivity: None,
            transmission: None,
        }
    }

    fn source() -> Vector3<f64> {
        Vector3::new(1.0, 0.0, -2.0)
    }

    fn sink() -> Vector3<f64> {
        Vector3::new(1.0, 0.0, 2.0)
    }

    fn build(p: &MonochromatorParams) -> RowlandMonochromator {
        RowlandMonochromator::new("mono", p, &Frame::default(), &source(), &sink()).unwrap()
    }

    /// A neutron leaving the source towards `target` with the wavenumber
    /// that satisfies the Bragg condition for the symmetric layout.
    fn bragg_neutron(target: &Vector3<f64>) -> Neutron {
        let sin_theta = 1.0 / 5f64.sqrt();
        let k = std::f64::consts::PI / (D_PG * sin_theta);
        let dir = (target - source()).normalize();
        Neutron::new(source(), dir * speed_for_wavenumber(k))
    }

    #[test]
    fn test_centre_slab_reflects_to_sink() {
        let mono = build(&params(0.999, FocusMode::Exact));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scattered = 0;
        for _ in 0..20 {
            let mut n = bragg_neutron(&Vector3::zeros());
            match mono.trace(&mut n, &mut rng) {
                Outcome::Scattered => {
                    scattered += 1;
                    assert_relative_eq!(n.position, Vector3::zeros(), epsilon = 1e-9);
                    let expected = (sink() - n.position).normalize();
                    assert_relative_eq!(n.velocity.normalize(), expected, epsilon = 1e-9);
                }
                Outcome::Transmitted => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(scattered >= 18);
    }

    #[test]
    fn test_exact_focusing_sends_every_slab_to_sink() {
        let mono = build(&params(0.999, FocusMode::Exact));
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for (h, slab) in mono.geometry().slabs.iter().enumerate() {
            let mut n = bragg_neutron(&slab.position);
            assert_eq!(mono.find_slab(&n), Some(h));
            let speed = n.velocity.norm();
            if mono.trace(&mut n, &mut rng) == Outcome::Scattered {
                assert_relative_eq!(n.velocity.norm(), speed, max_relative = 1e-12);
                let expected = (sink() - slab.position).normalize();
                assert_relative_eq!(n.velocity.normalize(), expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_miss_leaves_neutron_unchanged() {
        let mono = build(&params(0.999, FocusMode::None));
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        // Straight to the sink, never reaching the covered arc.
        let original = bragg_neutron(&sink());
        let mut n = original.clone();
        assert_eq!(mono.trace(&mut n, &mut rng), Outcome::NoInteraction);
        assert_eq!(n, original);

        // Leaving through the top of the bounding cylinder.
        let original = bragg_neutron(&Vector3::new(0.0, 1.0, 0.0));
        let mut n = original.clone();
        assert_eq!(mono.trace(&mut n, &mut rng), Outcome::NoInteraction);
        assert_eq!(n, original);
    }

    #[test]
    fn test_gap_and_slab_edge_leave_neutron_unchanged() {
        // Three 2 cm slabs with 1 cm gaps spread over a wider arc, so each
        // window extends past the outer edge of its slab.
        let mut p = params(0.999, FocusMode::Exact);
        p.array.nh = 3;
        p.array.width = 0.02;
        p.array.gap = 0.01;
        p.array.angle_h = 0.03;
        let mono = build(&p);
        let geometry = mono.geometry();
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        let on_circle = |angle: f64| lift(&geometry.circle.point_at(angle), 0.0);
        let cases = [
            // Middle of the gap between slabs 0 and 1, inside slab 1's window.
            (geometry.edges[1] + 1e-4, 1),
            // Beyond the outer width edge of slab 0, inside its window.
            (geometry.edges[0] + 2e-3, 0),
        ];
        for (angle, h) in cases {
            let original = bragg_neutron(&on_circle(angle));
            assert_eq!(mono.find_slab(&original), Some(h));
            let mut n = original.clone();
            assert_eq!(mono.trace(&mut n, &mut rng), Outcome::NoInteraction);
            assert_eq!(n, original);
        }

        // The slab centre itself still interacts.
        let mut n = bragg_neutron(&geometry.slabs[1].position);
        assert_ne!(mono.trace(&mut n, &mut rng), Outcome::NoInteraction);
    }

    #[test]
    fn test_zero_reflectivity_only_transmits() {
        let mono = build(&params(0.0, FocusMode::Exact));
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for slab in &mono.geometry().slabs {
            let mut n = bragg_neutron(&slab.position);
            let dir = n.velocity.normalize();
            assert_eq!(mono.trace(&mut n, &mut rng), Outcome::Transmitted);
            assert_relative_eq!(n.weight, 0.9, epsilon = 1e-15);
            assert_relative_eq!(n.velocity.normalize(), dir, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_reflectivity_table_replaces_constant() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# k R").unwrap();
        writeln!(file, "0.5 0.0").unwrap();
        writeln!(file, "5.0 0.0").unwrap();
        let mut p = params(0.999, FocusMode::Exact);
        p.reflectivity = Some(file.path().to_path_buf());
        let mono = build(&p);
        assert!(mono.crystal().reflectivity.is_some());

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut n = bragg_neutron(&Vector3::zeros());
        assert_eq!(mono.trace(&mut n, &mut rng), Outcome::Transmitted);
    }

    #[test]
    fn test_disabled_table_path() {
        let mut p = params(0.5, FocusMode::None);
        p.transmission = Some(PathBuf::from("NULL"));
        let mono = build(&p);
        assert!(mono.crystal().transmission.is_none());
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let mut p = params(0.5, FocusMode::None);
        p.reflectivity = Some(PathBuf::from("/nonexistent/reflectivity.dat"));
        let result = RowlandMonochromator::new("mono", &p, &Frame::default(), &source(), &sink());
        assert!(matches!(result, Err(ComponentError::Table(_))));
    }

    #[test]
    fn test_negative_reflectivity_is_fatal() {
        let p = params(-0.1, FocusMode::None);
        let result = RowlandMonochromator::new("mono", &p, &Frame::default(), &source(), &sink());
        assert!(matches!(result, Err(ComponentError::NegativeReflectivity(_))));
    }
}
