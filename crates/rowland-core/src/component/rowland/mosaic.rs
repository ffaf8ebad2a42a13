//! Mosaic crystal interaction.
//!
//! Decides, for one neutron inside a slab frame, between Bragg reflection,
//! transmission and absorption. The slab face is the local `y`-`z` plane,
//! so the lattice planes have their nominal normal along `x`.
//!
//! # Model
//!
//! The mosaic is an anisotropic Gaussian distribution of plane normals with
//! RMS widths `rms_y` (rotations about the vertical axis) and `rms_z`
//! (rotations about the horizontal in-plane axis), in the small-mosaic
//! approximation:
//!
//! 1. The reflection order is the one whose Bragg condition is closest to
//!    the normal component of $\mathbf{k}_i$.
//! 2. The deviation $\delta$ of the glancing angle from the Bragg angle
//!    $\theta$ gives the acceptance probability
//!    $p = R(k)\,\exp(-w_y \delta^2 / 2\sigma_y^2)\exp(-w_z \delta^2 / 2\sigma_z^2)$
//!    with weights $w_y = k_z^2/(k_y^2+k_z^2)$, $w_z = k_y^2/(k_y^2+k_z^2)$.
//! 3. Accepted neutrons pick a scattering vector on the Debye-Scherrer cone
//!    of all $\mathbf{Q}$ with $|\mathbf{Q}| = n\tau$ and
//!    $|\mathbf{k}_i + \mathbf{Q}| = k_i$, sampled from a Gaussian in the
//!    cone angle and reweighted by the true mosaic density, normalised with
//!    a 15-point Gauss-Legendre integral over the cone.
//!
//! The outgoing wavevector is $\mathbf{k}_f = \mathbf{k}_i + \mathbf{Q}$,
//! with $\mathbf{Q}$ pointing against the incoming normal component.

use std::sync::Arc;

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rowland_materials::ResponseCurve;

use super::quadrature::gauss_legendre_15;
use crate::types::{CrystalProperties, Outcome};

/// Upper clamp for reflectivity and transmission.
const MAX_PROBABILITY: f64 = 0.999;

/// Raw reflectivity above this value triggers a warning.
const REFLECTIVITY_WARN: f64 = 1.01;

/// Angular deviation accepted as exact when the mosaic width is zero (rad).
const ZERO_MOSAIC_TOLERANCE: f64 = 1e-9;

/// Shrink factor for the proposal width.
const WIDTH_SHRINK: f64 = 2.0 / 3.0;

/// Maximum number of proposal width reductions.
const MAX_WIDTH_STEPS: usize = 100;

/// Proposal extent, in units of its width, that must stay above the floor.
const TAIL_SIGMAS: f64 = 5.0;

/// Relative density floor at the proposal tails.
const TAIL_FLOOR: f64 = 1e-6;

/// Floor on cos(theta) near backscattering.
const MIN_COS_THETA: f64 = 1e-6;

/// A slab crystal with optional wavenumber-dependent response curves.
#[derive(Debug, Clone)]
pub struct MosaicCrystal {
    pub props: CrystalProperties,
    /// Replaces the constant `r0` when present.
    pub reflectivity: Option<Arc<dyn ResponseCurve>>,
    /// Replaces the constant `t0` when present.
    pub transmission: Option<Arc<dyn ResponseCurve>>,
}

/// The Debye-Scherrer cone of elastic scattering vectors for one incident
/// wavevector, parametrised by the cone angle $\varphi$.
#[derive(Debug, Clone, Copy)]
struct ScatteringCone {
    /// Centre of the circle traced by the tip of Q.
    centre: Vector3<f64>,
    /// In-cone axis towards the nominal scattering vector, scaled by the
    /// circle radius.
    b1: Vector3<f64>,
    /// Second in-cone axis, scaled by the circle radius.
    b2: Vector3<f64>,
    /// Nominal plane normal (unit).
    normal: Vector3<f64>,
    /// |Q|.
    q: f64,
}

impl ScatteringCone {
    fn new(ki: &Vector3<f64>, q: f64, normal: Vector3<f64>) -> Self {
        let k2 = ki.norm_squared();
        let k_hat = ki / k2.sqrt();
        // Elastic condition: ki.Q = -q^2 / 2
        let centre = ki * (-0.5 * q * q / k2);
        let radius = q * (1.0 - 0.25 * q * q / k2).max(0.0).sqrt();

        let nominal = normal * q;
        let perp = nominal - k_hat * nominal.dot(&k_hat);
        let e1 = if perp.norm() > 1e-12 * q {
            perp.normalize()
        } else {
            // Normal incidence: any axis perpendicular to ki spans the cone.
            let c = k_hat.cross(&Vector3::y());
            if c.norm() > 1e-12 {
                c.normalize()
            } else {
                k_hat.cross(&Vector3::z()).normalize()
            }
        };
        let e2 = k_hat.cross(&e1);
        Self {
            centre,
            b1: e1 * radius,
            b2: e2 * radius,
            normal,
            q,
        }
    }

    /// Scattering vector at cone angle `phi`.
    fn vector(&self, phi: f64) -> Vector3<f64> {
        self.centre + self.b1 * phi.cos() + self.b2 * phi.sin()
    }
}

impl MosaicCrystal {
    /// A crystal using the constant reflectivity and transmission.
    pub fn new(props: CrystalProperties) -> Self {
        Self {
            props,
            reflectivity: None,
            transmission: None,
        }
    }

    /// Reflection order closest to the Bragg condition for `ki`, if it is
    /// allowed.
    pub fn select_order(&self, ki: &Vector3<f64>) -> Option<u32> {
        let k = ki.norm();
        let n = (2.0 * ki.x.abs() / self.props.tau).round();
        if n < 1.0 || !n.is_finite() {
            return None;
        }
        if self.props.order != 0 && n != self.props.order as f64 {
            return None;
        }
        if 2.0 * k < n * self.props.tau {
            return None;
        }
        Some(n as u32)
    }

    /// Peak reflectivity at wavenumber `k`, clamped to `[0, 0.999]`.
    pub fn reflectivity_at(&self, k: f64) -> f64 {
        let raw = match &self.reflectivity {
            Some(curve) => curve.value_at(k),
            None => self.props.r0,
        };
        if raw > REFLECTIVITY_WARN || raw < 0.0 {
            log::warn!("Reflectivity {:.4} at k={:.4} 1/AA out of range, clamping", raw, k);
        }
        raw.clamp(0.0, MAX_PROBABILITY)
    }

    /// Transmission at wavenumber `k`; values above 1 become 0.999 and
    /// negative values 0.
    pub fn transmission_at(&self, k: f64) -> f64 {
        let raw = match &self.transmission {
            Some(curve) => curve.value_at(k),
            None => self.props.t0,
        };
        if raw > 1.0 {
            log::warn!(
                "Transmission {:.4} at k={:.4} 1/AA exceeds 1, using {}",
                raw,
                k,
                MAX_PROBABILITY
            );
            MAX_PROBABILITY
        } else if raw < 0.0 {
            log::warn!("Transmission {:.4} at k={:.4} 1/AA is negative, using 0", raw, k);
            0.0
        } else {
            raw
        }
    }

    /// Probability of attempting a Bragg reflection for `ki`.
    ///
    /// Zero when no reflection order is allowed.
    pub fn acceptance_probability(&self, ki: &Vector3<f64>) -> f64 {
        let Some(order) = self.select_order(ki) else {
            return 0.0;
        };
        let k = ki.norm();
        let r = self.reflectivity_at(k);
        if r == 0.0 {
            return 0.0;
        }
        let q = order as f64 * self.props.tau;
        let theta = (0.5 * q / k).asin();
        let delta = (ki.x.abs() / k).min(1.0).asin() - theta;

        let kyz2 = ki.y * ki.y + ki.z * ki.z;
        let (wy, wz) = if kyz2 > 0.0 {
            (ki.z * ki.z / kyz2, ki.y * ki.y / kyz2)
        } else {
            (0.5, 0.5)
        };
        r * gaussian(delta, wy, self.props.rms_y) * gaussian(delta, wz, self.props.rms_z)
    }

    /// Let a neutron with wavevector `ki` meet the crystal.
    ///
    /// On [`Outcome::Scattered`] `ki` is replaced by the outgoing wavevector;
    /// `weight` is multiplied by the importance correction for a reflection
    /// or by the transmission otherwise.
    pub fn interact<R: Rng + ?Sized>(
        &self,
        ki: &mut Vector3<f64>,
        weight: &mut f64,
        rng: &mut R,
    ) -> Outcome {
        let k = ki.norm();
        if k > 0.0 {
            let p = self.acceptance_probability(ki);
            if p > 0.0 && rng.gen::<f64>() < p {
                if let Some((q_vec, correction)) = self.sample_reflection(ki, rng) {
                    *ki += q_vec;
                    *weight *= correction;
                    return Outcome::Scattered;
                }
            }
        }

        let t = self.transmission_at(k);
        if t > 0.0 {
            *weight *= t;
            Outcome::Transmitted
        } else {
            Outcome::Absorbed
        }
    }

    /// Draw a scattering vector from the mosaic distribution on the cone.
    ///
    /// Returns the vector and the importance-corrected probability in
    /// `(0, 1]`, or `None` when the sampled point carries no probability.
    fn sample_reflection<R: Rng + ?Sized>(
        &self,
        ki: &Vector3<f64>,
        rng: &mut R,
    ) -> Option<(Vector3<f64>, f64)> {
        let order = self.select_order(ki)?;
        let k = ki.norm();
        let q = order as f64 * self.props.tau;
        let normal = Vector3::new(-ki.x.signum(), 0.0, 0.0);
        let cone = ScatteringCone::new(ki, q, normal);
        let density = |phi: f64| self.mosaic_density(&cone, phi);

        let cos_theta = (1.0 - 0.25 * q * q / (k * k)).max(0.0).sqrt().max(MIN_COS_THETA);
        let mut sigma = (self.props.rms_max / cos_theta).min(std::f64::consts::PI / TAIL_SIGMAS);
        if !(sigma > 0.0) {
            // Zero mosaic: the nominal direction is the only one.
            return (density(0.0) > 0.0).then(|| (cone.vector(0.0), 1.0));
        }
        if self.props.rms_y.min(self.props.rms_z) == 0.0 {
            // One zero-width axis collapses the density on the cone to a point.
            let phi = self.degenerate_angle(&cone)?;
            return (density(phi) > 0.0).then(|| (cone.vector(phi), 1.0));
        }

        let peak = density(0.0);
        for _ in 0..MAX_WIDTH_STEPS {
            let tail = density(TAIL_SIGMAS * sigma).max(density(-TAIL_SIGMAS * sigma));
            if tail >= TAIL_FLOOR * peak {
                break;
            }
            sigma *= WIDTH_SHRINK;
        }

        let norm = gauss_legendre_15(&density, TAIL_SIGMAS * sigma);
        if !(norm > 0.0) || !norm.is_finite() {
            return None;
        }

        let proposal = Normal::new(0.0, sigma).ok()?;
        let phi = proposal.sample(rng);
        let proposal_density = (-0.5 * (phi / sigma).powi(2)).exp()
            / ((2.0 * std::f64::consts::PI).sqrt() * sigma);
        let correction = (density(phi) / (norm * proposal_density)).min(1.0);
        (correction > 0.0).then(|| (cone.vector(phi), correction))
    }

    /// Cone angle at which the tilt about the zero-width mosaic axis
    /// vanishes, choosing the root with the larger density.
    ///
    /// A zero `rms_y` pins the `z` component of Q to zero and a zero `rms_z`
    /// pins its `y` component. Returns `None` when the cone never crosses
    /// that plane.
    fn degenerate_angle(&self, cone: &ScatteringCone) -> Option<f64> {
        let axis = if self.props.rms_y == 0.0 { 2 } else { 1 };
        let (a, b, c) = (cone.centre[axis], cone.b1[axis], cone.b2[axis]);
        // a + b cos(phi) + c sin(phi) = 0
        let amplitude = b.hypot(c);
        if amplitude <= ZERO_MOSAIC_TOLERANCE * cone.q {
            return (a.abs() <= ZERO_MOSAIC_TOLERANCE * cone.q).then_some(0.0);
        }
        let ratio = -a / amplitude;
        if ratio.abs() > 1.0 + ZERO_MOSAIC_TOLERANCE {
            return None;
        }
        let offset = c.atan2(b);
        // Tangent at the nominal direction when the free axis is in-plane.
        let spread = ratio.clamp(-1.0, 1.0).acos();
        let first = offset + spread;
        let second = offset - spread;
        let phi = if self.mosaic_density(cone, second) > self.mosaic_density(cone, first) {
            second
        } else {
            first
        };
        Some(phi)
    }

    /// Unnormalised mosaic density of the plane normal implied by cone
    /// angle `phi`.
    fn mosaic_density(&self, cone: &ScatteringCone, phi: f64) -> f64 {
        let u = cone.vector(phi) / cone.q;
        let along = u.dot(&cone.normal);
        let eta_y = u.z.atan2(along);
        let eta_z = u.y.atan2(along);
        gaussian(eta_y, 1.0, self.props.rms_y) * gaussian(eta_z, 1.0, self.props.rms_z)
    }
}

/// $\exp(-w\,x^2 / 2\sigma^2)$, with a zero width treated as a delta.
fn gaussian(x: f64, weight: f64, sigma: f64) -> f64 {
    if weight == 0.0 {
        1.0
    } else if sigma > 0.0 {
        (-0.5 * weight * x * x / (sigma * sigma)).exp()
    } else if x.abs() <= ZERO_MOSAIC_TOLERANCE {
        1.0
    } else {
        0.0
    }
}
