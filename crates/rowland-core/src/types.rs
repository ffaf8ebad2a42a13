//! Core types shared across the Rowland framework.
//!
//! Neutron state is carried in SI units (m, m/s, s). Wavevectors and
//! scattering vectors are in Å⁻¹, the usual unit for crystal data.

use nalgebra::Vector3;
use rowland_geometry::Frame;
use serde::{Deserialize, Serialize};

use crate::component::ComponentError;

/// Conversion from speed (m/s) to wavenumber (Å⁻¹): $k = m_n v / \hbar$.
pub const V2K: f64 = 1.588_253_6e-3;

/// Conversion from wavenumber (Å⁻¹) to speed (m/s).
pub const K2V: f64 = 1.0 / V2K;

/// Conversion from FWHM to RMS of a Gaussian, $1 / (2\sqrt{2 \ln 2})$.
pub const FWHM_TO_RMS: f64 = 0.424_660_900_144_009_5;

/// Arc minutes to radians.
pub const MIN_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 60.0);

/// A neutron ray as seen by a component.
#[derive(Debug, Clone, PartialEq)]
pub struct Neutron {
    /// Position (m).
    pub position: Vector3<f64>,
    /// Velocity (m/s).
    pub velocity: Vector3<f64>,
    /// Polarisation vector.
    pub spin: Vector3<f64>,
    /// Time of flight (s).
    pub time: f64,
    /// Statistical weight, never negative.
    pub weight: f64,
}

impl Neutron {
    /// An unpolarised neutron with unit weight at time zero.
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            position,
            velocity,
            spin: Vector3::zeros(),
            time: 0.0,
            weight: 1.0,
        }
    }

    /// Wavevector $\mathbf{k} = m_n \mathbf{v} / \hbar$ (Å⁻¹).
    pub fn wavevector(&self) -> Vector3<f64> {
        self.velocity * V2K
    }

    /// Wavelength $\lambda = 2\pi / k$ (Å).
    pub fn wavelength(&self) -> f64 {
        2.0 * std::f64::consts::PI / (self.velocity.norm() * V2K)
    }

    /// Move along the flight path for `dt` seconds.
    pub fn propagate(&mut self, dt: f64) {
        self.position += self.velocity * dt;
        self.time += dt;
    }

    /// The same neutron expressed in the local coordinates of `frame`.
    pub fn to_local(&self, frame: &Frame) -> Neutron {
        Neutron {
            position: frame.to_local(&self.position),
            velocity: frame.direction_to_local(&self.velocity),
            spin: frame.direction_to_local(&self.spin),
            ..*self
        }
    }

    /// The same neutron expressed in the parent coordinates of `frame`.
    pub fn to_parent(&self, frame: &Frame) -> Neutron {
        Neutron {
            position: frame.to_parent(&self.position),
            velocity: frame.direction_to_parent(&self.velocity),
            spin: frame.direction_to_parent(&self.spin),
            ..*self
        }
    }
}

/// The result of a neutron meeting a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Bragg-reflected: velocity and weight updated, the neutron continues.
    Scattered,
    /// Passed through a slab, weight scaled by the transmission.
    Transmitted,
    /// Removed from the simulation.
    Absorbed,
    /// Did not meet any slab; the neutron is unchanged.
    NoInteraction,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Scattered,
        Outcome::Transmitted,
        Outcome::Absorbed,
        Outcome::NoInteraction,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Scattered => "scattered",
            Outcome::Transmitted => "transmitted",
            Outcome::Absorbed => "absorbed",
            Outcome::NoInteraction => "no_interaction",
        }
    }
}

/// Physical properties of the crystal slabs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrystalProperties {
    /// Scattering vector magnitude $\tau = 2\pi/d$ (Å⁻¹).
    pub tau: f64,
    /// Required diffraction order, 0 for any.
    pub order: u32,
    /// Peak reflectivity used when no reflectivity table is loaded.
    pub r0: f64,
    /// Transmission used when no transmission table is loaded.
    pub t0: f64,
    /// RMS mosaic for rotations about the vertical axis (rad).
    pub rms_y: f64,
    /// RMS mosaic for rotations about the in-plane horizontal axis (rad).
    pub rms_z: f64,
    /// The larger of the two.
    pub rms_max: f64,
}

impl CrystalProperties {
    /// Validate and assemble crystal properties.
    ///
    /// A non-positive `tau` or negative `r0` is fatal. A peak reflectivity
    /// or transmission above one is accepted with a warning (it is clamped
    /// when used) and a negative transmission is clamped to zero.
    pub fn new(
        tau: f64,
        order: u32,
        r0: f64,
        t0: f64,
        rms_y: f64,
        rms_z: f64,
    ) -> Result<Self, ComponentError> {
        if !(tau > 0.0) || !tau.is_finite() {
            return Err(ComponentError::InvalidScatteringVector(tau));
        }
        if r0 < 0.0 || r0.is_nan() {
            return Err(ComponentError::NegativeReflectivity(r0));
        }
        if !(rms_y >= 0.0 && rms_z >= 0.0) || !rms_y.is_finite() || !rms_z.is_finite() {
            return Err(ComponentError::InvalidMosaic { rms_y, rms_z });
        }
        if r0 > 1.0 {
            log::warn!("Peak reflectivity r0 = {} exceeds 1, it will be clamped", r0);
        }
        if r0 == 0.0 {
            log::info!("Peak reflectivity r0 = 0: Bragg scattering disabled");
        }
        let t0 = if t0 < 0.0 {
            log::warn!("Transmission t0 = {} is negative, using 0", t0);
            0.0
        } else {
            if t0 > 1.0 {
                log::warn!("Transmission t0 = {} exceeds 1, it will be clamped", t0);
            }
            t0
        };
        Ok(Self {
            tau,
            order,
            r0,
            t0,
            rms_y,
            rms_z,
            rms_max: rms_y.max(rms_z),
        })
    }

    /// Lattice spacing $d = 2\pi/\tau$ (Å).
    pub fn d_spacing(&self) -> f64 {
        2.0 * std::f64::consts::PI / self.tau
    }
}

/// Convert a mosaic FWHM in arc minutes to an RMS width in radians.
pub fn mosaic_fwhm_arcmin_to_rms(fwhm: f64) -> f64 {
    fwhm * MIN_TO_RAD * FWHM_TO_RMS
}
