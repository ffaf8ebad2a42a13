//! Optical component abstraction and implementations.
//!
//! The [`OpticalComponent`] trait is the per-particle interface seen by the
//! tracing loop: one neutron in, one [`Outcome`] out, with the neutron
//! mutated in place. Implementations are immutable after construction and
//! must be shareable across threads.

pub mod rowland;

use rand::RngCore;
use rowland_geometry::GeometryError;
use rowland_materials::TableError;
use thiserror::Error;

use crate::types::{Neutron, Outcome};

/// Fatal errors while constructing a component.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("Scattering vector must be positive, got {0}")]
    InvalidScatteringVector(f64),

    #[error("Peak reflectivity must not be negative, got {0}")]
    NegativeReflectivity(f64),

    #[error("Mosaic spread must be finite and non-negative, got rms_y={rms_y}, rms_z={rms_z}")]
    InvalidMosaic { rms_y: f64, rms_z: f64 },

    #[error("Slab count must be at least 1")]
    NoSlabs,

    #[error("Invalid slab dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Rowland circle construction failed: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Angular coverage {coverage:.4} rad cannot hold {nh} slabs of {slab_angle:.4} rad")]
    Overconstrained {
        coverage: f64,
        slab_angle: f64,
        nh: usize,
    },

    #[error("Lookup table error: {0}")]
    Table(#[from] TableError),
}

/// The interface every traced component implements.
///
/// `interact` receives the neutron in the component's local frame and
/// leaves it in that frame. It never fails: every numerical edge case is
/// resolved into one of the [`Outcome`] variants. Randomness comes only
/// from `rng`, which the caller owns per particle.
pub trait OpticalComponent: Send + Sync {
    /// Let one neutron meet the component.
    fn interact(&self, neutron: &mut Neutron, rng: &mut dyn RngCore) -> Outcome;

    /// Human-readable name of the component.
    fn name(&self) -> &str;
}
