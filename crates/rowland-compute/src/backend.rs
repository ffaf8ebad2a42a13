//! Compute backend trait and device description.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies so the
//! tracing loop never depends on how particles are scheduled.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rowland_core::component::OpticalComponent;
use rowland_core::types::{Neutron, Outcome};
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Thread pool construction failed: {0}")]
    ThreadPool(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
    Serial,
}

/// Abstraction over compute backends.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Let every neutron meet `component` once.
    ///
    /// Neutrons are given and returned in the component frame. Particle `i`
    /// draws only from [`particle_rng(seed, i)`](particle_rng). The returned
    /// outcomes are in the order of `neutrons`.
    fn trace_batch(
        &self,
        component: &dyn OpticalComponent,
        neutrons: &mut [Neutron],
        seed: u64,
    ) -> Result<Vec<Outcome>, ComputeError>;
}

/// The private random stream of particle `index` in a batch seeded with
/// `seed`.
pub fn particle_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}
