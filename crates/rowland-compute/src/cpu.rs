//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;
use rowland_core::component::OpticalComponent;
use rowland_core::types::{Neutron, Outcome};

use crate::backend::{particle_rng, BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises particles across threads via Rayon.
#[derive(Debug)]
pub struct CpuBackend {
    num_threads: usize,
    /// Dedicated pool when a thread count was requested; the global pool
    /// otherwise.
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend on the global Rayon pool.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with its own pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn trace_batch(
        &self,
        component: &dyn OpticalComponent,
        neutrons: &mut [Neutron],
        seed: u64,
    ) -> Result<Vec<Outcome>, ComputeError> {
        log::debug!(
            "Tracing {} neutrons through '{}' on {} threads",
            neutrons.len(),
            component.name(),
            self.num_threads
        );
        Ok(match &self.pool {
            Some(pool) => pool.install(|| trace_parallel(component, neutrons, seed)),
            None => trace_parallel(component, neutrons, seed),
        })
    }
}

fn trace_parallel(
    component: &dyn OpticalComponent,
    neutrons: &mut [Neutron],
    seed: u64,
) -> Vec<Outcome> {
    neutrons
        .par_iter_mut()
        .enumerate()
        .map(|(i, neutron)| {
            let mut rng = particle_rng(seed, i);
            component.interact(neutron, &mut rng)
        })
        .collect()
}
