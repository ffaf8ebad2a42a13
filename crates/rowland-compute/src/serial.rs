//! Single-threaded backend.

use rowland_core::component::OpticalComponent;
use rowland_core::types::{Neutron, Outcome};

use crate::backend::{particle_rng, BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// Traces particles one after the other on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn trace_batch(
        &self,
        component: &dyn OpticalComponent,
        neutrons: &mut [Neutron],
        seed: u64,
    ) -> Result<Vec<Outcome>, ComputeError> {
        Ok(neutrons
            .iter_mut()
            .enumerate()
            .map(|(i, neutron)| {
                let mut rng = particle_rng(seed, i);
                component.interact(neutron, &mut rng)
            })
            .collect())
    }
}
