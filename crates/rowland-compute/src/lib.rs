//! # Rowland Compute
//!
//! Execution backends for tracing batches of neutrons through an
//! [`OpticalComponent`](rowland_core::component::OpticalComponent). Every
//! backend gives particle `i` its own random stream derived from the batch
//! seed, so results do not depend on the backend or the thread count.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |
//! | Serial | always | Implemented |

pub mod backend;
pub mod serial;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{particle_rng, BackendType, ComputeBackend, ComputeError, DeviceInfo};
pub use serial::SerialBackend;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
