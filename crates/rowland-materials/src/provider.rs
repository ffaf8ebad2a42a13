//! Response curve provider trait.
//!
//! A response curve maps the neutron wavenumber $k$ (Å⁻¹) to a scalar such
//! as the peak reflectivity or the transmission of a crystal. Curves are
//! built once during setup and only read afterwards, so they must be
//! shareable across particle tasks.

use thiserror::Error;

/// Errors from material and curve providers.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Crystal not found: {0}")]
    NotFound(String),
}

/// Provides a wavenumber-dependent scalar.
pub trait ResponseCurve: Send + Sync + std::fmt::Debug {
    /// Human-readable name of this curve (file name or constant).
    fn name(&self) -> &str;

    /// Value of the curve at wavenumber `k` (Å⁻¹).
    fn value_at(&self, k: f64) -> f64;
}

/// A curve with the same value at every wavenumber.
#[derive(Debug, Clone)]
pub struct ConstantResponse {
    name: String,
    value: f64,
}

impl ConstantResponse {
    pub fn new(value: f64) -> Self {
        Self {
            name: format!("constant {}", value),
            value,
        }
    }
}

impl ResponseCurve for ConstantResponse {
    fn name(&self) -> &str {
        &self.name
    }

    fn value_at(&self, _k: f64) -> f64 {
        self.value
    }
}
