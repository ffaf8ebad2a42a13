//! # Rowland Materials
//!
//! Crystal response data for the Rowland array. All curves implement the
//! [`ResponseCurve`](provider::ResponseCurve) trait, which maps a neutron
//! wavenumber to a scalar (peak reflectivity or transmission).
//!
//! ## Available data sources
//!
//! | Source | Module |
//! |--------|--------|
//! | Text lookup tables | [`table`] |
//! | Constant values | [`provider::ConstantResponse`] |
//! | Crystal presets (d-spacing, mosaic, r0) | [`crystals`] |

pub mod crystals;
pub mod provider;
pub mod table;

pub use provider::{ConstantResponse, MaterialError, ResponseCurve};
pub use table::{LookupTable, TableError};
