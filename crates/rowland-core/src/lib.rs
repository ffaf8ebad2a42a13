//! # Rowland Core
//!
//! The physics backbone of the Rowland framework: a curved array of mosaic
//! crystal slabs placed on a Rowland focusing circle, and the Monte Carlo
//! model deciding whether each neutron is Bragg-reflected, transmitted or
//! absorbed.
//!
//! ## Architecture
//!
//! Components implement the [`component::OpticalComponent`] trait, which
//! takes one neutron in the component frame and returns an
//! [`types::Outcome`]. The Rowland monochromator
//! ([`component::rowland::RowlandMonochromator`]) is built once from its
//! parameters and is read-only afterwards, so a single instance can serve
//! any number of particle tasks.
//!
//! ## Modules
//!
//! - [`types`]: Neutron state, crystal properties, outcomes and unit
//!   conversions.
//! - [`component`]: Component trait, construction errors and the Rowland
//!   monochromator (array layout, slab dispatch, mosaic interaction).

pub mod component;
pub mod types;
