//! Built-in monochromator crystal presets.
//!
//! Lattice spacings of the reflections most often used for neutron
//! monochromators, with typical mosaic spreads and peak reflectivities for
//! commercially grown crystals.
//!
//! ## Available crystals
//!
//! | Identifier | Reflection | d (Å) | Mosaic (arcmin FWHM) |
//! |-----------|------------|-------|----------------------|
//! | `PG002` | Pyrolytic graphite (002) | 3.355 | 30 |
//! | `Si111` | Silicon (111) | 3.1356 | 10 |
//! | `Ge311` | Germanium (311) | 1.7058 | 20 |
//! | `Cu111` | Copper (111) | 2.087 | 30 |
//! | `Heusler111` | Cu₂MnAl (111) | 3.435 | 40 |

use std::f64::consts::PI;

use serde::Serialize;

use crate::provider::MaterialError;

/// A tabulated crystal reflection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrystalPreset {
    /// Identifier used in job files.
    pub name: &'static str,
    /// Description for listings.
    pub description: &'static str,
    /// Lattice plane spacing (Å).
    pub d_spacing: f64,
    /// Typical mosaic spread, FWHM (arc minutes).
    pub mosaic_arcmin: f64,
    /// Typical peak reflectivity.
    pub r0: f64,
}

impl CrystalPreset {
    /// Scattering vector magnitude $\tau = 2\pi / d$ (Å⁻¹).
    pub fn tau(&self) -> f64 {
        2.0 * PI / self.d_spacing
    }
}

pub const PRESETS: [CrystalPreset; 5] = [
    CrystalPreset {
        name: "PG002",
        description: "Pyrolytic graphite (002)",
        d_spacing: 3.355,
        mosaic_arcmin: 30.0,
        r0: 0.7,
    },
    CrystalPreset {
        name: "Si111",
        description: "Silicon (111)",
        d_spacing: 3.1356,
        mosaic_arcmin: 10.0,
        r0: 0.8,
    },
    CrystalPreset {
        name: "Ge311",
        description: "Germanium (311)",
        d_spacing: 1.7058,
        mosaic_arcmin: 20.0,
        r0: 0.6,
    },
    CrystalPreset {
        name: "Cu111",
        description: "Copper (111)",
        d_spacing: 2.087,
        mosaic_arcmin: 30.0,
        r0: 0.5,
    },
    CrystalPreset {
        name: "Heusler111",
        description: "Heusler alloy Cu2MnAl (111)",
        d_spacing: 3.435,
        mosaic_arcmin: 40.0,
        r0: 0.4,
    },
];

/// Look up a preset by identifier (case-insensitive).
pub fn preset(name: &str) -> Result<CrystalPreset, MaterialError> {
    PRESETS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .copied()
        .ok_or_else(|| MaterialError::NotFound(name.to_string()))
}
