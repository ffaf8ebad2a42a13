//! TOML configuration deserialisation for simulation jobs.
//!
//! Angles are given in degrees and mosaic spreads as FWHM in arc minutes;
//! [`MonochromatorConfig::to_params`] converts them to the radians used by
//! the core.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nalgebra::Vector3;
use rowland_core::component::rowland::{ArrayParams, FocusMode, MonochromatorParams};
use rowland_core::types::mosaic_fwhm_arcmin_to_rms;
use rowland_geometry::Frame;
use rowland_materials::crystals;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub monochromator: MonochromatorConfig,
    pub source: PointConfig,
    pub sink: PointConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub beam: BeamConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// The crystal array.
#[derive(Debug, Deserialize)]
pub struct MonochromatorConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Slab width in m.
    #[serde(default = "default_width")]
    pub width: f64,
    /// Slab height in m; replaced when `angle_v` is set.
    #[serde(default = "default_height")]
    pub height: f64,
    /// Gap between slabs in m.
    #[serde(default = "default_gap")]
    pub gap: f64,
    /// Number of slabs.
    #[serde(default = "default_nh")]
    pub nh: usize,
    /// Isotropic mosaic FWHM in arc minutes.
    pub mosaic: Option<f64>,
    /// Horizontal mosaic FWHM in arc minutes (rotations about the vertical).
    pub mosaic_h: Option<f64>,
    /// Vertical mosaic FWHM in arc minutes.
    pub mosaic_v: Option<f64>,
    /// Peak reflectivity; defaults to the crystal preset, then 1.
    pub r0: Option<f64>,
    #[serde(default = "default_t0")]
    pub t0: f64,
    /// Scattering vector in 1/Å.
    pub q: Option<f64>,
    /// Lattice spacing in Å.
    pub d_spacing: Option<f64>,
    /// Crystal preset name, e.g. "PG002".
    pub crystal: Option<String>,
    /// Explicit focus radius in m (0 for none).
    #[serde(default)]
    pub rh: f64,
    /// Required diffraction order (0 for any).
    #[serde(default)]
    pub order: u32,
    /// Horizontal aperture seen from the source, degrees.
    #[serde(default)]
    pub angle_h: f64,
    /// Vertical aperture seen from the source, degrees.
    #[serde(default)]
    pub angle_v: f64,
    /// Focusing tag: "", "parallel", "point" or "exact".
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub verbose: bool,
    pub reflectivity: Option<PathBuf>,
    pub transmission: Option<PathBuf>,
}

/// A reference point in laboratory coordinates (m).
#[derive(Debug, Deserialize)]
pub struct PointConfig {
    pub position: [f64; 3],
}

/// Position and orientation of the array in the laboratory.
#[derive(Debug, Default, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub position: [f64; 3],
    /// Rotation about the vertical axis, degrees.
    #[serde(default)]
    pub rotation: f64,
}

/// Incoming beam from the source point.
#[derive(Debug, Deserialize)]
pub struct BeamConfig {
    #[serde(default = "default_count")]
    pub count: usize,
    /// Mean wavelength in Å; defaults to the Bragg wavelength at the array
    /// origin.
    pub lambda: Option<f64>,
    /// Half-width of the uniform wavelength band in Å.
    #[serde(default)]
    pub dlambda: f64,
    /// Horizontal half-divergence in degrees; defaults to the array aperture.
    pub divergence_h: Option<f64>,
    /// Vertical half-divergence in degrees; defaults to the slab height.
    pub divergence_v: Option<f64>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            lambda: None,
            dlambda: 0.0,
            divergence_h: None,
            divergence_v: None,
            seed: default_seed(),
        }
    }
}

/// Flat detector through the sink, facing the array.
#[derive(Debug, Deserialize)]
pub struct DetectorConfig {
    /// Horizontal width in m.
    #[serde(default = "default_detector_size")]
    pub width: f64,
    /// Vertical height in m.
    #[serde(default = "default_detector_size")]
    pub height: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            width: default_detector_size(),
            height: default_detector_size(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the outcome summary as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_summary: bool,
    /// Whether to also save the summary as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
    /// Whether to save the slab layout as CSV (default: false).
    #[serde(default)]
    pub save_geometry: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_summary: true,
            save_json: false,
            save_geometry: false,
        }
    }
}

/// Execution settings.
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Compute backend: "cpu" or "serial". Default: "cpu".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads for the CPU backend; all cores when unset.
    pub threads: Option<usize>,
    /// Neutrons traced per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_name() -> String {
    "monochromator".into()
}
fn default_width() -> f64 {
    0.02
}
fn default_height() -> f64 {
    0.2
}
fn default_gap() -> f64 {
    0.0005
}
fn default_nh() -> usize {
    11
}
fn default_t0() -> f64 {
    1.0
}
fn default_count() -> usize {
    100_000
}
fn default_seed() -> u64 {
    42
}
fn default_detector_size() -> f64 {
    0.2
}
fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}
fn default_backend() -> String {
    "cpu".into()
}
fn default_batch_size() -> usize {
    50_000
}

impl MonochromatorConfig {
    /// Resolve presets and units into core construction parameters.
    pub fn to_params(&self) -> Result<MonochromatorParams> {
        let preset = self
            .crystal
            .as_deref()
            .map(crystals::preset)
            .transpose()
            .context("Unknown crystal preset")?;

        let tau = match (self.q, self.d_spacing, &preset) {
            (Some(q), _, _) => q,
            (None, Some(d), _) if d > 0.0 => 2.0 * PI / d,
            (None, Some(d), _) => anyhow::bail!("d_spacing must be positive, got {}", d),
            (None, None, Some(p)) => p.tau(),
            (None, None, None) => {
                anyhow::bail!("Monochromator needs one of 'q', 'd_spacing' or 'crystal'")
            }
        };

        let isotropic = self.mosaic.or(preset.as_ref().map(|p| p.mosaic_arcmin));
        let mosaic_h = self
            .mosaic_h
            .or(isotropic)
            .context("Monochromator needs 'mosaic' or 'mosaic_h' (FWHM arcmin)")?;
        let mosaic_v = self
            .mosaic_v
            .or(isotropic)
            .context("Monochromator needs 'mosaic' or 'mosaic_v' (FWHM arcmin)")?;
        let r0 = self.r0.or(preset.as_ref().map(|p| p.r0)).unwrap_or(1.0);

        Ok(MonochromatorParams {
            array: ArrayParams {
                nh: self.nh,
                width: self.width,
                height: self.height,
                gap: self.gap,
                rh: self.rh,
                angle_h: self.angle_h.to_radians(),
                angle_v: self.angle_v.to_radians(),
                focus: FocusMode::from_tag(&self.focus),
                verbose: self.verbose,
            },
            tau,
            order: self.order,
            r0,
            t0: self.t0,
            rms_y: mosaic_fwhm_arcmin_to_rms(mosaic_h),
            rms_z: mosaic_fwhm_arcmin_to_rms(mosaic_v),
            reflectivity: self.reflectivity.clone(),
            transmission: self.transmission.clone(),
        })
    }
}

impl PointConfig {
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }
}

impl PlacementConfig {
    /// The array frame in laboratory coordinates.
    pub fn frame(&self) -> Frame {
        Frame::vertical(Vector3::from(self.position), self.rotation.to_radians())
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read configuration {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid configuration {}", path.display()))
}

/// Parse a job configuration from TOML text.
pub fn parse_config(content: &str) -> Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    if config.beam.count == 0 {
        anyhow::bail!("beam.count must be at least 1");
    }
    if config.simulation.batch_size == 0 {
        anyhow::bail!("simulation.batch_size must be at least 1");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MINIMAL: &str = r#"
        [monochromator]
        crystal = "PG002"
        nh = 7
        angle_h = 4.0
        focus = "exact"

        [source]
        position = [1.0, 0.0, -2.0]

        [sink]
        position = [1.0, 0.0, 2.0]
    "#;

    #[test]
    fn test_minimal_job_uses_defaults() {
        let job = parse_config(MINIMAL).unwrap();
        assert_eq!(job.beam.count, 100_000);
        assert_eq!(job.simulation.backend, "cpu");
        assert!(job.output.save_summary);
        assert_eq!(job.monochromator.t0, 1.0);

        let params = job.monochromator.to_params().unwrap();
        assert_eq!(params.array.nh, 7);
        assert_eq!(params.array.focus, FocusMode::Exact);
        assert_relative_eq!(params.array.angle_h, 4f64.to_radians());
        assert_relative_eq!(params.tau, 2.0 * PI / 3.355, epsilon = 1e-12);
        assert_relative_eq!(params.rms_y, mosaic_fwhm_arcmin_to_rms(30.0));
        assert_eq!(params.r0, 0.7);
    }

    #[test]
    fn test_explicit_values_override_preset() {
        let text = MINIMAL.replace(
            "crystal = \"PG002\"",
            "crystal = \"PG002\"\nq = 1.9\nmosaic_v = 60.0\nr0 = 0.9",
        );
        let params = parse_config(&text).unwrap().monochromator.to_params().unwrap();
        assert_eq!(params.tau, 1.9);
        assert_eq!(params.r0, 0.9);
        assert_relative_eq!(params.rms_z, mosaic_fwhm_arcmin_to_rms(60.0));
        assert_relative_eq!(params.rms_y, mosaic_fwhm_arcmin_to_rms(30.0));
    }

    #[test]
    fn test_missing_crystal_data_is_an_error() {
        let text = MINIMAL.replace("crystal = \"PG002\"", "mosaic = 30.0");
        let job = parse_config(&text).unwrap();
        assert!(job.monochromator.to_params().is_err());

        let text = MINIMAL.replace("crystal = \"PG002\"", "crystal = \"unobtainium\"");
        assert!(parse_config(&text).unwrap().monochromator.to_params().is_err());
    }

    #[test]
    fn test_unknown_focus_tag_falls_back() {
        let text = MINIMAL.replace("focus = \"exact\"", "focus = \"sideways\"");
        let params = parse_config(&text).unwrap().monochromator.to_params().unwrap();
        assert_eq!(params.array.focus, FocusMode::None);
    }

    #[test]
    fn test_zero_count_rejected() {
        let text = format!("{}\n[beam]\ncount = 0\n", MINIMAL);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_placement_frame() {
        let text = format!(
            "{}\n[placement]\nposition = [1.0, 0.0, 2.0]\nrotation = 90.0\n",
            MINIMAL
        );
        let frame = parse_config(&text).unwrap().placement.frame();
        assert_relative_eq!(frame.origin, Vector3::new(1.0, 0.0, 2.0));
        let x = frame.direction_to_parent(&Vector3::x());
        assert_relative_eq!(x, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }
}
