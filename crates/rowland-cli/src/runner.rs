//! Simulation runner: ties together the beam, the monochromator, the
//! compute backend and the detector.

use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use rowland_compute::{ComputeBackend, SerialBackend};
use rowland_core::component::rowland::{speed_for_wavenumber, RowlandGeometry, RowlandMonochromator};
use rowland_core::types::{Neutron, Outcome};
use rowland_geometry::Frame;

use crate::config::{BeamConfig, JobConfig, SimulationConfig};

/// Overfill factor applied to the default beam divergence.
const DIVERGENCE_OVERFILL: f64 = 1.2;

/// The monochromator and its reference points in laboratory coordinates.
pub struct Setup {
    pub monochromator: RowlandMonochromator,
    pub placement: Frame,
    pub source: Vector3<f64>,
    pub sink: Vector3<f64>,
}

impl Setup {
    /// Build the monochromator described by `job`.
    pub fn from_job(job: &JobConfig) -> Result<Self> {
        let params = job.monochromator.to_params()?;
        let placement = job.placement.frame();
        let source = job.source.vector();
        let sink = job.sink.vector();
        let monochromator = RowlandMonochromator::new(
            job.monochromator.name.clone(),
            &params,
            &placement,
            &source,
            &sink,
        )
        .with_context(|| format!("Cannot build monochromator '{}'", job.monochromator.name))?;
        Ok(Self {
            monochromator,
            placement,
            source,
            sink,
        })
    }

    /// First-order Bragg wavelength (Å) for a ray from the source reflected
    /// at the array origin towards the sink.
    pub fn nominal_wavelength(&self) -> f64 {
        let origin = self.placement.origin;
        let s = (self.source - origin).normalize();
        let k = (self.sink - origin).normalize();
        let sin_theta = 0.5 * (s + k).norm();
        4.0 * PI * sin_theta / self.monochromator.crystal().props.tau
    }
}

/// Counts and summed weights of one outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutcomeCount {
    pub count: u64,
    pub weight: f64,
}

/// Per-outcome tally of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tally {
    pub scattered: OutcomeCount,
    pub transmitted: OutcomeCount,
    pub absorbed: OutcomeCount,
    pub no_interaction: OutcomeCount,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome, weight: f64) {
        let slot = match outcome {
            Outcome::Scattered => &mut self.scattered,
            Outcome::Transmitted => &mut self.transmitted,
            Outcome::Absorbed => &mut self.absorbed,
            Outcome::NoInteraction => &mut self.no_interaction,
        };
        slot.count += 1;
        slot.weight += weight;
    }

    pub fn get(&self, outcome: Outcome) -> OutcomeCount {
        match outcome {
            Outcome::Scattered => self.scattered,
            Outcome::Transmitted => self.transmitted,
            Outcome::Absorbed => self.absorbed,
            Outcome::NoInteraction => self.no_interaction,
        }
    }

    pub fn total(&self) -> u64 {
        Outcome::ALL.iter().map(|o| self.get(*o).count).sum()
    }
}

/// Weighted statistics of the hits on the detector plane (m).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FocalSpot {
    pub hits: u64,
    pub weight: f64,
    pub mean_h: f64,
    pub rms_h: f64,
    pub mean_v: f64,
    pub rms_v: f64,
}

/// A flat rectangular detector centred on the sink and facing the array.
#[derive(Debug, Clone)]
pub struct Detector {
    centre: Vector3<f64>,
    normal: Vector3<f64>,
    horizontal: Vector3<f64>,
    vertical: Vector3<f64>,
    width: f64,
    height: f64,
    hits: u64,
    sum_w: f64,
    sum_h: f64,
    sum_hh: f64,
    sum_v: f64,
    sum_vv: f64,
}

impl Detector {
    /// A detector at `centre` whose normal points away from `from`.
    pub fn facing(centre: Vector3<f64>, from: Vector3<f64>, width: f64, height: f64) -> Self {
        let normal = (centre - from).normalize();
        let side = Vector3::y().cross(&normal);
        let horizontal = if side.norm() > 1e-12 {
            side.normalize()
        } else {
            Vector3::x()
        };
        let vertical = normal.cross(&horizontal);
        Self {
            centre,
            normal,
            horizontal,
            vertical,
            width,
            height,
            hits: 0,
            sum_w: 0.0,
            sum_h: 0.0,
            sum_hh: 0.0,
            sum_v: 0.0,
            sum_vv: 0.0,
        }
    }

    /// Propagate `neutron` to the detector plane and record it if it lands
    /// on the active area.
    pub fn record(&mut self, neutron: &Neutron) -> bool {
        let vn = neutron.velocity.dot(&self.normal);
        if vn <= 0.0 {
            return false;
        }
        let t = (self.centre - neutron.position).dot(&self.normal) / vn;
        if t < 0.0 {
            return false;
        }
        let offset = neutron.position + neutron.velocity * t - self.centre;
        let h = offset.dot(&self.horizontal);
        let v = offset.dot(&self.vertical);
        if h.abs() > 0.5 * self.width || v.abs() > 0.5 * self.height {
            return false;
        }
        let w = neutron.weight;
        self.hits += 1;
        self.sum_w += w;
        self.sum_h += w * h;
        self.sum_hh += w * h * h;
        self.sum_v += w * v;
        self.sum_vv += w * v * v;
        true
    }

    pub fn spot(&self) -> FocalSpot {
        if self.sum_w <= 0.0 {
            return FocalSpot::default();
        }
        let mean_h = self.sum_h / self.sum_w;
        let mean_v = self.sum_v / self.sum_w;
        FocalSpot {
            hits: self.hits,
            weight: self.sum_w,
            mean_h,
            rms_h: (self.sum_hh / self.sum_w - mean_h * mean_h).max(0.0).sqrt(),
            mean_v,
            rms_v: (self.sum_vv / self.sum_w - mean_v * mean_v).max(0.0).sqrt(),
        }
    }
}

/// Neutrons emitted from a point towards a target with uniform divergence
/// and a uniform wavelength band.
#[derive(Debug, Clone)]
pub struct Beam {
    origin: Vector3<f64>,
    forward: Vector3<f64>,
    horizontal: Vector3<f64>,
    vertical: Vector3<f64>,
    /// Mean wavelength (Å).
    pub lambda: f64,
    /// Half-width of the wavelength band (Å).
    pub dlambda: f64,
    /// Horizontal half-divergence (rad).
    pub divergence_h: f64,
    /// Vertical half-divergence (rad).
    pub divergence_v: f64,
}

impl Beam {
    pub fn new(
        origin: Vector3<f64>,
        target: Vector3<f64>,
        lambda: f64,
        dlambda: f64,
        divergence_h: f64,
        divergence_v: f64,
    ) -> Self {
        let forward = (target - origin).normalize();
        let side = forward.cross(&Vector3::y());
        let horizontal = if side.norm() > 1e-12 {
            side.normalize()
        } else {
            Vector3::x()
        };
        let vertical = horizontal.cross(&forward);
        Self {
            origin,
            forward,
            horizontal,
            vertical,
            lambda,
            dlambda,
            divergence_h,
            divergence_v,
        }
    }

    /// The beam described by `config`, aimed from the source at the array
    /// origin. Unset values are derived from the monochromator.
    pub fn from_config(config: &BeamConfig, setup: &Setup) -> Result<Self> {
        let lambda = config.lambda.unwrap_or_else(|| setup.nominal_wavelength());
        if !(lambda > 0.0) || config.dlambda < 0.0 || config.dlambda >= lambda {
            anyhow::bail!(
                "Invalid wavelength band: lambda={} dlambda={}",
                lambda,
                config.dlambda
            );
        }
        let geometry = setup.monochromator.geometry();
        let distance = (setup.placement.origin - setup.source).norm();
        let divergence_h = match config.divergence_h {
            Some(deg) => deg.to_radians(),
            // The arc subtends half its central angle at the source.
            None => DIVERGENCE_OVERFILL * 0.25 * geometry.coverage,
        };
        let divergence_v = match config.divergence_v {
            Some(deg) => deg.to_radians(),
            None => DIVERGENCE_OVERFILL * (0.5 * geometry.slab_size.height / distance).atan(),
        };
        Ok(Self::new(
            setup.source,
            setup.placement.origin,
            lambda,
            config.dlambda,
            divergence_h,
            divergence_v,
        ))
    }

    /// Emit `count` neutrons, reproducibly for a given `seed`.
    ///
    /// Emission draws from the last ChaCha stream of `seed`, leaving the low
    /// streams to the per-particle tracing.
    pub fn generate(&self, count: usize, seed: u64) -> Vec<Neutron> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(u64::MAX);
        (0..count)
            .map(|_| {
                let ah = self.divergence_h * (2.0 * rng.gen::<f64>() - 1.0);
                let av = self.divergence_v * (2.0 * rng.gen::<f64>() - 1.0);
                let lambda = self.lambda + self.dlambda * (2.0 * rng.gen::<f64>() - 1.0);
                let dir = (self.forward + self.horizontal * ah.tan() + self.vertical * av.tan())
                    .normalize();
                let speed = speed_for_wavenumber(2.0 * PI / lambda);
                Neutron::new(self.origin, dir * speed)
            })
            .collect()
    }
}

/// Results from a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    pub neutrons: usize,
    pub lambda: f64,
    pub dlambda: f64,
    pub tally: Tally,
    pub focal_spot: FocalSpot,
}

/// Run a full simulation from a parsed job configuration.
pub fn run_simulation(job: &JobConfig, setup: &Setup) -> Result<SimulationOutput> {
    let backend = create_backend(&job.simulation)?;
    let beam = Beam::from_config(&job.beam, setup)?;
    println!(
        "Beam: {} neutrons, lambda = {:.4} +- {:.4} AA, divergence = {:.3} x {:.3} deg",
        job.beam.count,
        beam.lambda,
        beam.dlambda,
        beam.divergence_h.to_degrees(),
        beam.divergence_v.to_degrees()
    );

    let mut tally = Tally::default();
    let mut detector = Detector::facing(
        setup.sink,
        setup.placement.origin,
        job.detector.width,
        job.detector.height,
    );

    let count = job.beam.count;
    let batch_size = job.simulation.batch_size;
    let batches = count.div_ceil(batch_size);
    for b in 0..batches {
        let start = b * batch_size;
        let n = batch_size.min(count - start);
        let seed = job.beam.seed.wrapping_add(b as u64);

        let mut neutrons: Vec<Neutron> = beam
            .generate(n, seed)
            .iter()
            .map(|neutron| neutron.to_local(&setup.placement))
            .collect();
        let outcomes = backend
            .trace_batch(&setup.monochromator, &mut neutrons, seed)
            .with_context(|| format!("Tracing batch {} failed", b + 1))?;

        for (neutron, outcome) in neutrons.iter().zip(&outcomes) {
            let lab = neutron.to_parent(&setup.placement);
            tally.record(*outcome, lab.weight);
            if *outcome == Outcome::Scattered {
                detector.record(&lab);
            }
        }

        if batches > 1 && ((b + 1) % 10 == 0 || b + 1 == batches) {
            println!(
                "  [{}/{}] {} neutrons traced, {} scattered",
                b + 1,
                batches,
                start + n,
                tally.scattered.count
            );
        }
    }

    Ok(SimulationOutput {
        neutrons: count,
        lambda: beam.lambda,
        dlambda: beam.dlambda,
        tally,
        focal_spot: detector.spot(),
    })
}

/// Print the run summary to stdout.
pub fn print_summary(output: &SimulationOutput) {
    println!("Outcome          count        weight");
    for outcome in Outcome::ALL {
        let c = output.tally.get(outcome);
        println!("  {:<14} {:>10} {:>13.4}", outcome.label(), c.count, c.weight);
    }
    let spot = &output.focal_spot;
    println!(
        "Focal spot: {} hits, weight {:.4}, horizontal {:+.5} m (rms {:.5} m), vertical {:+.5} m (rms {:.5} m)",
        spot.hits, spot.weight, spot.mean_h, spot.rms_h, spot.mean_v, spot.rms_v
    );
}

/// Print the slab layout and focusing diagnostics.
pub fn print_geometry(setup: &Setup) {
    let g = setup.monochromator.geometry();
    println!(
        "Rowland circle: centre = ({:.4}, {:.4}) m, radius = {:.4} m",
        g.circle.centre.x, g.circle.centre.y, g.circle.radius
    );
    println!(
        "Coverage: {:.4} deg, slab angle {:.4} deg, gap angle {:.4} deg, focusing {:?}",
        g.coverage.to_degrees(),
        g.slab_angle.to_degrees(),
        g.gap_angle.to_degrees(),
        g.focusing
    );
    let (lo, hi) = g.aperture_limits();
    println!(
        "Aperture limits: ({:.4}, {:.4}) m to ({:.4}, {:.4}) m",
        lo.x, lo.y, hi.x, hi.y
    );
    println!(
        "Slab size: {:.4} x {:.4} m, nominal wavelength {:.4} AA",
        g.slab_size.width,
        g.slab_size.height,
        setup.nominal_wavelength()
    );
    println!("  slab          x          z    tilt/deg   focus err/mrad");
    for (h, slab) in g.slabs.iter().enumerate() {
        println!(
            "  {:>4} {:>10.5} {:>10.5} {:>11.4} {:>16.4}",
            h,
            slab.position.x,
            slab.position.z,
            slab.tilt.to_degrees(),
            1e3 * g.focus_error(h)
        );
    }
}

/// Write the outcome tally to a CSV file with a metadata header.
pub fn write_summary_csv(output: &SimulationOutput, path: &Path, job: &JobConfig) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# Rowland monochromator simulation summary")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# monochromator: {}", job.monochromator.name)?;
    writeln!(file, "# neutrons: {}, seed: {}", output.neutrons, job.beam.seed)?;
    writeln!(file, "# lambda: {:.6} +- {:.6} AA", output.lambda, output.dlambda)?;
    let spot = &output.focal_spot;
    writeln!(
        file,
        "# focal spot: hits={} mean_h={:.6e} rms_h={:.6e} mean_v={:.6e} rms_v={:.6e}",
        spot.hits, spot.mean_h, spot.rms_h, spot.mean_v, spot.rms_v
    )?;
    writeln!(file, "#")?;
    writeln!(file, "outcome,count,weight")?;
    for outcome in Outcome::ALL {
        let c = output.tally.get(outcome);
        writeln!(file, "{},{},{:.6e}", outcome.label(), c.count, c.weight)?;
    }

    println!("Summary written to: {}", path.display());
    Ok(())
}

/// Write the run summary to a JSON file.
pub fn write_summary_json(output: &SimulationOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(output)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Summary (JSON) written to: {}", path.display());
    Ok(())
}

/// Write the per-slab layout to a CSV file.
pub fn write_geometry_csv(geometry: &RowlandGeometry, path: &Path) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::File::create(path)?;
    writeln!(
        file,
        "# Rowland circle: centre=({:.6}, {:.6}) m, radius={:.6} m",
        geometry.circle.centre.x, geometry.circle.centre.y, geometry.circle.radius
    )?;
    writeln!(file, "#")?;
    writeln!(file, "slab,x_m,y_m,z_m,tilt_rad,window_lo_rad,window_hi_rad,focus_error_rad")?;
    for (h, slab) in geometry.slabs.iter().enumerate() {
        writeln!(
            file,
            "{},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e}",
            h,
            slab.position.x,
            slab.position.y,
            slab.position.z,
            slab.tilt,
            geometry.edges[h],
            geometry.edges[h + 1],
            geometry.focus_error(h)
        )?;
    }

    println!("Geometry written to: {}", path.display());
    Ok(())
}

/// Create a compute backend from the simulation settings.
///
/// - `"cpu"`: Rayon, on a dedicated pool when `threads` is set.
/// - `"serial"`: the calling thread only.
fn create_backend(simulation: &SimulationConfig) -> Result<Arc<dyn ComputeBackend>> {
    let backend: Arc<dyn ComputeBackend> = match simulation.backend.as_str() {
        "serial" => Arc::new(SerialBackend),
        "cpu" => {
            #[cfg(feature = "cpu")]
            {
                match simulation.threads {
                    Some(n) => Arc::new(rowland_compute::CpuBackend::with_threads(n)?),
                    None => Arc::new(rowland_compute::CpuBackend::new()),
                }
            }
            #[cfg(not(feature = "cpu"))]
            {
                anyhow::bail!("CPU backend requested but binary was built without --features cpu")
            }
        }
        other => anyhow::bail!("Unknown backend '{}'. Valid backends: cpu, serial", other),
    };
    println!("Backend: {}", backend.device_info().name);
    Ok(backend)
}
