//! Rowland command-line interface.
//!
//! Run monochromator simulations from TOML configuration files:
//! ```sh
//! rowland-cli run job.toml
//! rowland-cli validate job.toml
//! rowland-cli geometry job.toml
//! rowland-cli crystals
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowland-cli")]
#[command(about = "Rowland: curved mosaic crystal monochromator simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of neutrons (overrides config file setting).
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Random seed (overrides config file setting).
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a configuration file and build the array without tracing.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Print the slab layout of a configuration.
    Geometry {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Also write the layout to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Display the built-in crystal presets.
    Crystals,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            count,
            seed,
        } => {
            println!("Rowland Monochromator Simulation");
            println!("================================");
            let mut job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            if let Some(count) = count {
                if count == 0 {
                    anyhow::bail!("--count must be at least 1");
                }
                job.beam.count = count;
            }
            if let Some(seed) = seed {
                job.beam.seed = seed;
            }

            let setup = runner::Setup::from_job(&job)?;
            let result = runner::run_simulation(&job, &setup)?;
            runner::print_summary(&result);

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_summary {
                runner::write_summary_csv(&result, &out_dir.join("summary.csv"), &job)?;
            }
            if job.output.save_json {
                runner::write_summary_json(&result, &out_dir.join("summary.json"))?;
            }
            if job.output.save_geometry {
                runner::write_geometry_csv(
                    setup.monochromator.geometry(),
                    &out_dir.join("geometry.csv"),
                )?;
            }

            println!("Simulation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let setup = runner::Setup::from_job(&job)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} slabs on a circle of radius {:.4} m",
                setup.monochromator.geometry().slabs.len(),
                setup.monochromator.geometry().circle.radius
            );
            Ok(())
        }
        Commands::Geometry { config, csv } => {
            let job = config::load_config(&config)?;
            let setup = runner::Setup::from_job(&job)?;
            runner::print_geometry(&setup);
            if let Some(path) = csv {
                runner::write_geometry_csv(setup.monochromator.geometry(), &path)?;
            }
            Ok(())
        }
        Commands::Crystals => {
            println!("Available crystals:");
            println!();
            println!(
                "  {:<12} {:<30} {:>8} {:>10} {:>6}",
                "name", "reflection", "d/AA", "mosaic/'", "r0"
            );
            for p in rowland_materials::crystals::PRESETS {
                println!(
                    "  {:<12} {:<30} {:>8.4} {:>10.1} {:>6.2}",
                    p.name, p.description, p.d_spacing, p.mosaic_arcmin, p.r0
                );
            }
            Ok(())
        }
    }
}
