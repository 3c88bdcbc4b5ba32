//! lunar-terrain CLI: plan replayable lunar-terrain dataset jobs.
//!
//! `plan` loads a YAML job configuration, applies `--set` overrides, draws every terrain field
//! and render case, and writes the job with its tables. `verify` reloads a written job and
//! checks that its fields regenerate from their seeds. `field` places a single centered rock or
//! crater field and writes its table.
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use lunar_terrain::prelude::*;
use lunar_terrain_cli::{
    centered_placer, init_tracing, verify_job, write_field, write_job_artifacts,
};
use tracing::info;

/// Synthetic lunar terrain dataset planner.
#[derive(Parser)]
#[command(name = "lunar-terrain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a dataset job from a configuration file.
    Plan {
        /// Job configuration (YAML, `!include` supported).
        config: PathBuf,

        /// Override expressions such as `terrain.samples=4` or `base_mesh.tiles=[0,2]`.
        #[arg(short = 's', long = "set", value_name = "PATH=VALUE")]
        overrides: Vec<String>,

        /// Master seed, replacing the configured one.
        #[arg(long)]
        seed: Option<u64>,

        /// Output root, replacing `output.output_root`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Plan and report without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that a written job regenerates bit-identically.
    Verify {
        /// Path to a `job.json`.
        job: PathBuf,
    },

    /// Generate one field centered on the origin and write its table.
    Field {
        #[arg(value_enum)]
        kind: FieldKind,

        /// Cumulative fractional area `k`, in (0, 1].
        #[arg(long = "cfa", visible_alias = "CFA")]
        cfa: f64,

        /// Field size along x, in meters.
        #[arg(long = "size-x", alias = "size_x")]
        size_x: f64,

        /// Field size along y, in meters.
        #[arg(long = "size-y", alias = "size_y")]
        size_y: f64,

        /// Smallest diameter placed, in meters.
        #[arg(long = "h-min", alias = "h_min")]
        h_min: f64,

        /// Largest diameter of the size-frequency grid, in meters.
        #[arg(long = "h-max", alias = "h_max")]
        h_max: Option<f64>,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output table; defaults to `<kind>_field.csv`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldKind {
    Rock,
    Crater,
}

impl From<FieldKind> for FeatureKind {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Rock => FeatureKind::Rock,
            FieldKind::Crater => FeatureKind::Crater,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            config,
            overrides,
            seed,
            output,
            dry_run,
        } => {
            let mut dataset = ConfigLoader::new(&config)
                .with_overrides(&overrides)?
                .load()
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(seed) = seed {
                dataset.seed = seed;
            }
            if let Some(output) = output {
                dataset.output.output_root = output;
            }

            let orchestrator = DatasetOrchestrator::new(dataset)?;
            let job = orchestrator.plan(&mut ()).context("planning dataset job")?;
            let features: usize = job
                .terrains
                .iter()
                .flat_map(|t| t.fields())
                .map(FeatureField::len)
                .sum();
            info!(
                "Planned {} terrains, {} features, {} render cases (seed {}).",
                job.terrains.len(),
                features,
                job.planned_cases(),
                job.seed
            );

            if dry_run || !job.save_flag {
                info!("Nothing written.");
                return Ok(());
            }
            let written = write_job_artifacts(&job)
                .with_context(|| format!("writing job to {}", job.output_dir.display()))?;
            println!("{}", job.job_path().display());
            info!("{} files written.", written.len());
        }
        Commands::Verify { job } => {
            let loaded = DatasetJob::load(&job)
                .with_context(|| format!("reading {}", job.display()))?;
            let checked = verify_job(&loaded)?;
            println!("{checked} fields verified");
        }
        Commands::Field {
            kind,
            cfa,
            size_x,
            size_y,
            h_min,
            h_max,
            seed,
            output,
        } => {
            let kind = FeatureKind::from(kind);
            let path =
                output.unwrap_or_else(|| PathBuf::from(format!("{}.csv", kind.file_stem())));
            let placer = centered_placer(kind, cfa, size_x, size_y, h_min, h_max);
            let field = write_field(&placer, seed, &path)
                .with_context(|| format!("generating {kind:?} field"))?;
            println!("{} ({} features)", path.display(), field.len());
        }
    }

    Ok(())
}
