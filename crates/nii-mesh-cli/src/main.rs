//! niimesh: command-line interface for meshes from NIFTI label maps.
//!
//! Generates surface meshes from segmentations, measures them against the
//! label map they came from, and takes screenshots, for use from scripts
//! and batch jobs.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=nii_mesh=info` - Stage summaries
//! - `RUST_LOG=nii_mesh=debug` - Intermediate mesh sizes
//! - `RUST_LOG=nii_mesh::timing=debug` - Per-stage timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Quadric simplification to 30% plus Taubin smoothing, with a report
//! niimesh generate gluteus.nii.gz --simplify edqe --simplify-value 30 --smooth tau --report
//!
//! # Same label map through nii2mesh
//! niimesh generate gluteus.nii.gz --backend nii2mesh --smooth-value 1 --simplify-value 25
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use nii_mesh::Settings;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{compare, folder, generate, info, render};

/// niimesh - Surface meshes from NIFTI label maps.
///
/// Marching cubes, simplification and smoothing, volumetric error against
/// the label map, reports and screenshots.
#[derive(Parser)]
#[command(name = "niimesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Settings file (TOML or JSON) with generation defaults and camera presets
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a mesh from a NIFTI label map
    Generate(generate::GenerateArgs),

    /// Display mesh statistics
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Also compute the convex hull volume
        #[arg(long)]
        detailed: bool,
    },

    /// Compare a mesh's volume with the label map it was made from
    Compare {
        /// NIFTI label map
        nifti: PathBuf,

        /// Mesh file
        mesh: PathBuf,

        /// Only count voxels with this label
        #[arg(long)]
        label: Option<i64>,

        /// Voxel size override in mm: one value or three comma-separated
        #[arg(long, value_delimiter = ',')]
        grid_scale: Option<Vec<f64>>,
    },

    /// Tabulate file sizes and volumes of every mesh in a folder
    Folder {
        /// Folder containing OBJ, STL or PLY meshes
        dir: PathBuf,

        /// Write `<NAME>_file_sizes.csv` into the folder
        #[arg(long, value_name = "NAME")]
        csv: Option<String>,

        #[command(flatten)]
        shot: commands::ShotArgs,
    },

    /// Render a mesh to PNG
    Render {
        /// Input mesh file
        input: PathBuf,

        /// Directory for `<mesh file name>.png`
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        view: commands::ViewArgs,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "nii_mesh=info,niimesh=info",
            2 => "nii_mesh=debug,niimesh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => {
            let settings = Settings::load(path)
                .with_context(|| format!("Failed to load settings from {:?}", path))?;
            tracing::info!(
                "Settings from {:?}: {} camera preset(s)",
                path,
                settings.cameras.len()
            );
            Ok(settings)
        }
        None => Ok(Settings::default()),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;

    match &cli.command {
        Commands::Generate(args) => generate::run(args, &settings, cli),
        Commands::Info { input, detailed } => info::run(input, *detailed, cli),
        Commands::Compare {
            nifti,
            mesh,
            label,
            grid_scale,
        } => compare::run(nifti, mesh, *label, grid_scale.as_deref(), cli),
        Commands::Folder { dir, csv, shot } => {
            folder::run(dir, csv.as_deref(), shot, &settings, cli)
        }
        Commands::Render {
            input,
            output,
            view,
        } => render::run(input, output, view, &settings, cli),
    }
}

fn main() -> Result<()> {
    // Nicer panic reports in development
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = run(&cli);

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(mesh_err) = e.downcast_ref::<nii_mesh::MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
                if let Some(location) = mesh_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
