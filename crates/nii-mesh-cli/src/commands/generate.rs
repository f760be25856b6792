//! niimesh generate command - label map to mesh file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use nii_mesh::{
    Backend, GenerateParams, MeshFormat, Settings, SimplifyMethod, SmoothMethod, generate_from_nii,
};

use crate::commands::{ShotArgs, grid_scale};
use crate::{Cli, OutputFormat, output};

#[derive(Args)]
pub struct GenerateArgs {
    /// Input label map (.nii or .nii.gz)
    pub input: PathBuf,

    /// Mesh generator
    #[arg(long)]
    pub backend: Option<BackendArg>,

    /// Simplification method (native backend)
    #[arg(long)]
    pub simplify: Option<SimplifyArg>,

    /// Simplification value: percent of faces kept (edqe, nii2mesh) or
    /// cell size in percent of the diagonal (mdc)
    #[arg(long)]
    pub simplify_value: Option<f64>,

    /// Smoothing method (native backend)
    #[arg(long)]
    pub smooth: Option<SmoothArg>,

    /// Smoothing iterations (lap, hc, nii2mesh) or step pairs (tau)
    #[arg(long)]
    pub smooth_value: Option<f64>,

    /// Mesh file format
    #[arg(long, short = 't')]
    pub mesh_format: Option<MeshFormatArg>,

    /// Output directory
    #[arg(long, short)]
    pub out_dir: Option<PathBuf>,

    /// Output file name without extension (default: derived from the input
    /// and the parameters)
    #[arg(long)]
    pub name: Option<String>,

    /// Voxel size override in mm: one value or three comma-separated
    #[arg(long, value_delimiter = ',')]
    pub grid_scale: Option<Vec<f64>>,

    /// Mesh only this label (default: every non-zero voxel)
    #[arg(long)]
    pub label: Option<i64>,

    /// Write `<mesh name>_info.txt`
    #[arg(long)]
    pub report: bool,

    /// Directory for the report (default: the output directory)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// nii2mesh executable
    #[arg(long, value_name = "PATH")]
    pub nii2mesh_exe: Option<PathBuf>,

    /// Pass `-v 1` to nii2mesh
    #[arg(long)]
    pub nii2mesh_verbose: bool,

    #[command(flatten)]
    pub shot: ShotArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    /// Marching cubes with simplification and smoothing
    #[value(alias = "pymeshlab")]
    Native,
    /// Marching cubes only, header spacing
    #[value(alias = "vtk")]
    Raw,
    /// External nii2mesh executable
    Nii2mesh,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SimplifyArg {
    /// No simplification
    None,
    /// Zero-error edge collapse for marching-cubes meshes
    Edmc,
    /// Quadric edge collapse
    Edqe,
    /// Vertex clustering
    Mdc,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SmoothArg {
    /// No smoothing
    None,
    /// Laplacian
    Lap,
    /// Taubin
    Tau,
    /// HC-Laplacian
    Hc,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MeshFormatArg {
    Obj,
    Stl,
    Ply,
    Vtk,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => Backend::Native,
            BackendArg::Raw => Backend::Raw,
            BackendArg::Nii2mesh => Backend::Nii2mesh,
        }
    }
}

impl From<SimplifyArg> for SimplifyMethod {
    fn from(arg: SimplifyArg) -> Self {
        match arg {
            SimplifyArg::None => SimplifyMethod::None,
            SimplifyArg::Edmc => SimplifyMethod::McCollapse,
            SimplifyArg::Edqe => SimplifyMethod::QuadricCollapse,
            SimplifyArg::Mdc => SimplifyMethod::Clustering,
        }
    }
}

impl From<SmoothArg> for SmoothMethod {
    fn from(arg: SmoothArg) -> Self {
        match arg {
            SmoothArg::None => SmoothMethod::None,
            SmoothArg::Lap => SmoothMethod::Laplacian,
            SmoothArg::Tau => SmoothMethod::Taubin,
            SmoothArg::Hc => SmoothMethod::Hc,
        }
    }
}

impl From<MeshFormatArg> for MeshFormat {
    fn from(arg: MeshFormatArg) -> Self {
        match arg {
            MeshFormatArg::Obj => MeshFormat::Obj,
            MeshFormatArg::Stl => MeshFormat::Stl,
            MeshFormatArg::Ply => MeshFormat::Ply,
            MeshFormatArg::Vtk => MeshFormat::Vtk,
        }
    }
}

impl GenerateArgs {
    /// Settings defaults overridden by whatever was given on the command line.
    fn params(&self, settings: &Settings) -> Result<GenerateParams> {
        let mut params = settings.generate.clone();

        if let Some(backend) = self.backend {
            params.backend = backend.into();
        }
        if let Some(simplify) = self.simplify {
            params.simplify = simplify.into();
        }
        if self.simplify_value.is_some() {
            params.simplify_value = self.simplify_value;
        }
        if let Some(smooth) = self.smooth {
            params.smooth = smooth.into();
        }
        if self.smooth_value.is_some() {
            params.smooth_value = self.smooth_value;
        }
        if let Some(format) = self.mesh_format {
            params.format = format.into();
        }
        if let Some(dir) = &self.out_dir {
            params.out_dir = dir.clone();
        }
        if self.name.is_some() {
            params.out_name = self.name.clone();
        }
        if let Some(scale) = grid_scale(self.grid_scale.as_deref())? {
            params.grid_scale = Some(scale);
        }
        if self.label.is_some() {
            params.label = self.label;
        }
        params.report |= self.report;
        if self.report_dir.is_some() {
            params.report_dir = self.report_dir.clone();
        }
        if let Some(exe) = &self.nii2mesh_exe {
            params.nii2mesh_executable = exe.clone();
        }
        params.nii2mesh_verbose |= self.nii2mesh_verbose;
        params.screenshot = self.shot.options(settings)?;

        Ok(params)
    }
}

pub fn run(args: &GenerateArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let params = args.params(settings)?;

    output::info(
        &format!(
            "Generating mesh from {} ({} backend)...",
            args.input.display(),
            params.backend
        ),
        cli.format,
        cli.quiet,
    );

    let result = generate_from_nii(&args.input, &params)
        .with_context(|| format!("Failed to generate a mesh from {:?}", args.input))?;

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("{} saved successfully", result.mesh_path.display()),
                    cli.format,
                    cli.quiet,
                );
                if let Some(stats) = &result.stats {
                    println!(
                        "  {}: {} vertices, {} faces",
                        "Mesh".cyan(),
                        stats.vertices,
                        stats.faces
                    );
                }
                if let Some(v) = &result.volumes {
                    println!(
                        "  {}: {:.3} cm³ (label map {:.3} cm³)",
                        "Volume".cyan(),
                        v.mesh_volume,
                        v.label_volume
                    );
                    match v.error_percent {
                        Some(e) => println!("  {}: {:.3} %", "Volumetric error".cyan(), e),
                        None => println!("  {}: n/a", "Volumetric error".cyan()),
                    }
                }
                print_path("Report", result.report_path.as_deref());
                print_path("Screenshot", result.screenshot_path.as_deref());
                println!("  {}: {:.2} s", "Elapsed".cyan(), result.elapsed_secs);
            }
        }
    }

    Ok(())
}

fn print_path(label: &str, path: Option<&Path>) {
    if let Some(path) = path {
        println!("  {}: {}", label.cyan(), path.display());
    }
}
