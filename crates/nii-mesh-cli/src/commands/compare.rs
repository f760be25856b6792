//! niimesh compare command - volumetric error of a mesh against its label map.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use nii_mesh::measure::MM3_PER_CM3;
use nii_mesh::{LabelMap, VolumeComparison, load_mesh};
use serde::Serialize;

use crate::commands::grid_scale;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CompareResult {
    nifti: String,
    mesh: String,
    label: Option<i64>,
    voxels: usize,
    /// Volumes in cm^3
    #[serde(flatten)]
    volumes: VolumeComparison,
}

pub fn run(
    nifti: &Path,
    mesh_path: &Path,
    label: Option<i64>,
    scale: Option<&[f64]>,
    cli: &Cli,
) -> Result<()> {
    let map =
        LabelMap::load(nifti).with_context(|| format!("Failed to load label map {:?}", nifti))?;
    let mut mask = match label {
        Some(l) => map.select_label(l),
        None => map.binarize(),
    };
    if let Some(spacing) = grid_scale(scale)? {
        mask = mask.with_spacing(spacing);
    }
    let mesh =
        load_mesh(mesh_path).with_context(|| format!("Failed to load mesh from {:?}", mesh_path))?;

    let result = CompareResult {
        nifti: nifti.display().to_string(),
        mesh: mesh_path.display().to_string(),
        label,
        voxels: mask.foreground_voxels(),
        volumes: VolumeComparison::new(
            mask.foreground_volume() / MM3_PER_CM3,
            mesh.volume() / MM3_PER_CM3,
        ),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                let v = &result.volumes;
                println!("{}", "Volume Comparison".bold().underline());
                println!("  {}: {}", "Label map".cyan(), result.nifti);
                println!("  {}: {}", "Mesh".cyan(), result.mesh);
                println!(
                    "  {}: {:.3} cm³ ({} voxels)",
                    "Label-map volume".cyan(),
                    v.label_volume,
                    result.voxels
                );
                println!("  {}: {:.3} cm³", "Mesh volume".cyan(), v.mesh_volume);
                println!("  {}: {:.3} cm³", "Difference".cyan(), v.difference);
                match v.error_percent {
                    Some(e) => println!("  {}: {:.5} %", "Volumetric error".cyan(), e),
                    None => output::warn("label map is empty; no relative error", cli.quiet),
                }
            }
        }
    }

    Ok(())
}
