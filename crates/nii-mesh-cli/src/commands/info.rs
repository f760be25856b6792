//! niimesh info command - display mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use nii_mesh::{MeshStats, convex_hull_volume, load_mesh};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    file_size: u64,
    #[serde(flatten)]
    stats: MeshStats,
    volume_cm3: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    convex_hull_volume: Option<f64>,
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let file_size = std::fs::metadata(input)
        .with_context(|| format!("Failed to read metadata of {:?}", input))?
        .len();

    let stats = MeshStats::compute(&mesh);
    let info = MeshInfo {
        path: input.display().to_string(),
        file_size,
        volume_cm3: stats.volume_cm3(),
        convex_hull_volume: detailed.then(|| convex_hull_volume(&mesh)),
        stats,
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                let s = &info.stats;
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), info.path);
                println!(
                    "  {}: {} B ({:.2} MB)",
                    "Size".cyan(),
                    info.file_size,
                    info.file_size as f64 / (1024.0 * 1024.0)
                );
                println!("  {}: {}", "Vertices".cyan(), s.vertices);
                println!("  {}: {}", "Faces".cyan(), s.faces);
                let dims = [0, 1, 2].map(|i| s.bounds_max[i] - s.bounds_min[i]);
                println!(
                    "  {}: {:.2} x {:.2} x {:.2} mm",
                    "Dimensions".cyan(),
                    dims[0],
                    dims[1],
                    dims[2]
                );
                println!(
                    "  {}: {:.2} mm³ ({:.3} cm³)",
                    "Volume".cyan(),
                    s.volume,
                    info.volume_cm3
                );
                println!("  {}: {:.2} mm²", "Surface area".cyan(), s.surface_area);
                if let Some(hull) = info.convex_hull_volume {
                    println!("  {}: {:.2} mm³", "Convex hull volume".cyan(), hull);
                }

                let closed = if s.is_watertight {
                    "yes".green()
                } else {
                    format!(
                        "no ({} boundary, {} non-manifold edges)",
                        s.boundary_edges, s.non_manifold_edges
                    )
                    .yellow()
                };
                println!("  {}: {}", "Watertight".cyan(), closed);
                if s.is_inside_out {
                    println!("  {}: {}", "Orientation".cyan(), "inside out".yellow());
                }
            }
        }
    }

    Ok(())
}
