//! niimesh folder command - file sizes and volumes of a mesh folder.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use nii_mesh::{FolderParams, FolderSummary, Settings, scan_folder};

use crate::commands::ShotArgs;
use crate::{Cli, OutputFormat, output};

pub fn run(
    dir: &Path,
    csv: Option<&str>,
    shot: &ShotArgs,
    settings: &Settings,
    cli: &Cli,
) -> Result<()> {
    let params = FolderParams {
        screenshot: shot.options(settings)?,
    };

    output::info(
        &format!("Scanning {}...", dir.display()),
        cli.format,
        cli.quiet,
    );
    let summary =
        scan_folder(dir, &params).with_context(|| format!("Failed to scan folder {:?}", dir))?;

    if let Some(name) = csv {
        let path = FolderSummary::csv_path(dir, name);
        summary
            .write_csv(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;
        output::success(
            &format!("File sizes saved to {}", path.display()),
            cli.format,
            cli.quiet,
        );
    }

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Folder".bold().underline());
                let width = summary
                    .entries
                    .iter()
                    .map(|e| e.file_name.len())
                    .max()
                    .unwrap_or(0)
                    .max(4);
                println!(
                    "  {:<width$}  {:>12}  {:>10}  {:>14}",
                    "File".cyan(),
                    "Size (B)".cyan(),
                    "Size (MB)".cyan(),
                    "Volume (mm³)".cyan(),
                );
                for e in &summary.entries {
                    println!(
                        "  {:<width$}  {:>12}  {:>10.3}  {:>14.2}",
                        e.file_name, e.size_bytes, e.size_mb, e.volume
                    );
                }
                println!(
                    "  {}: {} files, {} B",
                    "Total".cyan(),
                    summary.entries.len(),
                    summary.total_bytes()
                );
                let unmeasured = summary.entries.iter().filter(|e| e.volume == 0.0).count();
                if unmeasured > 0 {
                    output::warn(
                        &format!("{} mesh(es) could not be measured", unmeasured),
                        cli.quiet,
                    );
                }
            }
        }
    }

    Ok(())
}
