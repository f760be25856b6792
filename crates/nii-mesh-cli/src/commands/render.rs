//! niimesh render command - PNG screenshot of a mesh.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use nii_mesh::{Settings, load_mesh};
use serde::Serialize;

use crate::commands::ViewArgs;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct RenderResult {
    input: String,
    screenshot: String,
    width: u32,
    height: u32,
}

pub fn run(input: &Path, out_dir: &Path, view: &ViewArgs, settings: &Settings, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let options = view.screenshot_options(out_dir, settings)?;

    let png = options
        .capture(&mesh, input)
        .with_context(|| format!("Failed to render {:?}", input))?;

    let result = RenderResult {
        input: input.display().to_string(),
        screenshot: png.display().to_string(),
        width: options.params.width,
        height: options.params.height,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.quiet),
        OutputFormat::Text => {
            output::success(
                &format!("Screenshot saved to {}", result.screenshot),
                cli.format,
                cli.quiet,
            );
            if !cli.quiet {
                println!(
                    "  {}: {} x {} px",
                    "Image".cyan(),
                    result.width,
                    result.height
                );
            }
        }
    }

    Ok(())
}
