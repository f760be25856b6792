//! Subcommands and the argument groups they share.

pub mod compare;
pub mod folder;
pub mod generate;
pub mod info;
pub mod render;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use nii_mesh::{CameraChoice, Orientation, RenderParams, ScreenshotOptions, Settings};

/// Camera and image options.
#[derive(Args, Clone)]
pub struct ViewArgs {
    /// Named camera preset (settings file, or built-in gluteus/sartorius)
    #[arg(long)]
    pub camera: Option<String>,

    /// Pitch in degrees applied before fitting the mesh
    #[arg(long, default_value = "-30", allow_hyphen_values = true, conflicts_with = "camera")]
    pub pitch: f64,

    /// Yaw in degrees applied before fitting the mesh
    #[arg(long, default_value = "30", allow_hyphen_values = true, conflicts_with = "camera")]
    pub yaw: f64,

    /// Roll in degrees applied before fitting the mesh
    #[arg(long, default_value = "0", allow_hyphen_values = true, conflicts_with = "camera")]
    pub roll: f64,

    /// Zoom factor (> 1 magnifies)
    #[arg(long)]
    pub zoom: Option<f64>,

    /// Image width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels
    #[arg(long)]
    pub height: Option<u32>,
}

impl ViewArgs {
    fn camera_choice(&self, settings: &Settings) -> Result<CameraChoice> {
        Ok(match &self.camera {
            Some(name) => CameraChoice::Preset(settings.camera(name)?),
            None => CameraChoice::Oriented(Orientation {
                pitch: self.pitch,
                yaw: self.yaw,
                roll: self.roll,
            }),
        })
    }

    fn render_params(&self, settings: &Settings) -> RenderParams {
        let mut params = settings.render.clone();
        if let Some(zoom) = self.zoom {
            params.zoom = zoom;
        }
        if let Some(width) = self.width {
            params.width = width;
        }
        if let Some(height) = self.height {
            params.height = height;
        }
        params
    }

    /// Screenshot options writing into `out_dir`.
    pub fn screenshot_options(
        &self,
        out_dir: impl Into<PathBuf>,
        settings: &Settings,
    ) -> Result<ScreenshotOptions> {
        Ok(ScreenshotOptions {
            out_dir: out_dir.into(),
            camera: self.camera_choice(settings)?,
            params: self.render_params(settings),
        })
    }
}

/// Optional screenshot while processing.
#[derive(Args, Clone)]
pub struct ShotArgs {
    /// Save a PNG screenshot of each mesh into this directory
    #[arg(long, value_name = "DIR")]
    pub screenshot: Option<PathBuf>,

    #[command(flatten)]
    pub view: ViewArgs,
}

impl ShotArgs {
    pub fn options(&self, settings: &Settings) -> Result<Option<ScreenshotOptions>> {
        self.screenshot
            .as_ref()
            .map(|dir| self.view.screenshot_options(dir, settings))
            .transpose()
    }
}

/// `--grid-scale 0.55` or `--grid-scale 0.5,0.5,1.2`.
pub fn grid_scale(values: Option<&[f64]>) -> Result<Option<[f64; 3]>> {
    match values {
        None => Ok(None),
        Some([s]) => Ok(Some([*s; 3])),
        Some([x, y, z]) => Ok(Some([*x, *y, *z])),
        Some(other) => bail!(
            "--grid-scale takes one or three values, got {}",
            other.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_scale_forms() {
        assert_eq!(grid_scale(None).unwrap(), None);
        assert_eq!(grid_scale(Some(&[0.55])).unwrap(), Some([0.55; 3]));
        assert_eq!(
            grid_scale(Some(&[0.5, 0.5, 1.2])).unwrap(),
            Some([0.5, 0.5, 1.2])
        );
        assert!(grid_scale(Some(&[1.0, 2.0])).is_err());
    }
}
