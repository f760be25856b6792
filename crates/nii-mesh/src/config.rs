//! Settings files.
//!
//! Settings hold default generation parameters, render parameters and
//! named camera presets, and can be written as TOML or JSON:
//!
//! ```toml
//! [generate]
//! backend = "native"
//! simplify = "edqe"
//! simplify_value = 30.0
//! smooth = "tau"
//! format = "stl"
//! out_dir = "meshes"
//!
//! [render]
//! width = 1024
//! height = 768
//! zoom = 1.5
//!
//! [cameras.thigh]
//! position = [351.954, 165.403, 764.280]
//! focal_point = [64.075, 90.2, 323.4]
//! viewup = [0.0447, -0.9892, 0.1395]
//! distance = 531.888
//! clipping_range = [1.214, 1214.0]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::generate::GenerateParams;
use crate::render::{Camera, RenderParams};

/// Names of the camera presets available without a settings file.
pub const BUILTIN_CAMERAS: [&str; 2] = ["gluteus", "sartorius"];

/// Contents of a settings file. Missing tables take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generate: GenerateParams,
    pub render: RenderParams,
    /// Named camera presets; these shadow the built-in ones.
    pub cameras: BTreeMap<String, Camera>,
}

impl Settings {
    /// Load settings from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> MeshResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| MeshError::io_read(path, e))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let settings = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| MeshError::malformed_config(path, e.to_string()))?
        } else {
            toml::from_str(&text).map_err(|e| MeshError::malformed_config(path, e.to_string()))?
        };
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> MeshResult<Self> {
        toml::from_str(text).map_err(|e| MeshError::malformed_config("<string>", e.to_string()))
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> MeshResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MeshError::malformed_config("<string>", e.to_string()))
    }

    /// A camera preset by name: user presets first, then the built-in ones.
    /// The preset's distance is applied and its parameters checked.
    pub fn camera(&self, name: &str) -> MeshResult<Camera> {
        let camera = match self.cameras.get(name) {
            Some(camera) => camera.clone(),
            None => builtin_camera(name).ok_or_else(|| {
                let mut known: Vec<&str> = self.cameras.keys().map(String::as_str).collect();
                known.extend(BUILTIN_CAMERAS.iter().filter(|n| !self.cameras.contains_key(**n)));
                MeshError::invalid_parameter(
                    "camera",
                    format!("unknown camera preset `{}` (known: {})", name, known.join(", ")),
                )
            })?,
        };
        camera.resolve()
    }
}

/// Camera presets framing the gluteus and sartorius label maps of the
/// thigh dataset, as captured from an interactive session.
pub fn builtin_camera(name: &str) -> Option<Camera> {
    let camera = match name {
        "gluteus" => Camera {
            position: [488.535, -228.916, 759.305],
            focal_point: [179.0, 287.5, 949.5],
            view_up: [-0.351876, -0.501907, 0.790109],
            distance: 631.405,
            clipping_range: [114.342, 1283.80],
            view_angle: crate::render::DEFAULT_VIEW_ANGLE,
        },
        "sartorius" => Camera {
            position: [351.954, 165.403, 764.280],
            focal_point: [64.0750, 90.2000, 323.400],
            view_up: [0.0446983, -0.989206, 0.139548],
            distance: 531.888,
            clipping_range: [1.21400, 1214.00],
            view_angle: crate::render::DEFAULT_VIEW_ANGLE,
        },
        _ => return None,
    };
    Some(camera)
}
