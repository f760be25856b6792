//! Label map to mesh file: backend dispatch and post-processing.
//!
//! [`generate_from_nii`] runs one of three backends:
//!
//! - [`Backend::Native`]: marching cubes, optional simplification and
//!   smoothing, grid scaling, any output format.
//! - [`Backend::Raw`]: marching cubes at iso-level 0.5 with the header voxel
//!   spacing and nothing else.
//! - [`Backend::Nii2mesh`]: the external `nii2mesh` executable.
//!
//! The mesh is saved under a name that never overwrites an existing file,
//! then a report and a screenshot are written if requested.
//!
//! # Example
//!
//! ```no_run
//! use nii_mesh::{MeshGenerator, SimplifyMethod, SmoothMethod};
//!
//! let result = MeshGenerator::new()
//!     .simplify(SimplifyMethod::QuadricCollapse, Some(30.0))
//!     .smooth(SmoothMethod::Taubin, None)
//!     .out_dir("meshes")
//!     .report(true)
//!     .run("gluteus.nii.gz")
//!     .unwrap();
//!
//! println!("Saved {}", result.mesh_path.display());
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Mesh;
use crate::decimate::{ClusterParams, DecimateParams, cluster_vertices, decimate_mesh};
use crate::error::{MeshError, MeshResult};
use crate::io::{MeshFormat, load_mesh, save_mesh_as};
use crate::labelmap::LabelMap;
use crate::marching_cubes::{IsosurfaceParams, extract_isosurface};
use crate::measure::{MM3_PER_CM3, MeshStats, VolumeComparison};
use crate::naming::{default_output_name, unique_output_path};
use crate::nii2mesh::{Nii2MeshOptions, run_nii2mesh};
use crate::render::ScreenshotOptions;
use crate::report::MeshReport;
use crate::smooth::{HcParams, TaubinParams, hc_laplacian_smooth, laplacian_smooth, taubin_smooth};
use crate::tracing_ext::{OperationTimer, log_mesh_stats};

// =========================================================================
// Method selection
// =========================================================================

/// Which implementation produces the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Backend {
    /// Full in-process pipeline.
    #[default]
    Native,
    /// Marching cubes only.
    Raw,
    /// External nii2mesh executable.
    Nii2mesh,
}

impl Backend {
    /// Parse a backend flag. Accepts the library names the flags were
    /// historically given as (`pymeshlab`, `vtk`).
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim().to_ascii_lowercase().as_str() {
            "native" | "pymeshlab" => Some(Backend::Native),
            "raw" | "vtk" => Some(Backend::Raw),
            "nii2mesh" => Some(Backend::Nii2mesh),
            _ => None,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Raw => "raw",
            Backend::Nii2mesh => "nii2mesh",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

impl TryFrom<String> for Backend {
    type Error = String;

    fn try_from(flag: String) -> Result<Self, Self::Error> {
        Backend::from_flag(&flag).ok_or_else(|| {
            format!("unknown backend `{}` (expected native, raw or nii2mesh)", flag)
        })
    }
}

impl From<Backend> for String {
    fn from(backend: Backend) -> Self {
        backend.flag().to_string()
    }
}

/// Simplification applied by the native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SimplifyMethod {
    #[default]
    None,
    /// Zero-error edge collapse for marching-cubes meshes (`edmc`). Takes
    /// no value.
    McCollapse,
    /// Quadric edge collapse (`edqe`). Value: percent of faces kept.
    QuadricCollapse,
    /// Vertex clustering (`mdc`). Value: cell size in percent of the
    /// bounding-box diagonal.
    Clustering,
}

impl SimplifyMethod {
    /// Parse a flag; anything unrecognized means no simplification.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "edmc" => SimplifyMethod::McCollapse,
            "edqe" => SimplifyMethod::QuadricCollapse,
            "mdc" => SimplifyMethod::Clustering,
            _ => SimplifyMethod::None,
        }
    }

    /// Flag for this method, None for no simplification.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            SimplifyMethod::None => None,
            SimplifyMethod::McCollapse => Some("edmc"),
            SimplifyMethod::QuadricCollapse => Some("edqe"),
            SimplifyMethod::Clustering => Some("mdc"),
        }
    }

    /// Value used when none is given; None if the method takes no value.
    pub fn default_value(&self) -> Option<f64> {
        match self {
            SimplifyMethod::QuadricCollapse => Some(50.0),
            SimplifyMethod::Clustering => Some(1.0),
            SimplifyMethod::None | SimplifyMethod::McCollapse => None,
        }
    }
}

impl From<String> for SimplifyMethod {
    fn from(flag: String) -> Self {
        SimplifyMethod::from_flag(&flag)
    }
}

impl From<SimplifyMethod> for String {
    fn from(method: SimplifyMethod) -> Self {
        method.flag().unwrap_or("none").to_string()
    }
}

/// Smoothing applied by the native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SmoothMethod {
    #[default]
    None,
    /// Uniform Laplacian (`lap`). Value: iterations.
    Laplacian,
    /// Taubin lambda/mu (`tau`). Value: step pairs.
    Taubin,
    /// HC-Laplacian (`hc`). Value: iterations.
    Hc,
}

impl SmoothMethod {
    /// Parse a flag; anything unrecognized means no smoothing.
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_lowercase().as_str() {
            "lap" => SmoothMethod::Laplacian,
            "tau" => SmoothMethod::Taubin,
            "hc" => SmoothMethod::Hc,
            _ => SmoothMethod::None,
        }
    }

    /// Flag for this method, None for no smoothing.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            SmoothMethod::None => None,
            SmoothMethod::Laplacian => Some("lap"),
            SmoothMethod::Taubin => Some("tau"),
            SmoothMethod::Hc => Some("hc"),
        }
    }

    /// Value used when none is given.
    pub fn default_value(&self) -> Option<f64> {
        match self {
            SmoothMethod::None => None,
            SmoothMethod::Laplacian => Some(3.0),
            SmoothMethod::Taubin => Some(TaubinParams::default().steps as f64),
            SmoothMethod::Hc => Some(HcParams::default().iterations as f64),
        }
    }
}

impl From<String> for SmoothMethod {
    fn from(flag: String) -> Self {
        SmoothMethod::from_flag(&flag)
    }
}

impl From<SmoothMethod> for String {
    fn from(method: SmoothMethod) -> Self {
        method.flag().unwrap_or("none").to_string()
    }
}

// =========================================================================
// Parameters
// =========================================================================

/// Everything [`generate_from_nii`] needs besides the input path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    pub backend: Backend,
    pub simplify: SimplifyMethod,
    /// Method-specific; see [`SimplifyMethod`]. For nii2mesh, percent of
    /// faces kept (`-r value/100`).
    pub simplify_value: Option<f64>,
    pub smooth: SmoothMethod,
    /// Method-specific; see [`SmoothMethod`]. For nii2mesh, `-s value`.
    pub smooth_value: Option<f64>,
    pub format: MeshFormat,
    pub out_dir: PathBuf,
    /// Output file name without extension; derived from the input if None.
    pub out_name: Option<String>,
    /// Voxel size override in mm; the header spacing is used if None.
    pub grid_scale: Option<[f64; 3]>,
    /// Mesh only this label; all non-zero voxels if None.
    pub label: Option<i64>,
    /// Native backend iso level on the binary mask. Default: 0.5
    pub iso_level: f64,
    /// Write a text report.
    pub report: bool,
    /// Report directory; `out_dir` if None.
    pub report_dir: Option<PathBuf>,
    #[serde(skip)]
    pub screenshot: Option<ScreenshotOptions>,
    pub nii2mesh_executable: PathBuf,
    pub nii2mesh_verbose: bool,
    pub staging_dir: Option<PathBuf>,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            backend: Backend::Native,
            simplify: SimplifyMethod::None,
            simplify_value: None,
            smooth: SmoothMethod::None,
            smooth_value: None,
            format: MeshFormat::Obj,
            out_dir: PathBuf::from("."),
            out_name: None,
            grid_scale: None,
            label: None,
            iso_level: 0.5,
            report: false,
            report_dir: None,
            screenshot: None,
            nii2mesh_executable: PathBuf::from("nii2mesh"),
            nii2mesh_verbose: false,
            staging_dir: None,
        }
    }
}

impl GenerateParams {
    /// Simplification value after applying the method default; None when
    /// the method takes no value.
    pub fn resolved_simplify_value(&self) -> Option<f64> {
        self.simplify
            .default_value()
            .map(|default| self.simplify_value.unwrap_or(default))
    }

    /// Smoothing value after applying the method default.
    pub fn resolved_smooth_value(&self) -> Option<f64> {
        self.smooth
            .default_value()
            .map(|default| self.smooth_value.unwrap_or(default))
    }

    /// Options for the nii2mesh backend.
    pub fn nii2mesh_options(&self) -> Nii2MeshOptions {
        Nii2MeshOptions {
            executable: self.nii2mesh_executable.clone(),
            verbose: self.nii2mesh_verbose,
            staging_dir: self.staging_dir.clone(),
            ..Nii2MeshOptions::from_values(
                self.smooth_value.unwrap_or(0.0),
                self.simplify_value.unwrap_or(100.0),
            )
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> MeshResult<()> {
        if !self.iso_level.is_finite() {
            return Err(MeshError::invalid_parameter(
                "iso_level",
                format!("must be finite, got {}", self.iso_level),
            ));
        }
        if let Some(scale) = self.grid_scale
            && !scale.iter().all(|s| s.is_finite() && *s > 0.0)
        {
            return Err(MeshError::invalid_parameter(
                "grid_scale",
                format!("components must be > 0, got {:?}", scale),
            ));
        }
        if let Some(name) = &self.out_name
            && (name.is_empty() || name.contains(['/', '\\']))
        {
            return Err(MeshError::invalid_parameter(
                "out_name",
                format!("must be a plain file name, got {:?}", name),
            ));
        }

        // nii2mesh meshes every non-zero voxel of the input file
        if self.backend == Backend::Nii2mesh
            && let Some(label) = self.label
        {
            return Err(MeshError::invalid_parameter(
                "label",
                format!(
                    "nii2mesh cannot select label {}; use the native or raw backend",
                    label
                ),
            ));
        }

        if self.backend == Backend::Native {
            if let Some(value) = self.resolved_simplify_value() {
                let valid = match self.simplify {
                    SimplifyMethod::QuadricCollapse => value > 0.0 && value <= 100.0,
                    _ => value.is_finite() && value > 0.0,
                };
                if !valid {
                    return Err(MeshError::invalid_parameter(
                        "simplify_value",
                        format!(
                            "{} value out of range: {}",
                            self.simplify.flag().unwrap_or("none"),
                            value
                        ),
                    ));
                }
            }
            if let Some(value) = self.resolved_smooth_value()
                && !(value.is_finite() && value >= 0.0)
            {
                return Err(MeshError::invalid_parameter(
                    "smooth_value",
                    format!("must be >= 0, got {}", value),
                ));
            }
        }
        Ok(())
    }
}

// =========================================================================
// Result
// =========================================================================

/// Outcome of [`generate_from_nii`].
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResult {
    /// Where the mesh was saved.
    pub mesh_path: PathBuf,
    pub backend: Backend,
    /// Statistics of the saved mesh; None if it could not be measured
    /// (nii2mesh output in a write-only format).
    pub stats: Option<MeshStats>,
    /// Label-map volume versus mesh volume, in cm^3.
    pub volumes: Option<VolumeComparison>,
    pub report_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    /// Generation time, excluding report and screenshot.
    pub elapsed_secs: f64,
    /// Log of the steps performed.
    pub operation_log: Vec<String>,
}

// =========================================================================
// Dispatch
// =========================================================================

/// Generate a mesh from a NIFTI label map and save it.
pub fn generate_from_nii(input: &Path, params: &GenerateParams) -> MeshResult<GenerateResult> {
    let _timer = OperationTimer::new("generate_from_nii");
    let start = Instant::now();
    params.validate()?;

    let mut log = Vec::new();
    let out_name = params
        .out_name
        .clone()
        .unwrap_or_else(|| default_output_name(input, params));

    let map = LabelMap::load(input)?;
    log.push(format!("Loaded label map {}", input.display()));
    let mask = match params.label {
        Some(label) => {
            log.push(format!("Selected label {}", label));
            map.select_label(label)
        }
        None => map.binarize(),
    };

    let (mesh_path, mesh, label_volume) = match params.backend {
        Backend::Native => {
            let mask = match params.grid_scale {
                Some(scale) => {
                    log.push(format!("Grid scale {:?}", scale));
                    mask.with_spacing(scale)
                }
                None => mask,
            };
            let mesh = build_native(&mask, params, &mut log)?;
            let path = save_unique(&mesh, params, &out_name)?;
            (path, Some(mesh), mask.foreground_volume())
        }
        Backend::Raw => {
            if params.simplify != SimplifyMethod::None || params.smooth != SmoothMethod::None {
                warn!("Raw backend ignores simplification and smoothing");
            }
            if params.grid_scale.is_some() {
                warn!("Raw backend uses the header spacing, ignoring the grid scale");
            }
            let mesh = extract_isosurface(&mask, &IsosurfaceParams::default())?;
            log.push(format!(
                "Marching cubes: {} vertices, {} faces",
                mesh.vertex_count(),
                mesh.face_count()
            ));
            let path = save_unique(&mesh, params, &out_name)?;
            (path, Some(mesh), mask.foreground_volume())
        }
        Backend::Nii2mesh => {
            let options = params.nii2mesh_options();
            let path = run_nii2mesh(input, &params.out_dir, &out_name, params.format, &options)?;
            log.push(format!(
                "nii2mesh -s {} -r {}",
                options.smooth, options.reduction
            ));
            let mesh = if params.format.is_readable() {
                match load_mesh(&path) {
                    Ok(mesh) => Some(mesh),
                    Err(e) => {
                        warn!("Could not measure nii2mesh output: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            (path, mesh, mask.foreground_volume())
        }
    };
    log.push(format!("Saved {}", mesh_path.display()));
    let elapsed = start.elapsed();

    let stats = mesh.as_ref().map(MeshStats::compute);
    let volumes = stats
        .as_ref()
        .map(|s| VolumeComparison::new(label_volume / MM3_PER_CM3, s.volume_cm3()));
    if let Some(v) = &volumes {
        info!(
            "Label volume {:.3} cm^3, mesh volume {:.3} cm^3, error {}",
            v.label_volume,
            v.mesh_volume,
            v.error_percent
                .map_or_else(|| "n/a".to_string(), |e| format!("{:.3}%", e))
        );
    }

    let report_path = match (params.report, &volumes) {
        (true, Some(volumes)) => {
            let report = MeshReport::collect(&mesh_path, input, params, volumes, elapsed)?;
            let dir = params.report_dir.as_deref().unwrap_or(&params.out_dir);
            let path = report.write_to(dir)?;
            log.push(format!("Report {}", path.display()));
            Some(path)
        }
        (true, None) => {
            warn!("Skipping report: the mesh could not be measured");
            None
        }
        _ => None,
    };

    let screenshot_path = match (&params.screenshot, &mesh) {
        (Some(options), Some(mesh)) => {
            let path = options.capture(mesh, &mesh_path)?;
            log.push(format!("Screenshot {}", path.display()));
            Some(path)
        }
        (Some(_), None) => {
            warn!("Skipping screenshot: the mesh could not be loaded");
            None
        }
        _ => None,
    };

    Ok(GenerateResult {
        mesh_path,
        backend: params.backend,
        stats,
        volumes,
        report_path,
        screenshot_path,
        elapsed_secs: elapsed.as_secs_f64(),
        operation_log: log,
    })
}

/// Marching cubes, then the optional simplification and smoothing steps.
fn build_native(mask: &LabelMap, params: &GenerateParams, log: &mut Vec<String>) -> MeshResult<Mesh> {
    let iso = IsosurfaceParams::default().with_iso_level(params.iso_level);
    let mut mesh = extract_isosurface(mask, &iso)?;
    log.push(format!(
        "Marching cubes: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    ));

    let simplify_value = params.resolved_simplify_value();
    mesh = match params.simplify {
        SimplifyMethod::None => {
            info!("No simplification");
            mesh
        }
        SimplifyMethod::McCollapse => {
            let result = decimate_mesh(&mesh, &DecimateParams::for_marching_cubes());
            log.push(format!(
                "Marching-cubes edge collapse: {} -> {} faces",
                result.original_triangles, result.final_triangles
            ));
            result.mesh
        }
        SimplifyMethod::QuadricCollapse => {
            let percent = simplify_value.unwrap_or(50.0);
            let result = decimate_mesh(&mesh, &DecimateParams::with_target_percent(percent));
            log.push(format!(
                "Quadric edge collapse to {}%: {} -> {} faces",
                percent, result.original_triangles, result.final_triangles
            ));
            result.mesh
        }
        SimplifyMethod::Clustering => {
            let percent = simplify_value.unwrap_or(1.0);
            let result = cluster_vertices(&mesh, &ClusterParams::with_percent(percent))?;
            log.push(format!(
                "Clustering at {}%: {} -> {} faces",
                percent, result.original_triangles, result.final_triangles
            ));
            result.mesh
        }
    };
    if mesh.is_empty() {
        return Err(MeshError::decimation_failed(
            "simplification removed every face; use a smaller value",
        ));
    }

    // Iteration counts are whole numbers
    let passes = params
        .resolved_smooth_value()
        .map_or(0, |v| v.round() as usize);
    match params.smooth {
        SmoothMethod::None => info!("No smoothing"),
        SmoothMethod::Laplacian => {
            laplacian_smooth(&mut mesh, passes);
            log.push(format!("Laplacian smoothing, {} iterations", passes));
        }
        SmoothMethod::Taubin => {
            let taubin = TaubinParams {
                steps: passes,
                ..Default::default()
            };
            taubin_smooth(&mut mesh, &taubin);
            log.push(format!("Taubin smoothing, {} steps", passes));
        }
        SmoothMethod::Hc => {
            let hc = HcParams {
                iterations: passes,
                ..Default::default()
            };
            hc_laplacian_smooth(&mut mesh, &hc);
            log.push(format!("HC-Laplacian smoothing, {} iterations", passes));
        }
    }

    log_mesh_stats(&mesh, "native mesh");
    Ok(mesh)
}

fn save_unique(mesh: &Mesh, params: &GenerateParams, out_name: &str) -> MeshResult<PathBuf> {
    fs::create_dir_all(&params.out_dir).map_err(|e| MeshError::io_write(&params.out_dir, e))?;
    let path = unique_output_path(&params.out_dir, out_name, params.format.extension());
    save_mesh_as(mesh, &path, params.format)?;
    info!("{} saved successfully", path.display());
    Ok(path)
}

// =========================================================================
// Builder
// =========================================================================

/// Fluent construction of [`GenerateParams`].
#[derive(Debug, Clone, Default)]
pub struct MeshGenerator {
    params: GenerateParams,
}

impl MeshGenerator {
    /// Start from the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing parameters (e.g. loaded from settings).
    pub fn from_params(params: GenerateParams) -> Self {
        Self { params }
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.params.backend = backend;
        self
    }

    /// Simplification method and value (None for the method default).
    pub fn simplify(mut self, method: SimplifyMethod, value: Option<f64>) -> Self {
        self.params.simplify = method;
        self.params.simplify_value = value;
        self
    }

    /// Smoothing method and value (None for the method default).
    pub fn smooth(mut self, method: SmoothMethod, value: Option<f64>) -> Self {
        self.params.smooth = method;
        self.params.smooth_value = value;
        self
    }

    pub fn format(mut self, format: MeshFormat) -> Self {
        self.params.format = format;
        self
    }

    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.params.out_dir = dir.into();
        self
    }

    pub fn out_name(mut self, name: impl Into<String>) -> Self {
        self.params.out_name = Some(name.into());
        self
    }

    pub fn grid_scale(mut self, scale: [f64; 3]) -> Self {
        self.params.grid_scale = Some(scale);
        self
    }

    pub fn label(mut self, label: i64) -> Self {
        self.params.label = Some(label);
        self
    }

    pub fn iso_level(mut self, iso_level: f64) -> Self {
        self.params.iso_level = iso_level;
        self
    }

    pub fn report(mut self, enabled: bool) -> Self {
        self.params.report = enabled;
        self
    }

    pub fn report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.params.report_dir = Some(dir.into());
        self
    }

    pub fn screenshot(mut self, options: ScreenshotOptions) -> Self {
        self.params.screenshot = Some(options);
        self
    }

    pub fn nii2mesh_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.params.nii2mesh_executable = path.into();
        self
    }

    pub fn nii2mesh_verbose(mut self, verbose: bool) -> Self {
        self.params.nii2mesh_verbose = verbose;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.params.staging_dir = Some(dir.into());
        self
    }

    pub fn params(&self) -> &GenerateParams {
        &self.params
    }

    pub fn into_params(self) -> GenerateParams {
        self.params
    }

    /// Run [`generate_from_nii`] on `input`.
    pub fn run(&self, input: impl AsRef<Path>) -> MeshResult<GenerateResult> {
        generate_from_nii(input.as_ref(), &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert_eq!(Backend::from_flag("pymeshlab"), Some(Backend::Native));
        assert_eq!(Backend::from_flag("VTK"), Some(Backend::Raw));
        assert_eq!(Backend::from_flag("nii2mesh"), Some(Backend::Nii2mesh));
        assert_eq!(Backend::from_flag("blender"), None);

        assert_eq!(SimplifyMethod::from_flag("edmc"), SimplifyMethod::McCollapse);
        assert_eq!(SimplifyMethod::from_flag("edqe"), SimplifyMethod::QuadricCollapse);
        assert_eq!(SimplifyMethod::from_flag("mdc"), SimplifyMethod::Clustering);
        assert_eq!(SimplifyMethod::from_flag(""), SimplifyMethod::None);
        assert_eq!(SimplifyMethod::from_flag("bogus"), SimplifyMethod::None);

        assert_eq!(SmoothMethod::from_flag("lap"), SmoothMethod::Laplacian);
        assert_eq!(SmoothMethod::from_flag("tau"), SmoothMethod::Taubin);
        assert_eq!(SmoothMethod::from_flag("hc"), SmoothMethod::Hc);
        assert_eq!(SmoothMethod::from_flag("gauss"), SmoothMethod::None);
    }

    #[test]
    fn test_resolved_values() {
        let params = GenerateParams {
            simplify: SimplifyMethod::QuadricCollapse,
            smooth: SmoothMethod::Laplacian,
            smooth_value: Some(7.0),
            ..Default::default()
        };
        assert_eq!(params.resolved_simplify_value(), Some(50.0));
        assert_eq!(params.resolved_smooth_value(), Some(7.0));

        let params = GenerateParams {
            simplify: SimplifyMethod::McCollapse,
            simplify_value: Some(20.0),
            ..Default::default()
        };
        assert_eq!(params.resolved_simplify_value(), None);
        assert_eq!(params.resolved_smooth_value(), None);
    }

    #[test]
    fn test_nii2mesh_options_from_values() {
        let params = GenerateParams {
            backend: Backend::Nii2mesh,
            simplify_value: Some(40.0),
            smooth_value: Some(2.0),
            nii2mesh_verbose: true,
            ..Default::default()
        };
        let opts = params.nii2mesh_options();
        assert_eq!(opts.reduction, 0.4);
        assert_eq!(opts.smooth, 2.0);
        assert!(opts.verbose);

        let defaults = GenerateParams::default().nii2mesh_options();
        assert_eq!(defaults.reduction, 1.0);
        assert_eq!(defaults.smooth, 0.0);
    }

    #[test]
    fn test_validate() {
        assert!(GenerateParams::default().validate().is_ok());

        let bad = GenerateParams {
            simplify: SimplifyMethod::QuadricCollapse,
            simplify_value: Some(150.0),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(MeshError::InvalidParameter { .. })));

        let bad = GenerateParams {
            grid_scale: Some([0.55, 0.0, 0.55]),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(MeshError::InvalidParameter { .. })));

        let bad = GenerateParams {
            out_name: Some("../escape".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(MeshError::InvalidParameter { .. })));

        // Out-of-range native values are irrelevant to the raw backend
        let raw = GenerateParams {
            backend: Backend::Raw,
            simplify: SimplifyMethod::QuadricCollapse,
            simplify_value: Some(150.0),
            ..Default::default()
        };
        assert!(raw.validate().is_ok());

        let nii2mesh = GenerateParams {
            backend: Backend::Nii2mesh,
            label: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            nii2mesh.validate(),
            Err(MeshError::InvalidParameter { ref name, .. }) if name == "label"
        ));
        let raw_label = GenerateParams {
            backend: Backend::Raw,
            label: Some(1),
            ..Default::default()
        };
        assert!(raw_label.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let generator = MeshGenerator::new()
            .backend(Backend::Native)
            .simplify(SimplifyMethod::Clustering, Some(2.0))
            .smooth(SmoothMethod::Hc, None)
            .format(MeshFormat::Stl)
            .out_dir("out")
            .out_name("muscle")
            .grid_scale([0.55, 0.55, 0.55])
            .label(3)
            .report(true);

        let params = generator.params();
        assert_eq!(params.simplify, SimplifyMethod::Clustering);
        assert_eq!(params.simplify_value, Some(2.0));
        assert_eq!(params.smooth, SmoothMethod::Hc);
        assert_eq!(params.format, MeshFormat::Stl);
        assert_eq!(params.out_dir, PathBuf::from("out"));
        assert_eq!(params.out_name.as_deref(), Some("muscle"));
        assert_eq!(params.label, Some(3));
        assert!(params.report);
    }

    #[test]
    fn test_params_from_json() {
        let params: GenerateParams = serde_json::from_str(
            r#"{"backend": "vtk", "simplify": "mdc", "simplify_value": 2, "smooth": "unknown", "format": "stl"}"#,
        )
        .unwrap();
        assert_eq!(params.backend, Backend::Raw);
        assert_eq!(params.simplify, SimplifyMethod::Clustering);
        assert_eq!(params.smooth, SmoothMethod::None);
        assert_eq!(params.format, MeshFormat::Stl);
        assert_eq!(params.iso_level, 0.5);

        let err = serde_json::from_str::<GenerateParams>(r#"{"backend": "blender"}"#);
        assert!(err.is_err());
    }
}
