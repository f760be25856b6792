//! Plain-text generation report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::error::{MeshError, MeshResult};
use crate::generate::{Backend, GenerateParams};
use crate::measure::{VolumeComparison, round2};
use crate::naming::file_stem_without_nii;

/// Date format used in reports.
pub const DATE_FORMAT: &str = "%m/%d/%Y - %H:%M:%S";

/// Everything recorded about one generated mesh.
#[derive(Debug, Clone, Serialize)]
pub struct MeshReport {
    /// Mesh file name.
    pub mesh_file: String,
    /// Input file name.
    pub nifti_file: String,
    /// Full path of the mesh.
    pub mesh_path: PathBuf,
    pub label_volume_cm3: f64,
    pub mesh_volume_cm3: f64,
    /// `|label - mesh| / label * 100`, None for an empty label map.
    pub error_percent: Option<f64>,
    /// Mesh file size in bytes.
    pub file_size: u64,
    pub backend: String,
    pub smoothing: String,
    pub smooth_value: Option<f64>,
    pub simplify: String,
    pub simplify_value: Option<f64>,
    pub elapsed_secs: f64,
    /// Local time the report was made, as [`DATE_FORMAT`].
    pub date: String,
}

impl MeshReport {
    /// Collect a report for a saved mesh. Volumes are in cm^3.
    pub fn collect(
        mesh_path: &Path,
        nifti_path: &Path,
        params: &GenerateParams,
        volumes: &VolumeComparison,
        elapsed: Duration,
    ) -> MeshResult<Self> {
        let file_size = fs::metadata(mesh_path)
            .map_err(|e| MeshError::io_read(mesh_path, e))?
            .len();

        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        // Raw ignores post-processing; report what actually ran
        let (simplify, simplify_value, smoothing, smooth_value) = match params.backend {
            Backend::Raw => ("none".to_string(), None, "none".to_string(), None),
            Backend::Native => (
                params.simplify.flag().unwrap_or("none").to_string(),
                params.resolved_simplify_value(),
                params.smooth.flag().unwrap_or("none").to_string(),
                params.resolved_smooth_value(),
            ),
            Backend::Nii2mesh => {
                let opts = params.nii2mesh_options();
                (
                    "reduction".to_string(),
                    Some(opts.reduction),
                    "iterations".to_string(),
                    Some(opts.smooth),
                )
            }
        };

        Ok(Self {
            mesh_file: file_name(mesh_path),
            nifti_file: file_name(nifti_path),
            mesh_path: mesh_path.to_path_buf(),
            label_volume_cm3: volumes.label_volume,
            mesh_volume_cm3: volumes.mesh_volume,
            error_percent: volumes.error_percent,
            file_size,
            backend: params.backend.flag().to_string(),
            smoothing,
            smooth_value,
            simplify,
            simplify_value,
            elapsed_secs: elapsed.as_secs_f64(),
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
        })
    }

    /// The report as text.
    pub fn render(&self) -> String {
        let value = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        let error = self
            .error_percent
            .map_or_else(|| "n/a".to_string(), |e| format!("{:.5}", e));

        format!(
            "Mesh file\t: {mesh_file}\n\
             Nifti file\t: {nifti_file}\n\n\
             --- INFO ---\n\n\
             Label-map Volume (cm^3)\t: {label}\n\
             Mesh Volume (cm^3)\t: {mesh}\n\n\
             Conversion Volumetric Error : {error} %\n\
             Size\t: {size} B ({size_mb:.2} MB)\n\n\
             --- PARAMETERS ---\n\n\
             backend\t: {backend}\n\
             smoothing\t: {smoothing}\n\
             smooth_val\t: {smooth_value}\n\
             simplify\t: {simplify}\n\
             simply_val\t: {simplify_value}\n\n\
             --- OTHER ---\n\n\
             Elapsed time\t: {elapsed:.3} s\n\
             Date\t: {date}\n\n\
             {path}",
            mesh_file = self.mesh_file,
            nifti_file = self.nifti_file,
            label = round2(self.label_volume_cm3),
            mesh = round2(self.mesh_volume_cm3),
            size = self.file_size,
            size_mb = self.file_size as f64 / (1024.0 * 1024.0),
            backend = self.backend,
            smoothing = self.smoothing,
            smooth_value = value(self.smooth_value),
            simplify = self.simplify,
            simplify_value = value(self.simplify_value),
            elapsed = self.elapsed_secs,
            date = self.date,
            path = self.mesh_path.display(),
        )
    }

    /// Path the report is written to: `<dir>/<mesh stem>_info.txt`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        let stem = file_stem_without_nii(&self.mesh_path);
        dir.join(format!("{}_info.txt", stem))
    }

    /// Write the report next to its mesh in `dir`. Returns the path.
    pub fn write_to(&self, dir: &Path) -> MeshResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| MeshError::io_write(dir, e))?;
        let path = self.path_in(dir);
        fs::write(&path, self.render()).map_err(|e| MeshError::io_write(&path, e))?;
        info!("Wrote report to {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{SimplifyMethod, SmoothMethod};
    use tempfile::tempdir;

    fn sample(dir: &Path, params: &GenerateParams) -> MeshReport {
        let mesh_path = dir.join("gluteus_native.obj");
        fs::write(&mesh_path, vec![b'x'; 2048]).unwrap();
        let volumes = VolumeComparison::new(12.5, 12.0);
        MeshReport::collect(
            &mesh_path,
            Path::new("/data/gluteus.nii.gz"),
            params,
            &volumes,
            Duration::from_millis(1500),
        )
        .unwrap()
    }

    #[test]
    fn test_collect_fields() {
        let dir = tempdir().unwrap();
        let params = GenerateParams {
            simplify: SimplifyMethod::QuadricCollapse,
            smooth: SmoothMethod::Laplacian,
            smooth_value: Some(5.0),
            ..Default::default()
        };
        let report = sample(dir.path(), &params);

        assert_eq!(report.mesh_file, "gluteus_native.obj");
        assert_eq!(report.nifti_file, "gluteus.nii.gz");
        assert_eq!(report.file_size, 2048);
        assert_eq!(report.backend, "native");
        assert_eq!(report.simplify, "edqe");
        assert_eq!(report.simplify_value, Some(50.0));
        assert_eq!(report.smoothing, "lap");
        assert_eq!(report.smooth_value, Some(5.0));
        assert!((report.error_percent.unwrap() - 4.0).abs() < 1e-9);
        assert!(chrono::NaiveDateTime::parse_from_str(&report.date, DATE_FORMAT).is_ok());
    }

    #[test]
    fn test_raw_backend_reports_no_processing() {
        let dir = tempdir().unwrap();
        let params = GenerateParams {
            backend: Backend::Raw,
            smooth: SmoothMethod::Taubin,
            ..Default::default()
        };
        let report = sample(dir.path(), &params);
        assert_eq!(report.smoothing, "none");
        assert_eq!(report.smooth_value, None);
    }

    #[test]
    fn test_render_text() {
        let dir = tempdir().unwrap();
        let mut report = sample(dir.path(), &GenerateParams::default());
        report.date = "01/02/2024 - 03:04:05".to_string();
        let text = report.render();

        assert!(text.starts_with("Mesh file\t: gluteus_native.obj\n"));
        assert!(text.contains("Label-map Volume (cm^3)\t: 12.5\n"));
        assert!(text.contains("Mesh Volume (cm^3)\t: 12\n"));
        assert!(text.contains("Conversion Volumetric Error : 4.00000 %"));
        assert!(text.contains("Size\t: 2048 B"));
        assert!(text.contains("simplify\t: none\n"));
        assert!(text.contains("Elapsed time\t: 1.500 s"));
        assert!(text.contains("Date\t: 01/02/2024 - 03:04:05"));
        assert!(text.ends_with("gluteus_native.obj"));
    }

    #[test]
    fn test_write_to() {
        let dir = tempdir().unwrap();
        let report = sample(dir.path(), &GenerateParams::default());
        let out = dir.path().join("reports");

        let path = report.write_to(&out).unwrap();
        assert_eq!(path, out.join("gluteus_native_info.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), report.render());
    }
}
