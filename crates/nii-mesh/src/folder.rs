//! Batch statistics over a folder of meshes.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MeshError, MeshResult};
use crate::io::{MeshFormat, load_mesh};
use crate::measure::round2;
use crate::render::ScreenshotOptions;
use crate::tracing_ext::OperationTimer;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Options for [`scan_folder`].
#[derive(Debug, Clone, Default)]
pub struct FolderParams {
    /// Take a screenshot of every mesh.
    pub screenshot: Option<ScreenshotOptions>,
}

/// One mesh file in a scanned folder.
#[derive(Debug, Clone, Serialize)]
pub struct FolderEntry {
    pub file_name: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    /// Enclosed volume in mm^3 rounded to two decimals; 0.0 when the mesh
    /// could not be loaded.
    pub volume: f64,
    pub screenshot: Option<PathBuf>,
}

/// Result of [`scan_folder`], sorted by file name.
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub folder: PathBuf,
    pub entries: Vec<FolderEntry>,
}

fn is_scanned_mesh(path: &Path) -> bool {
    path.is_file()
        && matches!(
            MeshFormat::from_path(path),
            Some(MeshFormat::Obj | MeshFormat::Stl | MeshFormat::Ply)
        )
}

/// Size, volume and (optionally) a screenshot for every OBJ, STL and PLY
/// file directly inside `dir`.
pub fn scan_folder(dir: &Path, params: &FolderParams) -> MeshResult<FolderSummary> {
    let _timer = OperationTimer::new("scan_folder");

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| MeshError::io_read(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_scanned_mesh(p))
        .collect();
    files.sort();
    info!("Scanning {} mesh files in {:?}", files.len(), dir);

    let entries = files
        .par_iter()
        .map(|path| scan_file(path, params))
        .collect::<MeshResult<Vec<_>>>()?;

    Ok(FolderSummary {
        folder: dir.to_path_buf(),
        entries,
    })
}

fn scan_file(path: &Path, params: &FolderParams) -> MeshResult<FolderEntry> {
    let size_bytes = fs::metadata(path)
        .map_err(|e| MeshError::io_read(path, e))?
        .len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mesh = match load_mesh(path) {
        Ok(mesh) => Some(mesh),
        Err(e) => {
            warn!("Could not measure {:?}: {}", path, e);
            None
        }
    };
    let volume = mesh.as_ref().map_or(0.0, |m| round2(m.volume()));

    let screenshot = match (&params.screenshot, &mesh) {
        (Some(options), Some(mesh)) => match options.capture(mesh, path) {
            Ok(png) => Some(png),
            Err(e) => {
                warn!("Screenshot of {:?} failed: {}", path, e);
                None
            }
        },
        _ => None,
    };

    Ok(FolderEntry {
        file_name,
        size_bytes,
        size_mb: size_bytes as f64 / BYTES_PER_MB,
        volume,
        screenshot,
    })
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl FolderSummary {
    /// `<dir>/<name>_file_sizes.csv`.
    pub fn csv_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}_file_sizes.csv", name))
    }

    /// Table as CSV text with a header row.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("File Name,File Size (B),File Size (MB),Mesh Volume\n");
        for e in &self.entries {
            out.push_str(&format!(
                "{},{},{:.6},{}\n",
                csv_field(&e.file_name),
                e.size_bytes,
                e.size_mb,
                e.volume
            ));
        }
        out
    }

    /// Write the table to `path`.
    pub fn write_csv(&self, path: &Path) -> MeshResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| MeshError::io_write(parent, e))?;
        }
        fs::write(path, self.to_csv()).map_err(|e| MeshError::io_write(path, e))?;
        info!("File sizes saved to {:?}", path);
        Ok(())
    }

    /// Sum of all file sizes in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::save_mesh;
    use crate::render::RenderParams;
    use crate::types::tests::make_unit_cube;
    use tempfile::tempdir;

    fn populate(dir: &Path) {
        let mut cube = make_unit_cube();
        save_mesh(&cube, &dir.join("b_cube.obj")).unwrap();
        cube.scale(2.0);
        save_mesh(&cube, &dir.join("a_cube.stl")).unwrap();
        fs::write(dir.join("broken.ply"), b"not a ply file").unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    }

    #[test]
    fn test_scan_folder_sorted_with_volumes() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let summary = scan_folder(dir.path(), &FolderParams::default()).unwrap();
        let names: Vec<&str> = summary.entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["a_cube.stl", "b_cube.obj", "broken.ply"]);

        assert_eq!(summary.entries[0].volume, 8.0);
        assert_eq!(summary.entries[1].volume, 1.0);
        // Unreadable meshes still get a row
        assert_eq!(summary.entries[2].volume, 0.0);
        assert_eq!(summary.entries[2].size_bytes, 14);
        assert!(summary.entries.iter().all(|e| e.screenshot.is_none()));

        let stl_size = fs::metadata(dir.path().join("a_cube.stl")).unwrap().len();
        assert_eq!(summary.entries[0].size_bytes, stl_size);
        assert!((summary.entries[0].size_mb - stl_size as f64 / BYTES_PER_MB).abs() < 1e-12);
    }

    #[test]
    fn test_scan_folder_with_screenshots() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let pictures = dir.path().join("pictures");

        let mut options = ScreenshotOptions::new(&pictures);
        options.params = RenderParams::default().with_size(32, 24);
        let params = FolderParams {
            screenshot: Some(options),
        };

        let summary = scan_folder(dir.path(), &params).unwrap();
        assert_eq!(
            summary.entries[1].screenshot.as_deref(),
            Some(pictures.join("b_cube.obj.png").as_path())
        );
        assert!(pictures.join("a_cube.stl.png").is_file());
        assert!(summary.entries[2].screenshot.is_none());
    }

    #[test]
    fn test_csv() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let summary = scan_folder(dir.path(), &FolderParams::default()).unwrap();

        let path = FolderSummary::csv_path(dir.path(), "nii2mesh");
        assert_eq!(path, dir.path().join("nii2mesh_file_sizes.csv"));
        summary.write_csv(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "File Name,File Size (B),File Size (MB),Mesh Volume");
        assert!(lines[1].starts_with("a_cube.stl,"));
        assert!(lines[1].ends_with(",8"));
        assert!(lines[3].ends_with(",0"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain.obj"), "plain.obj");
        assert_eq!(csv_field("a,b.obj"), "\"a,b.obj\"");
        assert_eq!(csv_field("say \"hi\".obj"), "\"say \"\"hi\"\".obj\"");
    }

    #[test]
    fn test_scan_missing_folder() {
        let err = scan_folder(Path::new("/nonexistent/meshes"), &FolderParams::default())
            .unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }
}
