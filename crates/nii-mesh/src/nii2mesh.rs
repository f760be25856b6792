//! Running the external `nii2mesh` executable.
//!
//! nii2mesh writes its output next to where it runs, so the process runs
//! in a staging directory and the result is then moved into the output
//! directory with [`move_unique`].

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::io::MeshFormat;
use crate::naming::{move_unique, unique_output_path};
use crate::tracing_ext::OperationTimer;

/// Options passed to nii2mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Nii2MeshOptions {
    /// Executable name (looked up on `PATH`) or full path.
    pub executable: PathBuf,
    /// Smoothing iterations (`-s`).
    pub smooth: f64,
    /// Reduction factor in (0, 1] (`-r`); 1.0 keeps every face.
    pub reduction: f64,
    /// Pass `-v 1`.
    pub verbose: bool,
    /// Where nii2mesh runs and writes its file. Defaults to a fresh
    /// directory under the system temporary directory, removed afterwards.
    pub staging_dir: Option<PathBuf>,
}

impl Default for Nii2MeshOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("nii2mesh"),
            smooth: 0.0,
            reduction: 1.0,
            verbose: false,
            staging_dir: None,
        }
    }
}

impl Nii2MeshOptions {
    /// Build options from the generic smooth/simplify values, where the
    /// simplify value is a percentage of faces kept.
    pub fn from_values(smooth_value: f64, simplify_value: f64) -> Self {
        Self {
            smooth: smooth_value,
            reduction: simplify_value / 100.0,
            ..Default::default()
        }
    }

    /// Command-line arguments for converting `input` into `output`.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-s".into(),
            self.smooth.to_string().into(),
            "-r".into(),
            self.reduction.to_string().into(),
        ];
        if self.verbose {
            args.push("-v".into());
            args.push("1".into());
        }
        args.push(input.into());
        args.push(output.into());
        args
    }

    fn validate(&self) -> MeshResult<()> {
        if !(self.smooth.is_finite() && self.smooth >= 0.0) {
            return Err(MeshError::invalid_parameter(
                "smooth_value",
                format!("nii2mesh smoothing must be >= 0, got {}", self.smooth),
            ));
        }
        if !(self.reduction > 0.0 && self.reduction <= 1.0) {
            return Err(MeshError::invalid_parameter(
                "simplify_value",
                format!(
                    "nii2mesh reduction must be in (0, 1], got {} (simplify value {})",
                    self.reduction,
                    self.reduction * 100.0
                ),
            ));
        }
        Ok(())
    }
}

/// Convert `input` with nii2mesh and move the result to
/// `<out_dir>/<out_name>.<ext>` (suffixed if taken). Returns the final path.
pub fn run_nii2mesh(
    input: &Path,
    out_dir: &Path,
    out_name: &str,
    format: MeshFormat,
    options: &Nii2MeshOptions,
) -> MeshResult<PathBuf> {
    let _timer = OperationTimer::new("nii2mesh");
    options.validate()?;

    // The process runs elsewhere, so relative inputs must be resolved here
    let input = input
        .canonicalize()
        .map_err(|e| MeshError::io_read(input, e))?;

    // Per-run directory unless one is given; removed when `_scratch` drops
    let (staging, _scratch) = match &options.staging_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let tmp = tempfile::Builder::new()
                .prefix("nii2mesh-")
                .tempdir()
                .map_err(|e| MeshError::io_write(std::env::temp_dir(), e))?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };
    std::fs::create_dir_all(&staging).map_err(|e| MeshError::io_write(&staging, e))?;
    let staged = unique_output_path(&staging, out_name, format.extension());

    let args = options.arguments(&input, &staged);
    let exe = options.executable.display().to_string();
    info!("Running {} {:?}", exe, args);

    let output = Command::new(&options.executable)
        .args(&args)
        .current_dir(&staging)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                MeshError::tool_not_found(exe.clone(), e)
            }
            _ => MeshError::tool_failed(exe.clone(), "could not start", e.to_string()),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("nii2mesh stdout:\n{}", stdout.trim_end());
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MeshError::tool_failed(exe, output.status.to_string(), stderr));
    }

    if !staged.is_file() {
        warn!("nii2mesh exited successfully but wrote no {:?}", staged);
        return Err(MeshError::ExternalOutputMissing { path: staged });
    }

    move_unique(&staged, out_dir, out_name, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_arguments() {
        let opts = Nii2MeshOptions::from_values(3.0, 25.0);
        assert_eq!(opts.reduction, 0.25);

        let args = strings(opts.arguments(Path::new("in.nii"), Path::new("out.obj")));
        assert_eq!(args, ["-s", "3", "-r", "0.25", "in.nii", "out.obj"]);

        let verbose = Nii2MeshOptions {
            verbose: true,
            ..opts
        };
        let args = strings(verbose.arguments(Path::new("in.nii"), Path::new("out.obj")));
        assert_eq!(args, ["-s", "3", "-r", "0.25", "-v", "1", "in.nii", "out.obj"]);
    }

    #[test]
    fn test_invalid_reduction() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.nii");
        std::fs::write(&input, b"").unwrap();

        let opts = Nii2MeshOptions::from_values(0.0, 0.0);
        let err = run_nii2mesh(&input, dir.path(), "out", MeshFormat::Obj, &opts).unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_executable() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.nii");
        std::fs::write(&input, b"").unwrap();

        let opts = Nii2MeshOptions {
            executable: PathBuf::from("/nonexistent/bin/nii2mesh"),
            staging_dir: Some(dir.path().join("stage")),
            ..Default::default()
        };
        let err = run_nii2mesh(&input, dir.path(), "out", MeshFormat::Obj, &opts).unwrap_err();
        assert!(matches!(err, MeshError::ExternalToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_default_staging_is_private_and_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let input = dir.path().join("in.nii");
        std::fs::write(&input, b"").unwrap();
        let script = dir.path().join("nii2mesh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor last; do :; done\necho \"$last\" > \"$(dirname \"$0\")/staged.txt\"\nprintf 'v 0 0 0\\nv 1 0 0\\nv 0 1 0\\nf 1 2 3\\n' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let opts = Nii2MeshOptions {
            executable: script,
            ..Default::default()
        };
        let out = run_nii2mesh(&input, dir.path(), "out", MeshFormat::Obj, &opts).unwrap();
        assert_eq!(out, dir.path().join("out.obj"));
        assert!(out.is_file());

        let staged = PathBuf::from(
            std::fs::read_to_string(dir.path().join("staged.txt"))
                .unwrap()
                .trim(),
        );
        let staging = staged.parent().unwrap();
        assert_ne!(staging, std::env::temp_dir().as_path());
        assert!(!staging.exists());
    }

    #[test]
    fn test_missing_input() {
        let dir = tempdir().unwrap();
        let opts = Nii2MeshOptions::default();
        let err = run_nii2mesh(
            &dir.path().join("absent.nii"),
            dir.path(),
            "out",
            MeshFormat::Obj,
            &opts,
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }
}
