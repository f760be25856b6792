//! Output file naming with duplicate handling.
//!
//! Existing files are never overwritten: `name.ext` becomes `name_1.ext`,
//! `name_2.ext`, and so on.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::generate::{Backend, GenerateParams};
use crate::tracing_ext::log_io_operation;

/// First of `dir/name.ext`, `dir/name_1.ext`, `dir/name_2.ext`, ... that
/// does not exist yet.
///
/// `ext` may be given with or without the leading dot.
pub fn unique_output_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    let ext = ext.trim_start_matches('.');
    let candidate = |suffix: usize| {
        let file = if suffix == 0 {
            format!("{}.{}", name, ext)
        } else {
            format!("{}_{}.{}", name, suffix, ext)
        };
        dir.join(file)
    };

    let mut suffix = 0;
    let mut path = candidate(suffix);
    while path.exists() {
        suffix += 1;
        path = candidate(suffix);
    }
    if suffix > 0 {
        debug!("{}.{} exists, using suffix _{}", name, ext, suffix);
    }
    path
}

/// File name of `path` without its directory and without a `.nii` or
/// `.nii.gz` extension (any other single extension is also stripped).
pub fn file_stem_without_nii(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();

    for ext in [".nii.gz", ".nii"] {
        if lower.ends_with(ext) && name.len() > ext.len() {
            return name[..name.len() - ext.len()].to_string();
        }
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

/// Output name used when none is given.
///
/// `<stem>_<backend>`, followed by `_<simplify><value>` and
/// `_<smooth><value>` when those steps run. The raw backend adds no
/// processing suffixes; nii2mesh adds its `-s` and `-r` values.
pub fn default_output_name(input: &Path, params: &GenerateParams) -> String {
    let mut name = format!("{}_{}", file_stem_without_nii(input), params.backend.flag());

    match params.backend {
        Backend::Raw => {}
        Backend::Native => {
            if let Some(flag) = params.simplify.flag() {
                name.push('_');
                name.push_str(flag);
                if let Some(value) = params.resolved_simplify_value() {
                    name.push_str(&value.to_string());
                }
            }
            if let Some(flag) = params.smooth.flag() {
                name.push('_');
                name.push_str(flag);
                if let Some(value) = params.resolved_smooth_value() {
                    name.push_str(&value.to_string());
                }
            }
        }
        Backend::Nii2mesh => {
            let opts = params.nii2mesh_options();
            name.push_str(&format!("_s{}_r{}", opts.smooth, opts.reduction));
        }
    }
    name
}

/// Move `src` to a unique path in `dir` named `name.ext` (with a numeric
/// suffix if taken), creating `dir` if needed. Returns the destination.
///
/// Rename is tried first; across filesystems it falls back to copy and
/// remove.
pub fn move_unique(src: &Path, dir: &Path, name: &str, ext: &str) -> MeshResult<PathBuf> {
    if !src.is_file() {
        return Err(MeshError::ExternalOutputMissing {
            path: src.to_path_buf(),
        });
    }
    fs::create_dir_all(dir).map_err(|e| MeshError::io_write(dir, e))?;

    let dest = unique_output_path(dir, name, ext);
    if fs::rename(src, &dest).is_err() {
        debug!("Rename failed, copying {:?} to {:?}", src, dest);
        fs::copy(src, &dest).map_err(|e| MeshError::io_write(&dest, e))?;
        fs::remove_file(src).map_err(|e| MeshError::io_write(src, e))?;
    }

    debug!("Moved {:?} to {:?}", src, dest);
    log_io_operation("move", &dest, Some(ext));
    Ok(dest)
}
