//! NIFTI label maps.
//!
//! A [`LabelMap`] is a dense 3D voxel grid (x fastest) with physical voxel
//! spacing in millimeters. Each voxel holds an integer label stored as
//! `f64`; zero is background.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, Axis, Ix3};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};

/// A 3D label volume with voxel spacing.
#[derive(Debug, Clone)]
pub struct LabelMap {
    dims: [usize; 3],
    spacing: [f64; 3],
    data: Vec<f64>,
    source: Option<PathBuf>,
}

impl LabelMap {
    /// Build a label map from raw voxel data (x fastest, then y, then z).
    ///
    /// Non-positive or non-finite spacing components fall back to 1.0.
    pub fn new(dims: [usize; 3], spacing: [f64; 3], data: Vec<f64>) -> MeshResult<Self> {
        let expected = dims.iter().product::<usize>();
        if expected == 0 {
            return Err(MeshError::invalid_label_map("volume has no voxels", &dims));
        }
        if data.len() != expected {
            return Err(MeshError::invalid_label_map(
                format!("expected {} voxels, got {}", expected, data.len()),
                &dims,
            ));
        }

        Ok(Self {
            dims,
            spacing: sanitize_spacing(spacing),
            data,
            source: None,
        })
    }

    /// Read a `.nii` or `.nii.gz` file.
    ///
    /// Scaling (`scl_slope`/`scl_inter`) is applied by the reader. For 4D
    /// inputs only the first volume is kept.
    pub fn load(path: &Path) -> MeshResult<Self> {
        info!("Loading label map from {:?}", path);

        if !path.exists() {
            return Err(MeshError::io_read(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }

        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| MeshError::nifti_read(path, e.to_string()))?;

        let header = obj.header();
        let ndim = header.dim[0] as usize;
        let header_dims: Vec<usize> = header.dim[1..=ndim.min(7)]
            .iter()
            .map(|&d| d as usize)
            .collect();
        if ndim < 3 {
            return Err(MeshError::invalid_label_map(
                format!("expected at least 3 dimensions, got {}", ndim),
                &header_dims,
            ));
        }
        let spacing = [
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ];

        let mut array: ArrayD<f64> = obj
            .into_volume()
            .into_ndarray::<f64>()
            .map_err(|e| MeshError::nifti_read(path, e.to_string()))?;

        if array.ndim() < 3 {
            return Err(MeshError::invalid_label_map(
                format!("expected at least 3 array dimensions, got {}", array.ndim()),
                array.shape(),
            ));
        }
        if array.ndim() > 3 {
            warn!(
                "Volume has {} dimensions, using the first 3D volume",
                array.ndim()
            );
            while array.ndim() > 3 {
                array = array.index_axis_move(Axis(3), 0);
            }
        }
        let volume = array
            .into_dimensionality::<Ix3>()
            .map_err(|e| MeshError::nifti_read(path, e.to_string()))?;

        let (nx, ny, nz) = volume.dim();
        let dims = [nx, ny, nz];
        let mut data = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(volume[[i, j, k]]);
                }
            }
        }

        let mut map = Self::new(dims, spacing, data)?;
        map.source = Some(path.to_path_buf());

        debug!(
            "Label map {}x{}x{}, spacing {:.3}x{:.3}x{:.3} mm",
            dims[0], dims[1], dims[2], map.spacing[0], map.spacing[1], map.spacing[2]
        );
        Ok(map)
    }

    /// Grid dimensions `[nx, ny, nz]`.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Voxel spacing in millimeters.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Raw voxel values, x fastest.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// File the map was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Linear index of voxel `(x, y, z)`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    /// Value at `(x, y, z)`, or None outside the grid.
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            Some(self.data[self.index(x, y, z)])
        } else {
            None
        }
    }

    /// Replace the voxel spacing (grid scale override).
    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = sanitize_spacing(spacing);
        self
    }

    /// Sorted distinct non-zero labels.
    pub fn labels(&self) -> Vec<i64> {
        self.data
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| v.round() as i64)
            .filter(|&l| l != 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Binary mask of one label: 1.0 where the rounded value equals `label`.
    pub fn select_label(&self, label: i64) -> LabelMap {
        self.map_values(|v| if v.round() as i64 == label { 1.0 } else { 0.0 })
    }

    /// Binary mask of the foreground: 1.0 wherever the value is non-zero.
    pub fn binarize(&self) -> LabelMap {
        self.map_values(|v| if v != 0.0 && !v.is_nan() { 1.0 } else { 0.0 })
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> LabelMap {
        LabelMap {
            dims: self.dims,
            spacing: self.spacing,
            data: self.data.iter().map(|&v| f(v)).collect(),
            source: self.source.clone(),
        }
    }

    /// Number of non-zero voxels.
    pub fn foreground_voxels(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0.0 && !v.is_nan()).count()
    }

    /// Volume of one voxel in mm^3.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// Volume covered by non-zero voxels in mm^3.
    pub fn foreground_volume(&self) -> f64 {
        self.foreground_voxels() as f64 * self.voxel_volume()
    }
}

fn sanitize_spacing(spacing: [f64; 3]) -> [f64; 3] {
    spacing.map(|s| if s.is_finite() && s > 0.0 { s } else { 1.0 })
}
