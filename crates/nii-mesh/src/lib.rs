//! Surface meshes from NIFTI label maps.
//!
//! This crate turns segmented medical volumes (one integer label per voxel)
//! into triangle meshes and measures how faithfully the mesh encloses the
//! labelled region.
//!
//! # Features
//!
//! - **Label maps**: load `.nii` / `.nii.gz`, select a label or binarize,
//!   override the voxel spacing
//! - **Isosurface**: marching cubes with consistent outward winding
//! - **Simplification**: quadric edge collapse, zero-error collapse for
//!   marching-cubes meshes, vertex clustering
//! - **Smoothing**: Laplacian, Taubin, HC-Laplacian
//! - **Backends**: the native pipeline, raw marching cubes, or the external
//!   `nii2mesh` executable
//! - **Output**: OBJ, STL, PLY, VTK; duplicate-safe file naming; text
//!   reports; offscreen PNG screenshots; CSV folder summaries
//!
//! # Units and Coordinates
//!
//! **Coordinates are millimeters**: voxel index times voxel spacing (from
//! the NIFTI header, or a grid-scale override). The header affine is not
//! applied. Volumes in [`MeshStats`] are mm^3; reports and
//! [`VolumeComparison`] use cm^3.
//!
//! Faces are counter-clockwise seen from outside, so a closed mesh has a
//! positive signed volume.
//!
//! # Quick Start
//!
//! ```no_run
//! use nii_mesh::{GenerateParams, SimplifyMethod, generate_from_nii};
//! use std::path::Path;
//!
//! let params = GenerateParams {
//!     simplify: SimplifyMethod::QuadricCollapse,
//!     simplify_value: Some(30.0),
//!     report: true,
//!     ..Default::default()
//! };
//! let result = generate_from_nii(Path::new("liver.nii.gz"), &params).unwrap();
//!
//! if let Some(volumes) = result.volumes {
//!     println!("Volumetric error: {:?} %", volumes.error_percent);
//! }
//! ```
//!
//! # Working with the Pieces
//!
//! ```no_run
//! use nii_mesh::{
//!     DecimateParams, IsosurfaceParams, LabelMap, MeshFormat, TaubinParams,
//!     decimate_mesh, extract_isosurface, save_mesh_as, taubin_smooth,
//! };
//! use std::path::Path;
//!
//! let map = LabelMap::load(Path::new("muscles.nii.gz")).unwrap();
//! let sartorius = map.select_label(4).with_spacing([0.55, 0.55, 0.55]);
//!
//! let mesh = extract_isosurface(&sartorius, &IsosurfaceParams::default()).unwrap();
//! let mut mesh = decimate_mesh(&mesh, &DecimateParams::with_target_percent(25.0)).mesh;
//! taubin_smooth(&mut mesh, &TaubinParams::default());
//!
//! save_mesh_as(&mesh, Path::new("sartorius.stl"), MeshFormat::Stl).unwrap();
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber. See
//! [`tracing_ext`] for the targets used.

mod error;
pub mod tracing_ext;
mod types;

pub mod adjacency;
pub mod config;
pub mod decimate;
pub mod folder;
pub mod generate;
pub mod io;
pub mod labelmap;
pub mod marching_cubes;
pub mod measure;
pub mod naming;
pub mod nii2mesh;
pub mod render;
pub mod report;
pub mod smooth;

// Core types
pub use error::{ErrorCode, MeshError, MeshLocation, MeshResult, RecoverySuggestion};
pub use types::{Mesh, Triangle, Vertex};

pub use adjacency::MeshAdjacency;

// I/O
pub use io::{MeshFormat, load_mesh, save_mesh, save_mesh_as};
pub use labelmap::LabelMap;

// Processing
pub use decimate::{
    ClusterParams, ClusterResult, DecimateParams, DecimateResult, cluster_vertices, decimate_mesh,
};
pub use marching_cubes::{IsosurfaceParams, extract_isosurface};
pub use smooth::{
    HcParams, SmoothResult, TaubinParams, hc_laplacian_smooth, laplacian_smooth, taubin_smooth,
};

// Measurement and output
pub use config::Settings;
pub use folder::{FolderEntry, FolderParams, FolderSummary, scan_folder};
pub use generate::{
    Backend, GenerateParams, GenerateResult, MeshGenerator, SimplifyMethod, SmoothMethod,
    generate_from_nii,
};
pub use measure::{MeshStats, VolumeComparison, convex_hull_volume};
pub use naming::{default_output_name, unique_output_path};
pub use nii2mesh::{Nii2MeshOptions, run_nii2mesh};
pub use render::{
    Camera, CameraChoice, Orientation, RenderParams, ScreenshotOptions, render_mesh,
    save_screenshot,
};
pub use report::MeshReport;
