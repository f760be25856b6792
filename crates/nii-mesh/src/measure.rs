//! Volume and surface statistics.

use nalgebra::Point3;
use parry3d::transformation::try_convex_hull;
use serde::Serialize;
use tracing::{debug, warn};

use crate::Mesh;
use crate::adjacency::MeshAdjacency;

/// mm^3 per cm^3.
pub const MM3_PER_CM3: f64 = 1000.0;

/// Round to two decimals, as values appear in reports.
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Summary statistics for a mesh.
#[derive(Debug, Clone, Serialize)]
pub struct MeshStats {
    pub vertices: usize,
    pub faces: usize,
    /// Enclosed volume in mm^3 (absolute value of the signed volume).
    pub volume: f64,
    /// Total triangle area in mm^2.
    pub surface_area: f64,
    pub bounds_min: [f64; 3],
    pub bounds_max: [f64; 3],
    pub is_watertight: bool,
    pub is_inside_out: bool,
    pub boundary_edges: usize,
    pub non_manifold_edges: usize,
}

impl MeshStats {
    /// Compute statistics for `mesh`.
    pub fn compute(mesh: &Mesh) -> Self {
        let adj = MeshAdjacency::build(mesh);
        let (min, max) = mesh
            .bounds()
            .unwrap_or((Point3::origin(), Point3::origin()));

        Self {
            vertices: mesh.vertex_count(),
            faces: mesh.face_count(),
            volume: mesh.volume(),
            surface_area: mesh.surface_area(),
            bounds_min: [min.x, min.y, min.z],
            bounds_max: [max.x, max.y, max.z],
            is_watertight: adj.is_watertight(),
            is_inside_out: mesh.is_inside_out(),
            boundary_edges: adj.boundary_edge_count(),
            non_manifold_edges: adj.non_manifold_edge_count(),
        }
    }

    /// Volume in cm^3.
    pub fn volume_cm3(&self) -> f64 {
        self.volume / MM3_PER_CM3
    }
}

/// Volume of the convex hull of the mesh vertices in mm^3.
///
/// Returns 0.0 for fewer than four vertices or a degenerate (flat) point set.
pub fn convex_hull_volume(mesh: &Mesh) -> f64 {
    if mesh.vertex_count() < 4 {
        return 0.0;
    }

    let points: Vec<parry3d::math::Point<f32>> = mesh
        .vertices
        .iter()
        .map(|v| {
            parry3d::math::Point::new(
                v.position.x as f32,
                v.position.y as f32,
                v.position.z as f32,
            )
        })
        .collect();

    let (hull_points, hull_faces) = match try_convex_hull(&points) {
        Ok(hull) => hull,
        Err(e) => {
            warn!("Convex hull failed: {:?}", e);
            return 0.0;
        }
    };

    let hull = Mesh {
        vertices: hull_points
            .iter()
            .map(|p| crate::Vertex::from_coords(p.x as f64, p.y as f64, p.z as f64))
            .collect(),
        faces: hull_faces,
    };
    let volume = hull.volume();
    debug!(
        "Convex hull: {} vertices, {} faces, volume {:.3}",
        hull.vertex_count(),
        hull.face_count(),
        volume
    );
    volume
}

/// Label-map volume versus mesh volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeComparison {
    /// Volume of the foreground voxels.
    pub label_volume: f64,
    /// Volume enclosed by the mesh.
    pub mesh_volume: f64,
    /// `|label - mesh|`.
    pub difference: f64,
    /// `|label - mesh| / label * 100`; None when the label volume is zero.
    pub error_percent: Option<f64>,
}

impl VolumeComparison {
    /// Compare two volumes given in the same unit.
    pub fn new(label_volume: f64, mesh_volume: f64) -> Self {
        let difference = (label_volume - mesh_volume).abs();
        let error_percent = (label_volume != 0.0).then(|| difference / label_volume.abs() * 100.0);
        Self {
            label_volume,
            mesh_volume,
            difference,
            error_percent,
        }
    }
}
