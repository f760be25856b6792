//! Surface smoothing.
//!
//! All smoothers move vertex positions only; faces are never touched.
//!
//! - [`laplacian_smooth`]: uniform umbrella operator. Shrinks the surface.
//! - [`taubin_smooth`]: alternating shrink / inflate passes (lambda / mu).
//! - [`hc_laplacian_smooth`]: Laplacian with a correction pulling vertices
//!   back toward their original and previous positions (Vollmer et al.).

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::Mesh;
use crate::adjacency::MeshAdjacency;
use crate::tracing_ext::OperationTimer;

/// Parameters for Taubin lambda/mu smoothing.
#[derive(Debug, Clone)]
pub struct TaubinParams {
    /// Shrinking factor, > 0. Default: 0.5
    pub lambda: f64,
    /// Inflating factor, < -lambda. Default: -0.53
    pub mu: f64,
    /// Number of lambda+mu step pairs. Default: 10
    pub steps: usize,
}

impl Default for TaubinParams {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            mu: -0.53,
            steps: 10,
        }
    }
}

/// Parameters for HC-Laplacian smoothing.
#[derive(Debug, Clone)]
pub struct HcParams {
    /// Weight of the original positions in the correction. Default: 0.0
    pub alpha: f64,
    /// Weight of a vertex's own correction versus its neighbours'. Default: 0.5
    pub beta: f64,
    /// Default: 1
    pub iterations: usize,
}

impl Default for HcParams {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            beta: 0.5,
            iterations: 1,
        }
    }
}

/// Summary of a smoothing run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothResult {
    /// Passes applied.
    pub iterations: usize,
    /// Mean distance vertices moved from where they started.
    pub mean_displacement: f64,
}

/// Neighbour rings used by the smoothers.
///
/// Boundary vertices only see their boundary neighbours, so they slide
/// along the boundary instead of pulling it inward.
struct Rings {
    rings: Vec<Vec<u32>>,
}

impl Rings {
    fn build(mesh: &Mesh) -> Self {
        let adj = MeshAdjacency::build(mesh);
        let boundary = adj.boundary_vertices();

        let rings = adj
            .vertex_neighbors
            .iter()
            .enumerate()
            .map(|(v, ring)| {
                if boundary[v] {
                    ring.iter()
                        .copied()
                        .filter(|&n| adj.is_boundary_edge(v as u32, n))
                        .collect()
                } else {
                    ring.clone()
                }
            })
            .collect();

        Self { rings }
    }

    /// Uniform Laplacian vector (neighbour centroid minus position).
    fn laplacian(&self, positions: &[Point3<f64>], v: usize) -> Vector3<f64> {
        let ring = &self.rings[v];
        if ring.is_empty() {
            return Vector3::zeros();
        }
        let sum: Vector3<f64> = ring.iter().map(|&n| positions[n as usize].coords).sum();
        sum / ring.len() as f64 - positions[v].coords
    }

    fn step(&self, positions: &mut Vec<Point3<f64>>, factor: f64) {
        let next: Vec<Point3<f64>> = (0..positions.len())
            .map(|v| positions[v] + self.laplacian(positions, v) * factor)
            .collect();
        *positions = next;
    }
}

fn positions(mesh: &Mesh) -> Vec<Point3<f64>> {
    mesh.vertices.iter().map(|v| v.position).collect()
}

fn write_back(mesh: &mut Mesh, positions: Vec<Point3<f64>>, iterations: usize) -> SmoothResult {
    let mut total = 0.0;
    for (vertex, p) in mesh.vertices.iter_mut().zip(positions) {
        total += (p - vertex.position).norm();
        vertex.position = p;
        vertex.normal = None;
    }
    let mean_displacement = if mesh.vertices.is_empty() {
        0.0
    } else {
        total / mesh.vertices.len() as f64
    };
    debug!(
        "Smoothing moved vertices {:.4} on average over {} passes",
        mean_displacement, iterations
    );
    SmoothResult {
        iterations,
        mean_displacement,
    }
}

/// Uniform Laplacian smoothing: each pass moves every vertex to the
/// centroid of its neighbours.
pub fn laplacian_smooth(mesh: &mut Mesh, iterations: usize) -> SmoothResult {
    let _timer = OperationTimer::with_mesh("laplacian_smooth", mesh);
    let rings = Rings::build(mesh);
    let mut p = positions(mesh);
    for _ in 0..iterations {
        rings.step(&mut p, 1.0);
    }
    write_back(mesh, p, iterations)
}

/// Taubin smoothing: a lambda (shrink) pass followed by a mu (inflate)
/// pass, repeated `steps` times. Volume loss is far smaller than plain
/// Laplacian smoothing.
pub fn taubin_smooth(mesh: &mut Mesh, params: &TaubinParams) -> SmoothResult {
    let _timer = OperationTimer::with_mesh("taubin_smooth", mesh);
    let rings = Rings::build(mesh);
    let mut p = positions(mesh);
    for _ in 0..params.steps {
        rings.step(&mut p, params.lambda);
        rings.step(&mut p, params.mu);
    }
    write_back(mesh, p, params.steps)
}

/// HC-Laplacian smoothing.
pub fn hc_laplacian_smooth(mesh: &mut Mesh, params: &HcParams) -> SmoothResult {
    let _timer = OperationTimer::with_mesh("hc_laplacian_smooth", mesh);
    let rings = Rings::build(mesh);
    let original = positions(mesh);
    let mut p = original.clone();

    for _ in 0..params.iterations {
        let previous = p.clone();
        let smoothed: Vec<Point3<f64>> = (0..p.len())
            .map(|v| previous[v] + rings.laplacian(&previous, v))
            .collect();

        // b: how far each vertex drifted from a blend of original and previous
        let b: Vec<Vector3<f64>> = (0..p.len())
            .map(|v| {
                smoothed[v].coords
                    - (original[v].coords * params.alpha + previous[v].coords * (1.0 - params.alpha))
            })
            .collect();

        for v in 0..p.len() {
            let ring = &rings.rings[v];
            let neighbour_mean = if ring.is_empty() {
                Vector3::zeros()
            } else {
                ring.iter().map(|&n| b[n as usize]).sum::<Vector3<f64>>() / ring.len() as f64
            };
            let d = b[v] * params.beta + neighbour_mean * (1.0 - params.beta);
            p[v] = smoothed[v] - d;
        }
    }

    write_back(mesh, p, params.iterations)
}
