//! Mesh simplification.
//!
//! Two families are provided:
//!
//! - [`decimate_mesh`]: greedy edge collapse ordered by quadric error
//!   (Garland-Heckbert). [`DecimateParams::for_marching_cubes`] restricts it
//!   to near-zero-error collapses, which merges the flat staircase patches
//!   marching cubes produces without moving the surface.
//! - [`cluster_vertices`]: uniform-grid vertex clustering with a cell size
//!   given as a percentage of the bounding-box diagonal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use nalgebra::{Matrix3, Point3, Vector3};
use tracing::{debug, info};

use crate::adjacency::{MeshAdjacency, normalize_edge};
use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::OperationTimer;
use crate::{Mesh, Vertex};

/// Parameters for quadric edge-collapse decimation.
#[derive(Debug, Clone)]
pub struct DecimateParams {
    /// Target number of triangles. If None, uses `target_ratio` instead.
    pub target_triangles: Option<usize>,
    /// Target ratio of triangles to keep (0.0 to 1.0). Default: 0.5
    pub target_ratio: f64,
    /// Never move or remove vertices on open boundaries. Default: true
    pub preserve_boundary: bool,
    /// Stop once the cheapest collapse costs more than this (squared distance).
    pub max_error: Option<f64>,
    /// Reject collapses that flip an adjacent face. Default: true
    pub prevent_flips: bool,
    /// Cost multiplier for edges touching a boundary when boundaries may move.
    pub boundary_penalty: f64,
}

impl Default for DecimateParams {
    fn default() -> Self {
        Self {
            target_triangles: None,
            target_ratio: 0.5,
            preserve_boundary: true,
            max_error: None,
            prevent_flips: true,
            boundary_penalty: 10.0,
        }
    }
}

impl DecimateParams {
    /// Target a specific triangle count.
    pub fn with_target_triangles(count: usize) -> Self {
        Self {
            target_triangles: Some(count),
            ..Default::default()
        }
    }

    /// Target a ratio of the original triangle count.
    pub fn with_target_ratio(ratio: f64) -> Self {
        Self {
            target_ratio: ratio.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Target a percentage (0-100) of the original face count.
    pub fn with_target_percent(percent: f64) -> Self {
        Self::with_target_ratio(percent / 100.0)
    }

    /// Collapse only edges whose quadric error is negligible.
    ///
    /// Suited to marching-cubes output: coplanar regions are merged, the
    /// surface shape does not change.
    pub fn for_marching_cubes() -> Self {
        Self {
            target_ratio: 0.0,
            max_error: Some(1e-8),
            ..Default::default()
        }
    }
}

/// Result of mesh decimation.
#[derive(Debug, Clone)]
pub struct DecimateResult {
    /// The decimated mesh.
    pub mesh: Mesh,
    /// Number of triangles in original mesh.
    pub original_triangles: usize,
    /// Number of triangles in decimated mesh.
    pub final_triangles: usize,
    /// Number of edge collapses performed.
    pub collapses_performed: usize,
    /// Number of edge collapses rejected (topology, flips, boundary).
    pub collapses_rejected: usize,
}

// ============================================================================
// Quadrics
// ============================================================================

/// Symmetric 4x4 quadric stored as its upper triangle:
/// `[a b c d; e f g; h i; j]`.
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    /// Quadric of the plane `n . p + d = 0` with unit normal `n`.
    fn from_plane(n: Vector3<f64>, d: f64) -> Self {
        let [a, b, c] = [n.x, n.y, n.z];
        Self([
            a * a,
            a * b,
            a * c,
            a * d,
            b * b,
            b * c,
            b * d,
            c * c,
            c * d,
            d * d,
        ])
    }

    fn add(&mut self, other: &Quadric) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }

    fn added(mut self, other: &Quadric) -> Quadric {
        self.add(other);
        self
    }

    /// Squared-distance error `v^T Q v` with `v = [x, y, z, 1]`.
    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let [a, b, c, d, e, f, g, h, i, j] = self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        a * x * x
            + 2.0 * b * x * y
            + 2.0 * c * x * z
            + 2.0 * d * x
            + e * y * y
            + 2.0 * f * y * z
            + 2.0 * g * y
            + h * z * z
            + 2.0 * i * z
            + j
    }

    /// Point minimizing the error, or None when the system is singular
    /// (flat or cylindrical neighbourhoods).
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let [a, b, c, d, e, f, g, h, i, _] = self.0;
        let m = Matrix3::new(a, b, c, b, e, f, c, f, h);
        if m.determinant().abs() < 1e-10 {
            return None;
        }
        let inv = m.try_inverse()?;
        Some(Point3::from(inv * Vector3::new(-d, -g, -i)))
    }
}

/// An edge collapse candidate in the priority queue.
#[derive(Debug, Clone)]
struct EdgeCollapse {
    v1: u32,
    v2: u32,
    cost: f64,
    target: Point3<f64>,
    /// Vertex versions when the candidate was computed.
    stamp: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the cheapest collapse first
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

// ============================================================================
// Edge collapse
// ============================================================================

struct Collapser<'p> {
    params: &'p DecimateParams,
    positions: Vec<Point3<f64>>,
    alive: Vec<bool>,
    version: Vec<u32>,
    boundary: Vec<bool>,
    quadrics: Vec<Quadric>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<u32>>,
    alive_vertices: usize,
}

impl<'p> Collapser<'p> {
    fn new(mesh: &Mesh, params: &'p DecimateParams) -> Self {
        let adj = MeshAdjacency::build(mesh);
        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| v.position).collect();

        let mut quadrics = vec![Quadric::default(); positions.len()];
        for face in &mesh.faces {
            let [p0, p1, p2] = face.map(|i| positions[i as usize]);
            let n = (p1 - p0).cross(&(p2 - p0));
            let len = n.norm();
            if len < 1e-12 {
                continue;
            }
            let n = n / len;
            let q = Quadric::from_plane(n, -n.dot(&p0.coords));
            for &vi in face {
                quadrics[vi as usize].add(&q);
            }
        }

        Self {
            params,
            alive_vertices: positions.len(),
            alive: vec![true; positions.len()],
            version: vec![0; positions.len()],
            boundary: adj.boundary_vertices(),
            quadrics,
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vertex_faces: adj.vertex_to_faces,
            positions,
        }
    }

    fn candidate(&self, v1: u32, v2: u32) -> Option<EdgeCollapse> {
        let (b1, b2) = (self.boundary[v1 as usize], self.boundary[v2 as usize]);
        if self.params.preserve_boundary && (b1 || b2) {
            return None;
        }

        let q = self.quadrics[v1 as usize].added(&self.quadrics[v2 as usize]);
        let p1 = self.positions[v1 as usize];
        let p2 = self.positions[v2 as usize];

        // Singular systems fall back to the best of the endpoints and midpoint
        let target = q.optimal_point().unwrap_or_else(|| {
            let mid = Point3::from((p1.coords + p2.coords) * 0.5);
            [p1, p2, mid]
                .into_iter()
                .min_by(|a, b| {
                    q.evaluate(a)
                        .partial_cmp(&q.evaluate(b))
                        .unwrap_or(Ordering::Equal)
                })
                .unwrap_or(mid)
        });

        let mut cost = q.evaluate(&target).max(0.0);
        if b1 || b2 {
            cost *= self.params.boundary_penalty;
        }

        Some(EdgeCollapse {
            v1,
            v2,
            cost,
            target,
            stamp: (self.version[v1 as usize], self.version[v2 as usize]),
        })
    }

    fn live_faces(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f as usize])
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.live_faces(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect()
    }

    /// Link condition plus optional flip test.
    fn is_valid(&self, c: &EdgeCollapse) -> bool {
        if self.alive_vertices <= 4 {
            return false;
        }

        let n1 = self.neighbors(c.v1);
        let n2 = self.neighbors(c.v2);
        let shared_faces = self
            .live_faces(c.v1)
            .filter(|&f| self.faces[f as usize].contains(&c.v2))
            .count();
        if n1.intersection(&n2).count() > shared_faces {
            return false;
        }

        if !self.params.prevent_flips {
            return true;
        }
        for v in [c.v1, c.v2] {
            for f in self.live_faces(v) {
                let face = self.faces[f as usize];
                if face.contains(&c.v1) && face.contains(&c.v2) {
                    continue;
                }
                let before = face.map(|i| self.positions[i as usize]);
                let after = face.map(|i| {
                    if i == c.v1 || i == c.v2 {
                        c.target
                    } else {
                        self.positions[i as usize]
                    }
                });
                let nb = (before[1] - before[0]).cross(&(before[2] - before[0]));
                let na = (after[1] - after[0]).cross(&(after[2] - after[0]));
                if na.norm_squared() < 1e-24 || nb.dot(&na) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    /// Merge `v2` into `v1`. Returns the number of faces removed.
    fn collapse(&mut self, c: &EdgeCollapse) -> usize {
        let (v1, v2) = (c.v1, c.v2);
        let mut removed = 0;

        let v2_faces = std::mem::take(&mut self.vertex_faces[v2 as usize]);
        for f in v2_faces {
            if !self.face_alive[f as usize] {
                continue;
            }
            let face = &mut self.faces[f as usize];
            if face.contains(&v1) {
                self.face_alive[f as usize] = false;
                removed += 1;
            } else {
                for idx in face.iter_mut() {
                    if *idx == v2 {
                        *idx = v1;
                    }
                }
                self.vertex_faces[v1 as usize].push(f);
            }
        }

        let face_alive = &self.face_alive;
        self.vertex_faces[v1 as usize].retain(|&f| face_alive[f as usize]);

        let q2 = self.quadrics[v2 as usize];
        self.quadrics[v1 as usize].add(&q2);
        self.positions[v1 as usize] = c.target;
        self.boundary[v1 as usize] |= self.boundary[v2 as usize];
        self.alive[v2 as usize] = false;
        self.alive_vertices -= 1;
        self.version[v1 as usize] += 1;
        self.version[v2 as usize] += 1;

        removed
    }

    fn is_current(&self, c: &EdgeCollapse) -> bool {
        self.alive[c.v1 as usize]
            && self.alive[c.v2 as usize]
            && (self.version[c.v1 as usize], self.version[c.v2 as usize]) == c.stamp
    }

    fn into_mesh(self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut mesh = Mesh::new();
        for (i, p) in self.positions.iter().enumerate() {
            if self.alive[i] {
                remap[i] = mesh.vertices.len() as u32;
                mesh.vertices.push(Vertex::new(*p));
            }
        }
        for (f, face) in self.faces.iter().enumerate() {
            if self.face_alive[f] {
                mesh.faces.push(face.map(|i| remap[i as usize]));
            }
        }
        // Vertices whose faces all collapsed away
        mesh.remove_unreferenced_vertices();
        mesh
    }
}

/// Decimate a mesh using edge collapse with quadric error metrics.
///
/// ```
/// use nii_mesh::{DecimateParams, Mesh, Vertex, decimate_mesh};
///
/// let mut mesh = Mesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.5, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// let result = decimate_mesh(&mesh, &DecimateParams::with_target_ratio(0.5));
/// assert_eq!(result.original_triangles, 1);
/// ```
pub fn decimate_mesh(mesh: &Mesh, params: &DecimateParams) -> DecimateResult {
    let _timer = OperationTimer::with_mesh("decimate", mesh);
    let original_triangles = mesh.face_count();

    let target = params
        .target_triangles
        .unwrap_or_else(|| ((original_triangles as f64) * params.target_ratio).ceil() as usize);

    if original_triangles == 0 || original_triangles <= target {
        return DecimateResult {
            mesh: mesh.clone(),
            original_triangles,
            final_triangles: original_triangles,
            collapses_performed: 0,
            collapses_rejected: 0,
        };
    }

    let mut state = Collapser::new(mesh, params);

    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        for i in 0..3 {
            let (a, b) = normalize_edge(face[i], face[(i + 1) % 3]);
            if seen.insert((a, b))
                && let Some(c) = state.candidate(a, b)
            {
                heap.push(c);
            }
        }
    }
    drop(seen);

    let mut active_faces = original_triangles;
    let mut collapses_performed = 0;
    let mut collapses_rejected = 0;

    while active_faces > target {
        let Some(collapse) = heap.pop() else {
            break;
        };
        if !state.is_current(&collapse) {
            continue;
        }
        if let Some(max_error) = params.max_error
            && collapse.cost > max_error
        {
            // Every remaining candidate costs at least as much
            break;
        }
        if !state.is_valid(&collapse) {
            collapses_rejected += 1;
            continue;
        }

        active_faces -= state.collapse(&collapse);
        collapses_performed += 1;

        let v1 = collapse.v1;
        for n in state.neighbors(v1) {
            if let Some(c) = state.candidate(v1, n) {
                heap.push(c);
            }
        }
    }

    let result_mesh = state.into_mesh();
    info!(
        "Decimated {} -> {} faces ({} collapses, {} rejected)",
        original_triangles,
        result_mesh.face_count(),
        collapses_performed,
        collapses_rejected
    );

    DecimateResult {
        final_triangles: result_mesh.face_count(),
        mesh: result_mesh,
        original_triangles,
        collapses_performed,
        collapses_rejected,
    }
}

// ============================================================================
// Vertex clustering
// ============================================================================

/// Parameters for vertex clustering.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// Cell size as a percentage of the bounding-box diagonal. Default: 1.0
    pub cell_percent: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self { cell_percent: 1.0 }
    }
}

impl ClusterParams {
    /// Cell size as `percent` of the bounding-box diagonal.
    pub fn with_percent(percent: f64) -> Self {
        Self {
            cell_percent: percent,
        }
    }
}

/// Result of vertex clustering.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// The clustered mesh.
    pub mesh: Mesh,
    /// Number of triangles before clustering.
    pub original_triangles: usize,
    /// Number of triangles after clustering.
    pub final_triangles: usize,
    /// Edge length of one grid cell.
    pub cell_size: f64,
}

/// Merge all vertices falling into the same grid cell into their centroid.
///
/// Faces that become degenerate are removed, as are duplicates of an
/// already kept face.
pub fn cluster_vertices(mesh: &Mesh, params: &ClusterParams) -> MeshResult<ClusterResult> {
    let _timer = OperationTimer::with_mesh("cluster_vertices", mesh);
    let original_triangles = mesh.face_count();

    if !(params.cell_percent.is_finite() && params.cell_percent > 0.0) {
        return Err(MeshError::invalid_parameter(
            "cell_percent",
            format!("must be > 0, got {}", params.cell_percent),
        ));
    }

    let Some((min, _)) = mesh.bounds() else {
        return Ok(ClusterResult {
            mesh: mesh.clone(),
            original_triangles,
            final_triangles: original_triangles,
            cell_size: 0.0,
        });
    };
    let cell_size = mesh.bounds_diagonal() * params.cell_percent / 100.0;
    if cell_size <= 0.0 {
        return Ok(ClusterResult {
            mesh: mesh.clone(),
            original_triangles,
            final_triangles: original_triangles,
            cell_size,
        });
    }

    let mut cells: HashMap<[i64; 3], u32> = HashMap::new();
    let mut sums: Vec<(Vector3<f64>, usize)> = Vec::new();
    let mut remap = Vec::with_capacity(mesh.vertex_count());

    for v in &mesh.vertices {
        let rel = (v.position - min) / cell_size;
        let key = [rel.x, rel.y, rel.z].map(|c| c.floor() as i64);
        let id = *cells.entry(key).or_insert_with(|| {
            sums.push((Vector3::zeros(), 0));
            (sums.len() - 1) as u32
        });
        sums[id as usize].0 += v.position.coords;
        sums[id as usize].1 += 1;
        remap.push(id);
    }

    let mut out = Mesh::with_capacity(sums.len(), mesh.face_count());
    out.vertices.extend(
        sums.iter()
            .map(|(sum, n)| Vertex::new(Point3::from(sum / *n as f64))),
    );

    let mut kept = HashSet::new();
    for face in &mesh.faces {
        let f = face.map(|i| remap[i as usize]);
        if f[0] == f[1] || f[1] == f[2] || f[0] == f[2] {
            continue;
        }
        let mut key = f;
        key.sort_unstable();
        if kept.insert(key) {
            out.faces.push(f);
        }
    }
    out.remove_unreferenced_vertices();

    debug!(
        "Clustering with cell {:.4}: {} -> {} vertices",
        cell_size,
        mesh.vertex_count(),
        out.vertex_count()
    );
    info!(
        "Clustered {} -> {} faces",
        original_triangles,
        out.face_count()
    );

    Ok(ClusterResult {
        final_triangles: out.face_count(),
        mesh: out,
        original_triangles,
        cell_size,
    })
}
