//! Edge and vertex adjacency for indexed triangle meshes.

use std::collections::HashMap;

use crate::Mesh;

/// Adjacency tables built once from a mesh's faces.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    /// Undirected edge (smaller index first) to the faces that use it.
    pub edge_to_faces: HashMap<(u32, u32), Vec<u32>>,

    /// Faces incident to each vertex.
    pub vertex_to_faces: Vec<Vec<u32>>,

    /// Sorted, deduplicated one-ring neighbours of each vertex.
    pub vertex_neighbors: Vec<Vec<u32>>,
}

/// Normalize an edge so the smaller index comes first.
#[inline]
pub fn normalize_edge(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

impl MeshAdjacency {
    /// Build adjacency for `mesh`.
    pub fn build(mesh: &Mesh) -> Self {
        let n = mesh.vertex_count();
        let mut edge_to_faces: HashMap<(u32, u32), Vec<u32>> =
            HashMap::with_capacity(mesh.face_count() * 3 / 2);
        let mut vertex_to_faces = vec![Vec::new(); n];
        let mut vertex_neighbors = vec![Vec::new(); n];

        for (fi, face) in mesh.faces.iter().enumerate() {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                edge_to_faces
                    .entry(normalize_edge(a, b))
                    .or_default()
                    .push(fi as u32);
                vertex_to_faces[a as usize].push(fi as u32);
                vertex_neighbors[a as usize].push(b);
                vertex_neighbors[b as usize].push(a);
            }
        }

        for ring in &mut vertex_neighbors {
            ring.sort_unstable();
            ring.dedup();
        }

        Self {
            edge_to_faces,
            vertex_to_faces,
            vertex_neighbors,
        }
    }

    /// Edges used by exactly one face.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.edge_to_faces
            .iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Whether the edge `(a, b)` is used by exactly one face.
    pub fn is_boundary_edge(&self, a: u32, b: u32) -> bool {
        self.edge_to_faces
            .get(&normalize_edge(a, b))
            .is_some_and(|faces| faces.len() == 1)
    }

    /// Per-vertex flag: true when the vertex touches a boundary edge.
    pub fn boundary_vertices(&self) -> Vec<bool> {
        let mut flags = vec![false; self.vertex_to_faces.len()];
        for (a, b) in self.boundary_edges() {
            flags[a as usize] = true;
            flags[b as usize] = true;
        }
        flags
    }

    /// Number of edges used by exactly one face.
    pub fn boundary_edge_count(&self) -> usize {
        self.boundary_edges().count()
    }

    /// Number of edges used by more than two faces.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edge_to_faces.values().filter(|f| f.len() > 2).count()
    }

    /// Closed surface: every edge has exactly two faces.
    pub fn is_watertight(&self) -> bool {
        !self.edge_to_faces.is_empty() && self.edge_to_faces.values().all(|f| f.len() == 2)
    }
}
