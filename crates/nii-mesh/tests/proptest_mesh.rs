//! Property-based tests for mesh generation.
//!
//! Random voxel masks go through marching cubes and the post-processing
//! steps; the invariants below must hold for every mask.
//!
//! Run with: cargo test -p nii-mesh -- proptest

use std::collections::HashMap;
use std::fs;

use nii_mesh::{
    ClusterParams, DecimateParams, HcParams, IsosurfaceParams, LabelMap, Mesh, TaubinParams,
    cluster_vertices, decimate_mesh, extract_isosurface, hc_laplacian_smooth, laplacian_smooth,
    taubin_smooth, unique_output_path,
};
use proptest::prelude::*;
use tempfile::tempdir;

const DIMS: [usize; 3] = [6, 5, 4];

// =============================================================================
// Strategies
// =============================================================================

/// A random binary mask on a small grid with at least one voxel set.
fn arb_mask() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), DIMS.iter().product::<usize>())
        .prop_filter("mask must not be empty", |m| m.iter().any(|&v| v))
}

/// Voxel spacing in a plausible millimeter range.
fn arb_spacing() -> impl Strategy<Value = [f64; 3]> {
    prop::array::uniform3(0.2..3.0f64)
}

fn label_map(mask: &[bool], spacing: [f64; 3]) -> LabelMap {
    let data = mask.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();
    LabelMap::new(DIMS, spacing, data).unwrap()
}

fn surface(mask: &[bool], spacing: [f64; 3]) -> Mesh {
    extract_isosurface(&label_map(mask, spacing), &IsosurfaceParams::default()).unwrap()
}

/// Count of each directed edge over all faces.
fn directed_edges(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
    let mut directed = HashMap::new();
    for f in &mesh.faces {
        for i in 0..3 {
            *directed.entry((f[i], f[(i + 1) % 3])).or_default() += 1;
        }
    }
    directed
}

// =============================================================================
// Property Tests: Isosurface
// =============================================================================

proptest! {
    /// Every face index refers to an existing vertex.
    #[test]
    fn proptest_isosurface_indices_valid(mask in arb_mask(), spacing in arb_spacing()) {
        let mesh = surface(&mask, spacing);
        prop_assert!(mesh.face_count() > 0);
        let n = mesh.vertex_count() as u32;
        for face in &mesh.faces {
            prop_assert!(face.iter().all(|&i| i < n), "bad face {:?}", face);
        }
    }

    /// Every edge is shared by exactly two faces that traverse it in
    /// opposite directions.
    #[test]
    fn proptest_isosurface_closed_oriented_manifold(mask in arb_mask()) {
        let mesh = surface(&mask, [1.0; 3]);
        let directed = directed_edges(&mesh);
        for (&(a, b), &count) in &directed {
            prop_assert_eq!(count, 1, "directed edge {}->{} used {} times", a, b, count);
            prop_assert_eq!(directed.get(&(b, a)), Some(&1), "edge {}->{} is open", a, b);
        }
        prop_assert!(mesh.signed_volume() > 0.0);
    }

    /// Vertices stay within half a voxel of the grid.
    #[test]
    fn proptest_isosurface_within_grid(mask in arb_mask(), spacing in arb_spacing()) {
        let mesh = surface(&mask, spacing);
        for v in &mesh.vertices {
            for axis in 0..3 {
                let lo = -0.5 * spacing[axis] - 1e-9;
                let hi = (DIMS[axis] as f64 - 0.5) * spacing[axis] + 1e-9;
                prop_assert!(v.position[axis] >= lo && v.position[axis] <= hi);
            }
        }
    }

    /// The label-map volume is voxel count times voxel volume.
    #[test]
    fn proptest_label_volume(mask in arb_mask(), spacing in arb_spacing()) {
        let map = label_map(&mask, spacing);
        let count = mask.iter().filter(|&&v| v).count();
        prop_assert_eq!(map.foreground_voxels(), count);
        let expected = count as f64 * spacing[0] * spacing[1] * spacing[2];
        prop_assert!((map.foreground_volume() - expected).abs() < 1e-9 * expected.max(1.0));
    }
}

// =============================================================================
// Property Tests: Smoothing
// =============================================================================

proptest! {
    /// Smoothing moves vertices but never changes connectivity.
    #[test]
    fn proptest_smoothing_keeps_connectivity(
        mask in arb_mask(),
        iterations in 0usize..6,
        method in 0u8..3,
    ) {
        let original = surface(&mask, [1.0; 3]);
        let mut mesh = original.clone();
        match method {
            0 => { laplacian_smooth(&mut mesh, iterations); }
            1 => {
                taubin_smooth(&mut mesh, &TaubinParams { steps: iterations, ..Default::default() });
            }
            _ => {
                hc_laplacian_smooth(&mut mesh, &HcParams { iterations, ..Default::default() });
            }
        }

        prop_assert_eq!(&mesh.faces, &original.faces);
        prop_assert_eq!(mesh.vertex_count(), original.vertex_count());
        prop_assert!(mesh.vertices.iter().all(|v| v.position.iter().all(|c| c.is_finite())));
    }
}

// =============================================================================
// Property Tests: Simplification
// =============================================================================

proptest! {
    /// Edge collapse never adds faces.
    #[test]
    fn proptest_decimation_never_increases_faces(mask in arb_mask(), percent in 5.0..100.0f64) {
        let mesh = surface(&mask, [1.0; 3]);
        let result = decimate_mesh(&mesh, &DecimateParams::with_target_percent(percent));
        prop_assert_eq!(result.original_triangles, mesh.face_count());
        prop_assert!(result.final_triangles <= result.original_triangles);
        prop_assert_eq!(result.mesh.face_count(), result.final_triangles);
    }

    /// The zero-error collapse never adds faces either.
    #[test]
    fn proptest_mc_collapse_never_increases_faces(mask in arb_mask()) {
        let mesh = surface(&mask, [1.0; 3]);
        let result = decimate_mesh(&mesh, &DecimateParams::for_marching_cubes());
        prop_assert!(result.mesh.face_count() <= mesh.face_count());
    }

    /// Clustering never adds faces.
    #[test]
    fn proptest_clustering_never_increases_faces(mask in arb_mask(), percent in 0.5..20.0f64) {
        let mesh = surface(&mask, [1.0; 3]);
        let result = cluster_vertices(&mesh, &ClusterParams::with_percent(percent)).unwrap();
        prop_assert!(result.final_triangles <= result.original_triangles);
        prop_assert!(result.mesh.vertex_count() <= mesh.vertex_count());
    }
}

// =============================================================================
// Property Tests: Output Naming
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The chosen path never exists yet, however many files are taken.
    #[test]
    fn proptest_unique_path_never_exists(
        name in "[a-z]{1,8}",
        taken in prop::collection::vec(0usize..6, 0..6),
    ) {
        let dir = tempdir().unwrap();
        for suffix in &taken {
            let file = if *suffix == 0 {
                format!("{}.obj", name)
            } else {
                format!("{}_{}.obj", name, suffix)
            };
            fs::write(dir.path().join(file), b"").unwrap();
        }

        let path = unique_output_path(dir.path(), &name, "obj");
        prop_assert!(!path.exists());
        prop_assert_eq!(path.parent(), Some(dir.path()));
        prop_assert_eq!(path.extension().and_then(|e| e.to_str()), Some("obj"));
    }
}
