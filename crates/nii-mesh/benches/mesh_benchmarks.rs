//! Benchmarks for nii-mesh stages.
//!
//! Run with: cargo bench -p nii-mesh
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p nii-mesh -- --save-baseline main
//! 2. After changes: cargo bench -p nii-mesh -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nii_mesh::{
    Camera, ClusterParams, DecimateParams, HcParams, IsosurfaceParams, LabelMap, Mesh,
    RenderParams, TaubinParams,
};

// =============================================================================
// Test Volume Generation
// =============================================================================

/// A solid ball of label 1 in an `n`^3 grid.
fn ball(n: usize) -> LabelMap {
    let c = (n as f64 - 1.0) / 2.0;
    let r2 = (0.4 * n as f64).powi(2);
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let d2 = (x as f64 - c).powi(2) + (y as f64 - c).powi(2) + (z as f64 - c).powi(2);
                data.push(if d2 <= r2 { 1.0 } else { 0.0 });
            }
        }
    }
    LabelMap::new([n, n, n], [1.0; 3], data).unwrap()
}

fn ball_mesh(n: usize) -> Mesh {
    nii_mesh::extract_isosurface(&ball(n), &IsosurfaceParams::default()).unwrap()
}

const SIZES: [usize; 3] = [16, 32, 64];

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_marching_cubes(c: &mut Criterion) {
    let mut group = c.benchmark_group("MarchingCubes");

    for n in SIZES {
        let map = ball(n);
        group.throughput(Throughput::Elements((n * n * n) as u64));
        group.bench_with_input(BenchmarkId::new("ball", n), &map, |b, map| {
            b.iter(|| nii_mesh::extract_isosurface(black_box(map), &IsosurfaceParams::default()))
        });
    }

    group.finish();
}

fn bench_simplification(c: &mut Criterion) {
    let mut group = c.benchmark_group("Simplification");
    group.sample_size(20);

    for n in [16, 32] {
        let mesh = ball_mesh(n);
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));

        let params = DecimateParams::with_target_percent(50.0);
        group.bench_with_input(BenchmarkId::new("quadric_50", n), &mesh, |b, mesh| {
            b.iter(|| nii_mesh::decimate_mesh(black_box(mesh), black_box(&params)))
        });

        let params = DecimateParams::for_marching_cubes();
        group.bench_with_input(BenchmarkId::new("mc_collapse", n), &mesh, |b, mesh| {
            b.iter(|| nii_mesh::decimate_mesh(black_box(mesh), black_box(&params)))
        });

        let params = ClusterParams::with_percent(2.0);
        group.bench_with_input(BenchmarkId::new("clustering_2", n), &mesh, |b, mesh| {
            b.iter(|| nii_mesh::cluster_vertices(black_box(mesh), black_box(&params)))
        });
    }

    group.finish();
}

fn bench_smoothing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Smoothing");

    for n in [16, 32] {
        let mesh = ball_mesh(n);
        group.throughput(Throughput::Elements(mesh.vertices.len() as u64));

        group.bench_with_input(BenchmarkId::new("laplacian_3", n), &mesh, |b, mesh| {
            b.iter(|| {
                let mut m = mesh.clone();
                nii_mesh::laplacian_smooth(&mut m, 3)
            })
        });
        group.bench_with_input(BenchmarkId::new("taubin_10", n), &mesh, |b, mesh| {
            b.iter(|| {
                let mut m = mesh.clone();
                nii_mesh::taubin_smooth(&mut m, &TaubinParams::default())
            })
        });
        group.bench_with_input(BenchmarkId::new("hc_1", n), &mesh, |b, mesh| {
            b.iter(|| {
                let mut m = mesh.clone();
                nii_mesh::hc_laplacian_smooth(&mut m, &HcParams::default())
            })
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("Render");
    group.sample_size(20);

    let mesh = ball_mesh(32);
    let (min, max) = mesh.bounds().unwrap();
    let camera = Camera::fit_bounds(min, max);
    let params = RenderParams::default();

    group.bench_function("ball_800x600", |b| {
        b.iter(|| nii_mesh::render_mesh(black_box(&mesh), &camera, &params))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_marching_cubes,
    bench_simplification,
    bench_smoothing,
    bench_render,
);

criterion_main!(benches);
