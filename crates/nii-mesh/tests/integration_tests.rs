//! End-to-end tests for nii-mesh.
//!
//! These write small label maps to disk as NIFTI-1 files and run the full
//! generation path: load -> mask -> isosurface -> simplify/smooth -> save ->
//! report/screenshot.

use std::fs;
use std::path::{Path, PathBuf};

use nii_mesh::{
    Backend, FolderParams, GenerateParams, LabelMap, MeshError, MeshFormat, MeshGenerator,
    RenderParams, ScreenshotOptions, SimplifyMethod, SmoothMethod, generate_from_nii, load_mesh,
    scan_folder,
};
use tempfile::tempdir;

// =============================================================================
// Fixtures
// =============================================================================

/// Write an uncompressed single-file NIFTI-1 volume with uint8 voxels
/// (x fastest).
fn write_nifti(path: &Path, dims: [usize; 3], spacing: [f32; 3], data: &[u8]) {
    assert_eq!(data.len(), dims.iter().product::<usize>());
    let mut header = [0u8; 348];

    header[0..4].copy_from_slice(&348i32.to_le_bytes());
    let dim: [i16; 8] = [3, dims[0] as i16, dims[1] as i16, dims[2] as i16, 1, 1, 1, 1];
    for (i, d) in dim.iter().enumerate() {
        header[40 + i * 2..42 + i * 2].copy_from_slice(&d.to_le_bytes());
    }
    // datatype UINT8, 8 bits per voxel
    header[70..72].copy_from_slice(&2i16.to_le_bytes());
    header[72..74].copy_from_slice(&8i16.to_le_bytes());
    let pixdim: [f32; 8] = [1.0, spacing[0], spacing[1], spacing[2], 1.0, 1.0, 1.0, 1.0];
    for (i, p) in pixdim.iter().enumerate() {
        header[76 + i * 4..80 + i * 4].copy_from_slice(&p.to_le_bytes());
    }
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[344..348].copy_from_slice(b"n+1\0");

    let mut bytes = header.to_vec();
    bytes.extend_from_slice(&[0u8; 4]);
    bytes.extend_from_slice(data);
    fs::write(path, bytes).unwrap();
}

/// Two labelled boxes in a 12x10x8 grid: label 1 is 4x4x4 voxels, label 2
/// is 3x2x2 voxels.
fn write_two_labels(dir: &Path, spacing: [f32; 3]) -> PathBuf {
    let dims = [12, 10, 8];
    let mut data = vec![0u8; dims.iter().product()];
    let mut fill = |min: [usize; 3], max: [usize; 3], label: u8| {
        for z in min[2]..max[2] {
            for y in min[1]..max[1] {
                for x in min[0]..max[0] {
                    data[x + dims[0] * (y + dims[1] * z)] = label;
                }
            }
        }
    };
    fill([2, 2, 2], [6, 6, 6], 1);
    fill([7, 3, 3], [10, 5, 5], 2);

    let path = dir.join("thigh.nii");
    write_nifti(&path, dims, spacing, &data);
    path
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_label_map_from_nifti() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [0.5, 0.5, 2.0]);

    let map = LabelMap::load(&input).unwrap();
    assert_eq!(map.dims(), [12, 10, 8]);
    assert_eq!(map.spacing(), [0.5, 0.5, 2.0]);
    assert_eq!(map.labels(), vec![1, 2]);
    assert_eq!(map.get(2, 2, 2), Some(1.0));
    assert_eq!(map.get(7, 3, 3), Some(2.0));
    assert_eq!(map.foreground_voxels(), 64 + 12);
    assert!((map.foreground_volume() - 76.0 * 0.5).abs() < 1e-9);
}

// =============================================================================
// Native backend
// =============================================================================

#[test]
fn test_native_generation_with_report() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
    let out = dir.path().join("meshes");

    let result = MeshGenerator::new()
        .label(1)
        .out_dir(&out)
        .report(true)
        .run(&input)
        .unwrap();

    assert_eq!(result.mesh_path, out.join("thigh_native.obj"));
    assert!(result.mesh_path.is_file());

    let stats = result.stats.as_ref().unwrap();
    assert!(stats.is_watertight);
    assert!(!stats.is_inside_out);

    // Marching cubes at 0.5 cuts the box corners: a bit under 64 mm^3
    let volumes = result.volumes.unwrap();
    assert!((volumes.label_volume - 0.064).abs() < 1e-12);
    assert!(volumes.mesh_volume < volumes.label_volume);
    assert!(volumes.mesh_volume > 0.8 * volumes.label_volume);
    assert!(volumes.error_percent.unwrap() < 20.0);

    let report = result.report_path.unwrap();
    assert_eq!(report, out.join("thigh_native_info.txt"));
    let text = fs::read_to_string(&report).unwrap();
    assert!(text.starts_with("Mesh file\t: thigh_native.obj"));
    assert!(text.contains("Nifti file\t: thigh.nii"));
    assert!(text.contains("backend\t: native"));

    let reloaded = load_mesh(&result.mesh_path).unwrap();
    assert_eq!(reloaded.face_count(), stats.faces);
}

#[test]
fn test_native_generation_never_overwrites() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
    let params = GenerateParams {
        out_dir: dir.path().to_path_buf(),
        format: MeshFormat::Stl,
        ..Default::default()
    };

    let first = generate_from_nii(&input, &params).unwrap();
    let second = generate_from_nii(&input, &params).unwrap();
    let third = generate_from_nii(&input, &params).unwrap();

    assert_eq!(first.mesh_path, dir.path().join("thigh_native.stl"));
    assert_eq!(second.mesh_path, dir.path().join("thigh_native_1.stl"));
    assert_eq!(third.mesh_path, dir.path().join("thigh_native_2.stl"));
}

#[test]
fn test_simplify_and_smooth_reduce_faces() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);

    let plain = MeshGenerator::new()
        .label(1)
        .out_dir(dir.path())
        .run(&input)
        .unwrap();
    let processed = MeshGenerator::new()
        .label(1)
        .simplify(SimplifyMethod::QuadricCollapse, Some(50.0))
        .smooth(SmoothMethod::Taubin, Some(5.0))
        .out_dir(dir.path())
        .run(&input)
        .unwrap();

    assert_eq!(
        processed.mesh_path,
        dir.path().join("thigh_native_edqe50_tau5.obj")
    );
    let plain_faces = plain.stats.unwrap().faces;
    let processed_faces = processed.stats.unwrap().faces;
    assert!(processed_faces < plain_faces);
    assert!(processed.operation_log.iter().any(|l| l.contains("Taubin")));
}

#[test]
fn test_grid_scale_overrides_spacing() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);

    let result = MeshGenerator::new()
        .label(2)
        .grid_scale([0.55, 0.55, 0.55])
        .out_dir(dir.path())
        .run(&input)
        .unwrap();

    let expected = 12.0 * 0.55f64.powi(3) / 1000.0;
    assert!((result.volumes.unwrap().label_volume - expected).abs() < 1e-12);
    let stats = result.stats.unwrap();
    // Label 2 sits at x in [7, 10) voxels
    assert!(stats.bounds_max[0] < 10.0 * 0.55 + 1e-9);
}

#[test]
fn test_missing_label_is_an_error() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);

    let err = MeshGenerator::new()
        .label(9)
        .out_dir(dir.path())
        .run(&input)
        .unwrap_err();
    assert!(matches!(err, MeshError::EmptyIsosurface { .. }));
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempdir().unwrap();
    let err = generate_from_nii(&dir.path().join("absent.nii.gz"), &GenerateParams::default())
        .unwrap_err();
    assert!(matches!(err, MeshError::IoRead { .. }));
}

// =============================================================================
// Raw backend
// =============================================================================

#[test]
fn test_raw_backend_ignores_processing() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [2.0, 1.0, 1.0]);

    let raw = MeshGenerator::new()
        .backend(Backend::Raw)
        .label(1)
        .simplify(SimplifyMethod::QuadricCollapse, Some(10.0))
        .smooth(SmoothMethod::Laplacian, Some(20.0))
        .grid_scale([5.0, 5.0, 5.0])
        .out_dir(dir.path())
        .report(true)
        .run(&input)
        .unwrap();
    let native = MeshGenerator::new()
        .label(1)
        .out_dir(dir.path())
        .run(&input)
        .unwrap();

    assert_eq!(raw.mesh_path, dir.path().join("thigh_raw.obj"));
    assert_eq!(raw.stats.as_ref().unwrap().faces, native.stats.unwrap().faces);
    // Header spacing, not the grid scale
    assert!((raw.volumes.unwrap().label_volume - 0.128).abs() < 1e-12);

    let text = fs::read_to_string(raw.report_path.unwrap()).unwrap();
    assert!(text.contains("smoothing\t: none"));
    assert!(text.contains("simplify\t: none"));
}

// =============================================================================
// Screenshots and folders
// =============================================================================

#[test]
fn test_screenshot_during_generation_and_folder_scan() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
    let meshes = dir.path().join("meshes");
    let pictures = dir.path().join("pictures");

    let mut shots = ScreenshotOptions::new(&pictures);
    shots.params = RenderParams::default().with_size(64, 48);

    let result = MeshGenerator::new()
        .out_dir(&meshes)
        .format(MeshFormat::Ply)
        .screenshot(shots)
        .run(&input)
        .unwrap();
    let png = result.screenshot_path.unwrap();
    assert_eq!(png, pictures.join("thigh_native.ply.png"));
    assert!(png.is_file());

    MeshGenerator::new()
        .label(2)
        .out_dir(&meshes)
        .run(&input)
        .unwrap();

    let summary = scan_folder(&meshes, &FolderParams::default()).unwrap();
    let names: Vec<&str> = summary.entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["thigh_native.obj", "thigh_native.ply"]);
    assert!(summary.entries.iter().all(|e| e.volume > 0.0));
    assert_eq!(
        summary.total_bytes(),
        summary.entries.iter().map(|e| e.size_bytes).sum::<u64>()
    );
}

// =============================================================================
// nii2mesh backend
// =============================================================================

#[test]
fn test_nii2mesh_missing_executable() {
    let dir = tempdir().unwrap();
    let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);

    let err = MeshGenerator::new()
        .backend(Backend::Nii2mesh)
        .nii2mesh_executable(dir.path().join("no-such-nii2mesh"))
        .staging_dir(dir.path().join("stage"))
        .out_dir(dir.path())
        .run(&input)
        .unwrap_err();
    assert!(matches!(err, MeshError::ExternalToolNotFound { .. }));
    assert_eq!(err.code().as_str(), "NIIM-5001");
}

#[cfg(unix)]
mod fake_nii2mesh {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in executable that writes a tetrahedron to its last argument
    /// and records its arguments.
    fn install(dir: &Path) -> PathBuf {
        let script = dir.join("nii2mesh");
        fs::write(
            &script,
            r#"#!/bin/sh
for last; do :; done
echo "$@" > "$(dirname "$0")/args.txt"
cat > "$last" <<'EOF'
v 0 0 0
v 10 0 0
v 0 10 0
v 0 0 10
f 1 3 2
f 1 2 4
f 1 4 3
f 2 3 4
EOF
"#,
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn test_nii2mesh_output_is_moved_and_measured() {
        let dir = tempdir().unwrap();
        let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        let exe = install(&tools);
        let out = dir.path().join("out");

        let result = MeshGenerator::new()
            .backend(Backend::Nii2mesh)
            .smooth(SmoothMethod::None, Some(1.0))
            .simplify(SimplifyMethod::None, Some(25.0))
            .nii2mesh_executable(&exe)
            .staging_dir(dir.path().join("stage"))
            .out_dir(&out)
            .report(true)
            .run(&input)
            .unwrap();

        assert_eq!(result.mesh_path, out.join("thigh_nii2mesh_s1_r0.25.obj"));
        assert!(result.mesh_path.is_file());
        // Nothing left behind in the staging directory
        assert_eq!(fs::read_dir(dir.path().join("stage")).unwrap().count(), 0);

        let args = fs::read_to_string(tools.join("args.txt")).unwrap();
        assert!(args.starts_with("-s 1 -r 0.25 "));

        let stats = result.stats.unwrap();
        assert_eq!(stats.faces, 4);
        assert!((stats.volume - 1000.0 / 6.0).abs() < 1e-9);

        let text = fs::read_to_string(result.report_path.unwrap()).unwrap();
        assert!(text.contains("backend\t: nii2mesh"));
        assert!(text.contains("simplify\t: reduction"));
        assert!(text.contains("simply_val\t: 0.25"));
    }

    #[test]
    fn test_nii2mesh_compares_against_every_label() {
        let dir = tempdir().unwrap();
        let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
        let exe = install(dir.path());

        // A label cannot be passed on, so it is refused before the tool runs
        let err = MeshGenerator::new()
            .backend(Backend::Nii2mesh)
            .label(1)
            .nii2mesh_executable(&exe)
            .out_dir(dir.path())
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidParameter { ref name, .. } if name == "label"));
        assert!(!dir.path().join("args.txt").exists());

        let result = MeshGenerator::new()
            .backend(Backend::Nii2mesh)
            .nii2mesh_executable(&exe)
            .out_dir(dir.path())
            .run(&input)
            .unwrap();
        // 64 voxels of label 1 plus 12 of label 2
        let volumes = result.volumes.unwrap();
        assert!((volumes.label_volume - 0.076).abs() < 1e-12);
    }

    #[test]
    fn test_nii2mesh_failure_reports_stderr() {
        let dir = tempdir().unwrap();
        let input = write_two_labels(dir.path(), [1.0, 1.0, 1.0]);
        let script = dir.path().join("failing");
        fs::write(&script, "#!/bin/sh\necho 'unable to read volume' >&2\nexit 3\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let err = MeshGenerator::new()
            .backend(Backend::Nii2mesh)
            .nii2mesh_executable(&script)
            .staging_dir(dir.path().join("stage"))
            .out_dir(dir.path())
            .run(&input)
            .unwrap_err();
        match err {
            MeshError::ExternalToolFailed { stderr, .. } => {
                assert!(stderr.contains("unable to read volume"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
