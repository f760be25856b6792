//! Mesh file I/O for STL, OBJ, PLY and legacy VTK.
//!
//! STL, OBJ and PLY can be read and written. VTK legacy polydata is
//! write-only.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::log_io_operation;
use crate::{Mesh, Vertex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Stl,
    Obj,
    Ply,
    Vtk,
}

impl MeshFormat {
    /// All formats, in the order they are listed to users.
    pub const ALL: [MeshFormat; 4] = [
        MeshFormat::Stl,
        MeshFormat::Obj,
        MeshFormat::Ply,
        MeshFormat::Vtk,
    ];

    /// Parse a bare extension (`"stl"`, `".OBJ"`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "stl" => Some(MeshFormat::Stl),
            "obj" => Some(MeshFormat::Obj),
            "ply" => Some(MeshFormat::Ply),
            "vtk" => Some(MeshFormat::Vtk),
            _ => None,
        }
    }

    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
            MeshFormat::Ply => "ply",
            MeshFormat::Vtk => "vtk",
        }
    }

    /// Whether [`load_mesh`] can read this format.
    pub fn is_readable(&self) -> bool {
        !matches!(self, MeshFormat::Vtk)
    }
}

impl std::fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

fn unsupported(path: &Path) -> MeshError {
    MeshError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
}

/// Load a mesh from file, auto-detecting format from extension.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = MeshFormat::from_path(path)
        .filter(MeshFormat::is_readable)
        .ok_or_else(|| unsupported(path))?;

    info!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Ply => load_ply(path)?,
        MeshFormat::Vtk => return Err(unsupported(path)),
    };

    if mesh.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "{} has no vertices or faces",
            path.display()
        )));
    }

    let vertex_count = mesh.vertex_count();
    if let Some((face_idx, bad)) = mesh.faces.iter().enumerate().find_map(|(i, f)| {
        f.iter()
            .find(|&&v| v as usize >= vertex_count)
            .map(|&v| (i, v))
    }) {
        return Err(MeshError::parse_error(
            path,
            format!(
                "face {} references vertex {}, but mesh only has {} vertices",
                face_idx, bad, vertex_count
            ),
        ));
    }

    if let Some((min, max)) = mesh.bounds() {
        debug!(
            "Bounding box: [{:.1}, {:.1}, {:.1}] to [{:.1}, {:.1}, {:.1}]",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    info!(
        "Loaded mesh: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );

    Ok(mesh)
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    // read_stl merges coincident vertices into an indexed mesh
    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices.push(Vertex::from_coords(
            v.0[0] as f64,
            v.0[1] as f64,
            v.0[2] as f64,
        ));
    }

    let mut degenerate = 0usize;
    for face in &stl.faces {
        let [a, b, c] = face.vertices.map(|i| i as u32);
        if a != b && b != c && a != c {
            mesh.faces.push([a, b, c]);
        } else {
            degenerate += 1;
        }
    }
    if degenerate > 0 {
        warn!("Skipped {} degenerate STL triangles", degenerate);
    }

    Ok(mesh)
}

/// Load mesh from OBJ file, merging all models.
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::new();
    for model in &models {
        let offset = mesh.vertices.len() as u32;
        let obj_mesh = &model.mesh;

        mesh.vertices.extend(
            obj_mesh
                .positions
                .chunks_exact(3)
                .map(|p| Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64)),
        );
        mesh.faces.extend(
            obj_mesh
                .indices
                .chunks_exact(3)
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }

    debug!("OBJ merged {} models", models.len());
    Ok(mesh)
}

/// Load mesh from PLY file (ASCII or binary).
fn load_ply(path: &Path) -> MeshResult<Mesh> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::Property;

    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| MeshError::parse_error(path, format!("PLY parse error: {:?}", e)))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for element in vertices {
            let x = ply_float(element.get("x"), "x", path)?;
            let y = ply_float(element.get("y"), "y", path)?;
            let z = ply_float(element.get("z"), "z", path)?;
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for element in faces {
            let indices: Vec<u32> = match element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
            {
                Some(Property::ListInt(l)) => l.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUInt(l)) => l.clone(),
                Some(Property::ListUChar(l)) => l.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUShort(l)) => l.iter().map(|&i| i as u32).collect(),
                _ => continue,
            };
            // Fan triangulation for polygons
            for i in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    Ok(mesh)
}

fn ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> MeshResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(MeshError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

/// Save mesh to file, auto-detecting format from extension.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let format = MeshFormat::from_path(path).ok_or_else(|| unsupported(path))?;
    save_mesh_as(mesh, path, format)
}

/// Save mesh to `path` in an explicit format, regardless of extension.
pub fn save_mesh_as(mesh: &Mesh, path: &Path, format: MeshFormat) -> MeshResult<()> {
    match format {
        MeshFormat::Stl => save_stl(mesh, path)?,
        MeshFormat::Obj => write_text(path, |w| write_obj(mesh, w))?,
        MeshFormat::Ply => save_ply(mesh, path)?,
        MeshFormat::Vtk => write_text(path, |w| write_vtk(mesh, w))?,
    }

    debug!(
        "Saved {} vertices and {} faces to {:?}",
        mesh.vertex_count(),
        mesh.face_count(),
        path
    );
    log_io_operation("save", path, Some(format.extension()));
    Ok(())
}

fn write_text<F>(path: &Path, body: F) -> MeshResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

/// Save mesh to STL file (binary format).
pub fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal().unwrap_or_else(nalgebra::Vector3::zeros);
            let v = |p: nalgebra::Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [v(tri.v0), v(tri.v1), v(tri.v2)],
            }
        })
        .collect();

    stl_io::write_stl(&mut writer, triangles.iter())
        .and_then(|()| writer.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

/// Write OBJ text (1-based indices).
fn write_obj<W: Write>(mesh: &Mesh, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# nii-mesh")?;
    writeln!(w, "# Vertices: {}", mesh.vertex_count())?;
    writeln!(w, "# Faces: {}", mesh.face_count())?;

    let has_normals = mesh.vertices.iter().all(|v| v.normal.is_some()) && !mesh.vertices.is_empty();

    for v in &mesh.vertices {
        writeln!(w, "v {:.6} {:.6} {:.6}", v.position.x, v.position.y, v.position.z)?;
    }
    if has_normals {
        for n in mesh.vertices.iter().filter_map(|v| v.normal) {
            writeln!(w, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }
    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if has_normals {
            writeln!(w, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(w, "f {a} {b} {c}")?;
        }
    }
    Ok(())
}

/// Write legacy VTK ASCII polydata.
fn write_vtk<W: Write>(mesh: &Mesh, w: &mut W) -> std::io::Result<()> {
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "nii-mesh surface")?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET POLYDATA")?;
    writeln!(w, "POINTS {} float", mesh.vertex_count())?;
    for v in &mesh.vertices {
        writeln!(w, "{} {} {}", v.position.x as f32, v.position.y as f32, v.position.z as f32)?;
    }
    writeln!(w, "POLYGONS {} {}", mesh.face_count(), mesh.face_count() * 4)?;
    for [a, b, c] in &mesh.faces {
        writeln!(w, "3 {a} {b} {c}")?;
    }
    Ok(())
}

/// Save mesh to ASCII PLY file.
pub fn save_ply(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    let to_io = |details: String| MeshError::io_write(path, std::io::Error::other(details));

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            axis.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    ply.header.elements.add(face_def);

    let vertices: Vec<DefaultElement> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(v.position.x as f32));
            element.insert("y".to_string(), Property::Float(v.position.y as f32));
            element.insert("z".to_string(), Property::Float(v.position.z as f32));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces: Vec<DefaultElement> = mesh
        .faces
        .iter()
        .map(|f| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(f.iter().map(|&i| i as i32).collect()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    // Header element counts come from the payload
    ply.make_consistent()
        .map_err(|e| to_io(format!("PLY consistency error: {:?}", e)))?;

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| to_io(format!("PLY write error: {:?}", e)))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::make_unit_cube;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(MeshFormat::from_extension("STL"), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_extension(".obj"), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_extension("vtk"), Some(MeshFormat::Vtk));
        assert_eq!(MeshFormat::from_extension("3mf"), None);
        assert_eq!(
            MeshFormat::from_path(Path::new("/a/b/brain.PLY")),
            Some(MeshFormat::Ply)
        );
        assert_eq!(MeshFormat::Obj.extension(), "obj");
    }

    #[test]
    fn test_stl_roundtrip_preserves_volume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        let mesh = make_unit_cube();

        save_mesh(&mesh, &path).unwrap();
        let loaded = load_mesh(&path).unwrap();

        assert_eq!(loaded.face_count(), 12);
        assert_eq!(loaded.vertex_count(), 8);
        assert!((loaded.volume() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_obj_and_ply_load_back() {
        let dir = tempdir().unwrap();
        let mesh = make_unit_cube();
        for name in ["cube.obj", "cube.ply"] {
            let path = dir.path().join(name);
            save_mesh(&mesh, &path).unwrap();
            let loaded = load_mesh(&path).unwrap();
            assert_eq!(loaded.face_count(), 12, "{name}");
            assert!((loaded.signed_volume() - 1.0).abs() < 1e-5, "{name}");
        }
    }

    #[test]
    fn test_vtk_is_write_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.vtk");
        save_mesh(&make_unit_cube(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# vtk DataFile Version 3.0"));
        assert!(text.contains("POINTS 8 float"));
        assert!(text.contains("POLYGONS 12 48"));

        let err = load_mesh(&path).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = save_mesh(&make_unit_cube(), Path::new("cube.3mf")).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { extension: Some(ref e) } if e == "3mf"));
    }

    #[test]
    fn test_obj_minimal_and_empty_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert!(load_mesh(&path).is_ok());

        let empty = dir.path().join("empty.obj");
        std::fs::write(&empty, "# nothing\n").unwrap();
        assert!(matches!(
            load_mesh(&empty).unwrap_err(),
            MeshError::EmptyMesh { .. } | MeshError::ParseError { .. }
        ));
    }
}
