//! Offscreen screenshots.
//!
//! A small software rasterizer: perspective projection, z-buffer, and a
//! headlight with two-sided Lambert shading interpolated across faces.
//! Camera parameters follow VTK conventions so presets captured from a
//! VTK/vedo session (position, focal point, view-up, distance, clipping
//! range) reproduce the same view.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use nalgebra::{Isometry3, Perspective3, Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Mesh;
use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::OperationTimer;

/// Vertical view angle in degrees, VTK's default.
pub const DEFAULT_VIEW_ANGLE: f64 = 30.0;

const AMBIENT: f64 = 0.15;
const DIFFUSE: f64 = 0.85;

fn default_view_angle() -> f64 {
    DEFAULT_VIEW_ANGLE
}

/// A perspective camera.
///
/// `distance` of 0.0 means "derive from position and focal point"; see
/// [`Camera::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: [f64; 3],
    pub focal_point: [f64; 3],
    #[serde(alias = "viewup")]
    pub view_up: [f64; 3],
    #[serde(default)]
    pub distance: f64,
    /// Near and far clipping distances from the camera.
    pub clipping_range: [f64; 2],
    /// Vertical view angle in degrees.
    #[serde(default = "default_view_angle")]
    pub view_angle: f64,
}

/// Pitch/yaw/roll applied to the default view before fitting a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            pitch: -30.0,
            yaw: 30.0,
            roll: 0.0,
        }
    }
}

fn point(a: [f64; 3]) -> Point3<f64> {
    Point3::new(a[0], a[1], a[2])
}

fn array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

impl Camera {
    /// Camera at `position` looking at `focal_point`.
    ///
    /// Distance is derived from the two points; the clipping range spans
    /// 0.1% to 1000x of it.
    pub fn new(position: Point3<f64>, focal_point: Point3<f64>, view_up: Vector3<f64>) -> Self {
        let distance = (focal_point - position).norm();
        Self {
            position: array(&position.coords),
            focal_point: array(&focal_point.coords),
            view_up: array(&view_up),
            distance,
            clipping_range: [distance * 0.001, distance * 1000.0],
            view_angle: DEFAULT_VIEW_ANGLE,
        }
    }

    pub fn position(&self) -> Point3<f64> {
        point(self.position)
    }

    pub fn focal(&self) -> Point3<f64> {
        point(self.focal_point)
    }

    pub fn up(&self) -> Vector3<f64> {
        point(self.view_up).coords
    }

    /// Unit vector from the position toward the focal point.
    pub fn direction(&self) -> Vector3<f64> {
        (self.focal() - self.position()).normalize()
    }

    /// Move the focal point along the view direction so that it lies
    /// `distance` away from the position (VTK `SetDistance`).
    pub fn apply_distance(&mut self) {
        if self.distance > 0.0 {
            let focal = self.position() + self.direction() * self.distance;
            self.focal_point = array(&focal.coords);
        }
    }

    /// Fill in or apply the distance, then validate.
    pub fn resolve(mut self) -> MeshResult<Self> {
        if self.distance > 0.0 {
            self.apply_distance();
        } else {
            self.distance = (self.focal() - self.position()).norm();
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the camera can produce an image.
    pub fn validate(&self) -> MeshResult<()> {
        let finite = self
            .position
            .iter()
            .chain(&self.focal_point)
            .chain(&self.view_up)
            .chain(&self.clipping_range)
            .chain([&self.distance, &self.view_angle])
            .all(|v| v.is_finite());
        if !finite {
            return Err(MeshError::invalid_camera("non-finite camera parameter"));
        }

        let to_focal = self.focal() - self.position();
        if to_focal.norm() <= f64::EPSILON {
            return Err(MeshError::invalid_camera("position equals focal point"));
        }
        if self.distance <= 0.0 {
            return Err(MeshError::invalid_camera(format!(
                "distance must be > 0, got {}",
                self.distance
            )));
        }
        let [near, far] = self.clipping_range;
        if !(near > 0.0 && near < far) {
            return Err(MeshError::invalid_camera(format!(
                "clipping range must satisfy 0 < near < far, got [{}, {}]",
                near, far
            )));
        }
        if !(self.view_angle > 0.0 && self.view_angle < 180.0) {
            return Err(MeshError::invalid_camera(format!(
                "view angle must be in (0, 180), got {}",
                self.view_angle
            )));
        }
        if self.up().cross(&to_focal).norm() <= f64::EPSILON * to_focal.norm() {
            return Err(MeshError::invalid_camera(
                "view-up is parallel to the view direction",
            ));
        }
        Ok(())
    }

    /// Default VTK view (looking down -z, +y up) fitted to a bounding box.
    pub fn fit_bounds(min: Point3<f64>, max: Point3<f64>) -> Self {
        let mut camera = Self::new(
            Point3::new(0.0, 0.0, 1.0),
            Point3::origin(),
            Vector3::y(),
        );
        camera.reset_to_bounds(min, max);
        camera
    }

    /// Default view rotated by `orientation`, then fitted to the bounds.
    pub fn oriented(min: Point3<f64>, max: Point3<f64>, orientation: &Orientation) -> Self {
        let mut camera = Self::fit_bounds(min, max);
        camera.pitch(orientation.pitch);
        camera.yaw(orientation.yaw);
        camera.roll(orientation.roll);
        camera.reset_to_bounds(min, max);
        camera
    }

    /// Keep the view direction, center on the bounds and back off until
    /// the bounding sphere fits the view angle (VTK `ResetCamera`).
    pub fn reset_to_bounds(&mut self, min: Point3<f64>, max: Point3<f64>) {
        let center = nalgebra::center(&min, &max);
        let mut radius = (max - min).norm() / 2.0;
        if radius <= f64::EPSILON {
            radius = 1.0;
        }
        let direction = self.direction();
        let distance = radius / (self.view_angle.to_radians() / 2.0).sin();

        let position = center - direction * distance;
        // Keep view-up orthogonal to the direction
        let right = direction.cross(&self.up());
        let up = right.cross(&direction).normalize();

        self.position = array(&position.coords);
        self.focal_point = array(&center.coords);
        self.view_up = array(&up);
        self.distance = distance;
        self.clipping_range = [
            (distance - radius * 1.01).max(distance * 0.001),
            distance + radius * 1.01,
        ];
    }

    /// Rotate the focal point about the camera's right axis, centered at
    /// the position. Positive angles look up.
    pub fn pitch(&mut self, degrees: f64) {
        let direction = self.direction();
        let Some(axis) = Unit::try_new(direction.cross(&self.up()), f64::EPSILON) else {
            return;
        };
        let rotation = Rotation3::from_axis_angle(&axis, degrees.to_radians());
        self.rotate_focal(&rotation);
        self.view_up = array(&(rotation * self.up()));
    }

    /// Rotate the focal point about the view-up axis, centered at the
    /// position.
    pub fn yaw(&mut self, degrees: f64) {
        let Some(axis) = Unit::try_new(self.up(), f64::EPSILON) else {
            return;
        };
        let rotation = Rotation3::from_axis_angle(&axis, degrees.to_radians());
        self.rotate_focal(&rotation);
    }

    /// Rotate the view-up about the view direction.
    pub fn roll(&mut self, degrees: f64) {
        let axis = Unit::new_normalize(self.direction());
        let rotation = Rotation3::from_axis_angle(&axis, degrees.to_radians());
        self.view_up = array(&(rotation * self.up()));
    }

    fn rotate_focal(&mut self, rotation: &Rotation3<f64>) {
        let position = self.position();
        let focal = position + rotation * (self.focal() - position);
        self.focal_point = array(&focal.coords);
    }
}

/// Image settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    /// Divides the camera view angle. Default: 1.0
    pub zoom: f64,
    pub background: [u8; 3],
    pub mesh_color: [u8; 3],
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            zoom: 1.0,
            background: [255, 255, 255],
            mesh_color: [128, 128, 128],
        }
    }
}

impl RenderParams {
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn validate(&self) -> MeshResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MeshError::invalid_parameter(
                "size",
                format!("image size must be non-zero, got {}x{}", self.width, self.height),
            ));
        }
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            return Err(MeshError::invalid_parameter(
                "zoom",
                format!("zoom must be > 0, got {}", self.zoom),
            ));
        }
        Ok(())
    }
}

/// How the screenshot camera is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraChoice {
    /// A fixed camera, typically a named preset.
    Preset(Camera),
    /// Default view rotated and fitted to each mesh.
    Oriented(Orientation),
}

impl Default for CameraChoice {
    fn default() -> Self {
        CameraChoice::Oriented(Orientation::default())
    }
}

impl CameraChoice {
    /// Camera to use for `mesh`.
    pub fn camera_for(&self, mesh: &Mesh) -> MeshResult<Camera> {
        match self {
            CameraChoice::Preset(camera) => camera.clone().resolve(),
            CameraChoice::Oriented(orientation) => {
                let (min, max) = mesh
                    .bounds()
                    .ok_or_else(|| MeshError::empty_mesh("cannot fit a camera to an empty mesh"))?;
                Ok(Camera::oriented(min, max, orientation))
            }
        }
    }
}

/// Where and how screenshots are taken.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScreenshotOptions {
    pub out_dir: PathBuf,
    pub camera: CameraChoice,
    pub params: RenderParams,
}

impl ScreenshotOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            ..Default::default()
        }
    }

    /// Render `mesh` (saved at `mesh_path`) into the output directory.
    pub fn capture(&self, mesh: &Mesh, mesh_path: &Path) -> MeshResult<PathBuf> {
        let camera = self.camera.camera_for(mesh)?;
        save_screenshot(mesh, &camera, &self.params, &self.out_dir, mesh_path)
    }
}

/// A vertex after projection to the screen.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f64,
    y: f64,
    /// NDC depth in [-1, 1].
    z: f64,
    intensity: f64,
}

#[inline]
fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f64, py: f64) -> f64 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Render `mesh` seen through `camera`.
pub fn render_mesh(mesh: &Mesh, camera: &Camera, params: &RenderParams) -> MeshResult<RgbImage> {
    if mesh.is_empty() {
        return Err(MeshError::empty_mesh("nothing to render"));
    }
    camera.validate()?;
    params.validate()?;
    let _timer = OperationTimer::with_mesh("render", mesh);

    let (width, height) = (params.width as usize, params.height as usize);
    let aspect = width as f64 / height as f64;
    let fovy = (camera.view_angle / params.zoom).to_radians();
    let [near, far] = camera.clipping_range;

    let view = Isometry3::look_at_rh(&camera.position(), &camera.focal(), &camera.up());
    let projection = Perspective3::new(aspect, fovy, near, far);

    let mut shaded = mesh.clone();
    shaded.compute_vertex_normals();

    // Headlight: the light shines along the view direction, which is -z in
    // view space, so the diffuse term is |n_view.z|
    let screen: Vec<Option<ScreenVertex>> = shaded
        .vertices
        .iter()
        .map(|v| {
            let p = view * v.position;
            if -p.z < near {
                return None;
            }
            let ndc = projection.project_point(&p);
            let intensity = v
                .normal
                .map_or(1.0, |n| AMBIENT + DIFFUSE * (view.rotation * n).z.abs());
            Some(ScreenVertex {
                x: (ndc.x + 1.0) * 0.5 * width as f64,
                y: (1.0 - ndc.y) * 0.5 * height as f64,
                z: ndc.z,
                intensity,
            })
        })
        .collect();

    let mut depth = vec![f64::INFINITY; width * height];
    let mut image = RgbImage::from_pixel(params.width, params.height, Rgb(params.background));
    let color = params.mesh_color.map(f64::from);
    let mut drawn = 0usize;
    let mut culled = 0usize;

    for face in &shaded.faces {
        let (Some(a), Some(b), Some(c)) = (
            screen[face[0] as usize],
            screen[face[1] as usize],
            screen[face[2] as usize],
        ) else {
            culled += 1;
            continue;
        };

        let area = edge(&a, &b, c.x, c.y);
        if area.abs() < 1e-12 {
            continue;
        }

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0);
        let max_x = a.x.max(b.x).max(c.x).ceil().min(width as f64 - 1.0);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0);
        let max_y = a.y.max(b.y).max(c.y).ceil().min(height as f64 - 1.0);
        if min_x > max_x || min_y > max_y {
            culled += 1;
            continue;
        }

        for py in min_y as usize..=max_y as usize {
            for px in min_x as usize..=max_x as usize {
                let (cx, cy) = (px as f64 + 0.5, py as f64 + 0.5);
                // Dividing by the signed area makes the weights positive
                // inside for either winding
                let wa = edge(&b, &c, cx, cy) / area;
                let wb = edge(&c, &a, cx, cy) / area;
                let wc = edge(&a, &b, cx, cy) / area;
                if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                    continue;
                }

                let z = wa * a.z + wb * b.z + wc * c.z;
                let idx = py * width + px;
                if !(-1.0..=1.0).contains(&z) || z >= depth[idx] {
                    continue;
                }
                depth[idx] = z;

                let intensity =
                    (wa * a.intensity + wb * b.intensity + wc * c.intensity).clamp(0.0, 1.0);
                let rgb = color.map(|ch| (ch * intensity).round() as u8);
                image.put_pixel(px as u32, py as u32, Rgb(rgb));
            }
        }
        drawn += 1;
    }

    debug!(
        "Rendered {}x{}: {} faces drawn, {} culled",
        width, height, drawn, culled
    );
    Ok(image)
}

/// Path a screenshot of `mesh_path` is written to: the mesh file name
/// with `.png` appended, inside `out_dir`.
pub fn screenshot_path(out_dir: &Path, mesh_path: &Path) -> PathBuf {
    let name = mesh_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    out_dir.join(format!("{}.png", name))
}

/// Render `mesh` and write it as `<out_dir>/<mesh file name>.png`.
pub fn save_screenshot(
    mesh: &Mesh,
    camera: &Camera,
    params: &RenderParams,
    out_dir: &Path,
    mesh_path: &Path,
) -> MeshResult<PathBuf> {
    let image = render_mesh(mesh, camera, params)?;

    fs::create_dir_all(out_dir).map_err(|e| MeshError::io_write(out_dir, e))?;
    let path = screenshot_path(out_dir, mesh_path);
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| MeshError::render_failed(format!("{}: {}", path.display(), e)))?;

    info!("Saved screenshot to {:?}", path);
    Ok(path)
}
