//! Tracing helpers for pipeline stages.
//!
//! The library only emits events; installing a subscriber is up to the
//! application. Useful filters:
//!
//! - `RUST_LOG=nii_mesh=info` stage summaries
//! - `RUST_LOG=nii_mesh::timing=info` per-stage wall time
//! - `RUST_LOG=nii_mesh=debug` intermediate mesh sizes

use std::time::Instant;
use tracing::{Span, debug, info};

/// A stage timer that logs its duration on drop.
///
/// ```rust,ignore
/// use nii_mesh::tracing_ext::OperationTimer;
///
/// fn marching_cubes() {
///     let _timer = OperationTimer::new("marching_cubes");
///     // ...
/// }
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("nii_mesh_stage", operation = name);
        debug!(target: "nii_mesh::timing", operation = name, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the size of the input mesh.
    pub fn with_mesh(name: &'static str, mesh: &crate::Mesh) -> Self {
        let span = tracing::info_span!(
            "nii_mesh_stage",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count()
        );
        debug!(
            target: "nii_mesh::timing",
            operation = name,
            faces = mesh.face_count(),
            vertices = mesh.vertex_count(),
            "Starting stage"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "nii_mesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Stage completed"
        );
    }
}

/// Log mesh size and extent at debug level.
pub fn log_mesh_stats(mesh: &crate::Mesh, context: &str) {
    let dims = mesh
        .bounds()
        .map_or_else(nalgebra::Vector3::zeros, |(min, max)| max - min);

    debug!(
        target: "nii_mesh::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log a file write or move.
pub fn log_io_operation(operation: &str, path: &std::path::Path, format: Option<&str>) {
    info!(
        target: "nii_mesh::io",
        operation = operation,
        path = path.display().to_string(),
        format = format.unwrap_or("auto"),
        "I/O operation completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mesh;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_stage");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_mesh_stats_empty() {
        let mesh = Mesh::new();
        let _timer = OperationTimer::with_mesh("empty", &mesh);
        log_mesh_stats(&mesh, "test");
    }
}
