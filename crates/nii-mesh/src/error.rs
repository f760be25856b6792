//! Error types for label-map meshing with rich diagnostics.
//!
//! Every error carries a machine-readable code, an optional location and a
//! recovery suggestion, and renders through miette.
//!
//! # Error Codes
//!
//! Codes have the format `NIIM-XXXX`:
//! - `NIIM-1xxx`: I/O errors (reading, writing, parsing)
//! - `NIIM-2xxx`: Validation errors (label maps, parameters, cameras)
//! - `NIIM-3xxx`: Processing errors (isosurface, decimation)
//! - `NIIM-4xxx`: Format errors (unsupported or malformed data)
//! - `NIIM-5xxx`: External tool and rendering errors
//!
//! # Example
//!
//! ```rust,ignore
//! use nii_mesh::{ErrorCode, MeshError};
//!
//! let err = MeshError::tool_not_found("nii2mesh");
//! assert_eq!(err.code(), ErrorCode::ExternalToolNotFound);
//! println!("{}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for meshing operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// NIIM-1001: Failed to read file
    IoRead = 1001,
    /// NIIM-1002: Failed to write file
    IoWrite = 1002,
    /// NIIM-1003: Failed to parse mesh file
    ParseError = 1003,
    /// NIIM-1004: Failed to read NIFTI volume
    NiftiRead = 1004,

    // Validation errors (2xxx)
    /// NIIM-2001: Label map shape or spacing is invalid
    InvalidLabelMap = 2001,
    /// NIIM-2002: Parameter out of range
    InvalidParameter = 2002,
    /// NIIM-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,
    /// NIIM-2004: Camera parameters are invalid
    InvalidCamera = 2004,

    // Processing errors (3xxx)
    /// NIIM-3001: No surface at the requested iso level
    EmptyIsosurface = 3001,
    /// NIIM-3002: Decimation failed
    DecimationFailed = 3002,

    // Format errors (4xxx)
    /// NIIM-4001: Unsupported file format
    UnsupportedFormat = 4001,
    /// NIIM-4002: Settings file could not be parsed
    MalformedConfig = 4002,

    // External tool / render errors (5xxx)
    /// NIIM-5001: External executable not found
    ExternalToolNotFound = 5001,
    /// NIIM-5002: External executable exited with failure
    ExternalToolFailed = 5002,
    /// NIIM-5003: External executable produced no output file
    ExternalOutputMissing = 5003,
    /// NIIM-5004: Screenshot rendering failed
    RenderFailed = 5004,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `NIIM-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "NIIM-1001",
            ErrorCode::IoWrite => "NIIM-1002",
            ErrorCode::ParseError => "NIIM-1003",
            ErrorCode::NiftiRead => "NIIM-1004",
            ErrorCode::InvalidLabelMap => "NIIM-2001",
            ErrorCode::InvalidParameter => "NIIM-2002",
            ErrorCode::EmptyMesh => "NIIM-2003",
            ErrorCode::InvalidCamera => "NIIM-2004",
            ErrorCode::EmptyIsosurface => "NIIM-3001",
            ErrorCode::DecimationFailed => "NIIM-3002",
            ErrorCode::UnsupportedFormat => "NIIM-4001",
            ErrorCode::MalformedConfig => "NIIM-4002",
            ErrorCode::ExternalToolNotFound => "NIIM-5001",
            ErrorCode::ExternalToolFailed => "NIIM-5002",
            ErrorCode::ExternalOutputMissing => "NIIM-5003",
            ErrorCode::RenderFailed => "NIIM-5004",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the input file or directory.
    CheckInput { checks: Vec<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Install or locate an external tool.
    InstallTool { tool: String, hint: String },
    /// Manual intervention may be required.
    ManualIntervention { description: String },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input for: {}", checks.join(", "))
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::InstallTool { tool, hint } => {
                write!(f, "Make `{}` available: {}", tool, hint)
            }
            RecoverySuggestion::ManualIntervention { description } => {
                write!(f, "{}", description)
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Location information for errors.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// Error in a file.
    File { path: PathBuf },
    /// Error in a voxel grid of the given shape.
    Volume { dims: Vec<usize> },
    /// Error in a named parameter.
    Parameter { name: String },
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::File { path } => write!(f, "{}", path.display()),
            MeshLocation::Volume { dims } => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "volume of shape [{}]", dims.join(" x "))
            }
            MeshLocation::Parameter { name } => write!(f, "parameter `{}`", name),
        }
    }
}

/// Errors that can occur while meshing label maps.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(niimesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(niimesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(niimesh::parse::error),
        help("The file may be corrupted or in an unsupported format variant.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Error reading a NIFTI volume.
    #[error("failed to read NIFTI volume {path}: {details}")]
    #[diagnostic(
        code(niimesh::nifti::read),
        help("Expected a .nii or .nii.gz file with a 3D (or 4D) image.")
    )]
    NiftiRead { path: PathBuf, details: String },

    /// Label map has an invalid shape or spacing.
    #[error("invalid label map: {details}")]
    #[diagnostic(code(niimesh::validation::labelmap))]
    InvalidLabelMap { details: String, dims: Vec<usize> },

    /// Parameter out of its valid range.
    #[error("invalid parameter `{name}`: {details}")]
    #[diagnostic(code(niimesh::validation::parameter))]
    InvalidParameter { name: String, details: String },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(niimesh::validation::empty),
        help("The mesh must have at least one vertex and one face.")
    )]
    EmptyMesh { details: String },

    /// Camera parameters are invalid.
    #[error("invalid camera: {details}")]
    #[diagnostic(
        code(niimesh::validation::camera),
        help("Camera triples must be finite, distance > 0 and near < far.")
    )]
    InvalidCamera { details: String },

    /// No voxel is above the iso level.
    #[error("no surface at iso level {iso_level}: the volume has no voxel above it")]
    #[diagnostic(
        code(niimesh::isosurface::empty),
        help("Check the selected label and the iso level; the label map may be all background.")
    )]
    EmptyIsosurface { iso_level: f64 },

    /// Decimation failed.
    #[error("decimation failed: {details}")]
    #[diagnostic(
        code(niimesh::decimate::failed),
        help("Try a less aggressive simplification value.")
    )]
    DecimationFailed { details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(niimesh::format::unsupported),
        help("Supported formats: STL, OBJ, PLY (read and write), VTK (write)")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Settings file could not be parsed.
    #[error("malformed settings file {path}: {details}")]
    #[diagnostic(code(niimesh::config::malformed))]
    MalformedConfig { path: PathBuf, details: String },

    /// External executable could not be started.
    #[error("external tool `{executable}` not found")]
    #[diagnostic(
        code(niimesh::external::not_found),
        help("Install it or pass its full path.")
    )]
    ExternalToolNotFound {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// External executable exited with a failure status.
    #[error("external tool `{executable}` failed ({status}): {stderr}")]
    #[diagnostic(code(niimesh::external::failed))]
    ExternalToolFailed {
        executable: String,
        status: String,
        stderr: String,
    },

    /// External executable finished without producing its output.
    #[error("expected output {path} was not produced")]
    #[diagnostic(code(niimesh::external::missing_output))]
    ExternalOutputMissing { path: PathBuf },

    /// Screenshot rendering failed.
    #[error("rendering failed: {details}")]
    #[diagnostic(code(niimesh::render::failed))]
    RenderFailed { details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::NiftiRead { .. } => ErrorCode::NiftiRead,
            MeshError::InvalidLabelMap { .. } => ErrorCode::InvalidLabelMap,
            MeshError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidCamera { .. } => ErrorCode::InvalidCamera,
            MeshError::EmptyIsosurface { .. } => ErrorCode::EmptyIsosurface,
            MeshError::DecimationFailed { .. } => ErrorCode::DecimationFailed,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::MalformedConfig { .. } => ErrorCode::MalformedConfig,
            MeshError::ExternalToolNotFound { .. } => ErrorCode::ExternalToolNotFound,
            MeshError::ExternalToolFailed { .. } => ErrorCode::ExternalToolFailed,
            MeshError::ExternalOutputMissing { .. } => ErrorCode::ExternalOutputMissing,
            MeshError::RenderFailed { .. } => ErrorCode::RenderFailed,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            MeshError::IoWrite { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            MeshError::ParseError { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["binary STL".into(), "OBJ".into()],
            },
            MeshError::NiftiRead { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["NIFTI-1 header".into(), "gzip integrity".into()],
            },
            MeshError::InvalidLabelMap { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["image dimensions".into(), "pixdim spacing".into()],
            },
            MeshError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![(name.clone(), "use a value in range".into())],
            },
            MeshError::EmptyMesh { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["mesh has geometry".into()],
            },
            MeshError::InvalidCamera { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("distance".into(), "> 0".into()),
                    ("clipping_range".into(), "near < far".into()),
                ],
            },
            MeshError::EmptyIsosurface { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("label".into(), "pick a label present in the volume".into()),
                    ("iso_level".into(), "lower it".into()),
                ],
            },
            MeshError::DecimationFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("simplify_value".into(), "try a gentler value".into())],
            },
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["stl".into(), "obj".into(), "ply".into(), "vtk".into()],
            },
            MeshError::MalformedConfig { .. } => RecoverySuggestion::ManualIntervention {
                description: "Fix the settings file syntax (TOML or JSON)".into(),
            },
            MeshError::ExternalToolNotFound { executable, .. } => {
                RecoverySuggestion::InstallTool {
                    tool: executable.clone(),
                    hint: "put it on PATH or pass --nii2mesh-exe".into(),
                }
            }
            MeshError::ExternalToolFailed { .. } | MeshError::ExternalOutputMissing { .. } => {
                RecoverySuggestion::ManualIntervention {
                    description: "Run the tool by hand with -v 1 to see its output".into(),
                }
            }
            MeshError::RenderFailed { .. } => RecoverySuggestion::None,
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            MeshError::IoRead { path, .. }
            | MeshError::IoWrite { path, .. }
            | MeshError::ParseError { path, .. }
            | MeshError::NiftiRead { path, .. }
            | MeshError::MalformedConfig { path, .. }
            | MeshError::ExternalOutputMissing { path } => {
                Some(MeshLocation::File { path: path.clone() })
            }
            MeshError::InvalidLabelMap { dims, .. } => {
                Some(MeshLocation::Volume { dims: dims.clone() })
            }
            MeshError::InvalidParameter { name, .. } => {
                Some(MeshLocation::Parameter { name: name.clone() })
            }
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create a NiftiRead error.
    pub fn nifti_read(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::NiftiRead {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an InvalidLabelMap error.
    pub fn invalid_label_map(details: impl Into<String>, dims: &[usize]) -> Self {
        MeshError::InvalidLabelMap {
            details: details.into(),
            dims: dims.to_vec(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: impl Into<String>, details: impl Into<String>) -> Self {
        MeshError::InvalidParameter {
            name: name.into(),
            details: details.into(),
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidCamera error.
    pub fn invalid_camera(details: impl Into<String>) -> Self {
        MeshError::InvalidCamera {
            details: details.into(),
        }
    }

    /// Create a DecimationFailed error.
    pub fn decimation_failed(details: impl Into<String>) -> Self {
        MeshError::DecimationFailed {
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        MeshError::UnsupportedFormat { extension }
    }

    /// Create a MalformedConfig error.
    pub fn malformed_config(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::MalformedConfig {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an ExternalToolNotFound error.
    pub fn tool_not_found(executable: impl Into<String>, source: std::io::Error) -> Self {
        MeshError::ExternalToolNotFound {
            executable: executable.into(),
            source,
        }
    }

    /// Create an ExternalToolFailed error.
    pub fn tool_failed(
        executable: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        MeshError::ExternalToolFailed {
            executable: executable.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a RenderFailed error.
    pub fn render_failed(details: impl Into<String>) -> Self {
        MeshError::RenderFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = MeshError::EmptyIsosurface { iso_level: 0.5 };
        assert_eq!(err.code(), ErrorCode::EmptyIsosurface);
        assert_eq!(err.code().as_str(), "NIIM-3001");
        assert_eq!(
            MeshError::unsupported_format(Some("3mf".into())).code().to_string(),
            "NIIM-4001"
        );
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = MeshError::tool_not_found(
            "nii2mesh",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        match err.recovery_suggestion() {
            RecoverySuggestion::InstallTool { tool, .. } => assert_eq!(tool, "nii2mesh"),
            other => panic!("Expected InstallTool suggestion, got {other:?}"),
        }
    }

    #[test]
    fn test_location_info() {
        let err = MeshError::invalid_label_map("fewer than 3 dimensions", &[4, 4]);
        match err.location() {
            Some(MeshLocation::Volume { dims }) => assert_eq!(dims, vec![4, 4]),
            other => panic!("Expected Volume location, got {other:?}"),
        }
        assert!(MeshError::render_failed("x").location().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = MeshError::tool_failed("nii2mesh", "exit status: 2", "bad input");
        let display = format!("{}", err);
        assert!(display.contains("nii2mesh"));
        assert!(display.contains("exit status: 2"));
        assert!(display.contains("bad input"));
    }

    #[test]
    fn test_location_display() {
        let loc = MeshLocation::Volume {
            dims: vec![10, 20, 30],
        };
        assert_eq!(loc.to_string(), "volume of shape [10 x 20 x 30]");
    }
}
