//! Error types for scene-graph operations.

use thiserror::Error;

/// Result type for scene-graph operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building, serializing, or hydrating a scene.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No constructor is registered for the requested type tag.
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Serialized data is structurally invalid for the target type.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// An image or other external resource failed to load.
    #[error("Failed to load resource: {0}")]
    ResourceLoad(String),

    /// The operation observed its abort signal and stopped.
    #[error("Operation aborted")]
    Aborted,

    /// A path string could not be parsed as SVG path data.
    #[error("Invalid path data: {0}")]
    InvalidPath(String),
}
