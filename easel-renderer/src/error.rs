//! Renderer error types.

use thiserror::Error;

/// Errors produced while compositing or exporting a scene.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A drawing surface could not be created or resized.
    #[error("Surface error: {0}")]
    Surface(String),

    /// Export encoding failed.
    #[error("Export error: {0}")]
    Export(String),

    /// A required resource was missing or unusable.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Error bubbled up from the scene model.
    #[error(transparent)]
    Core(#[from] easel_core::CoreError),
}

/// Result alias for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
