//! Error types for templar-sync.

use std::path::PathBuf;

use thiserror::Error;

use templar_core::{MaterialsError, ProjectName};
use templar_detector::DetectError;
use templar_renderer::RenderError;

/// All errors that can arise from generating, committing, building or
/// pushing projects.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Project discovery or ordering failed.
    #[error("{0}")]
    Detect(#[from] DetectError),

    /// The ledger could not be encoded into the header.
    #[error("materials error: {0}")]
    Materials(#[from] MaterialsError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external command could not be started or exited unsuccessfully.
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    /// Generation of one project failed; the run stops here.
    #[error("failed to generate project {project}: {source}")]
    Generate {
        project: ProjectName,
        #[source]
        source: Box<SyncError>,
    },

    /// Building an image failed.
    #[error("failed to build {project}: {source}")]
    Build {
        project: ProjectName,
        #[source]
        source: Box<SyncError>,
    },

    /// Every push attempt failed.
    #[error("failed to push {image} after {attempts} attempts")]
    PushExhausted { image: String, attempts: u32 },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
