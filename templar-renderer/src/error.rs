//! Error types for templar-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from rendering or dry-running a template.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template or an include could not be read.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template or one of the includes failed to parse.
    #[error("failed to parse template {path}: {detail}")]
    Parse {
        path: PathBuf,
        detail: String,
        #[source]
        source: tera::Error,
    },

    /// Execution failed, including any template function returning an error.
    #[error("failed to execute template {path}: {detail}")]
    Execute {
        path: PathBuf,
        detail: String,
        #[source]
        source: tera::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn parse_err(path: impl Into<PathBuf>, source: tera::Error) -> RenderError {
    RenderError::Parse {
        path: path.into(),
        detail: error_chain(&source),
        source,
    }
}

pub(crate) fn execute_err(path: impl Into<PathBuf>, source: tera::Error) -> RenderError {
    RenderError::Execute {
        path: path.into(),
        detail: error_chain(&source),
        source,
    }
}

/// Tera reports the useful part (which function failed, and why) in the
/// source chain; flatten it so it survives `Display`.
fn error_chain(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = std::error::Error::source(err);
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
