//! Preview of what `generate` would change, without writing anything.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use templar_core::Change;
use templar_renderer::TemplateEngine;

use crate::error::{io_err, SyncError};
use crate::writer::{render_artifact, GenerateRequest};

/// Rendered-vs-current comparison for one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub changes: Vec<Change>,
    /// Empty when the rendered text equals the file on disk.
    pub unified_diff: String,
}

impl FileDiff {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty() && self.unified_diff.is_empty()
    }
}

/// Render `request` and compare it with the current output file.
///
/// `label` names the file in the `a/` and `b/` diff headers.
pub fn preview(
    engine: &TemplateEngine,
    request: &GenerateRequest<'_>,
    label: &str,
) -> Result<FileDiff, SyncError> {
    let artifact = render_artifact(engine, request)?;
    let existing = read_existing_or_empty(request.output)?;

    let unified_diff = if existing == artifact.content {
        String::new()
    } else {
        let old_header = format!("a/{label}");
        let new_header = format!("b/{label}");
        TextDiff::from_lines(&existing, &artifact.content)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string()
    };

    Ok(FileDiff {
        path: request.output.to_path_buf(),
        changes: artifact.changes,
        unified_diff,
    })
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.replace("\r\n", "\n")),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
