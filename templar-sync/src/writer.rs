//! Artifact generation and atomic writes.
//!
//! ## `generate`
//!
//! 1. Read the ledger embedded in the current output file (if any).
//! 2. Render the template with live functions.
//! 3. Prefix the `# Generated from` / `# BOM:` header.
//! 4. Skip if the file already holds exactly this content.
//! 5. Write to `<path>.templar.tmp` (mode 0600 on unix).
//! 6. Rename to the final path.
//! 7. Return the ledger changes.

use std::io::Write;
use std::path::{Path, PathBuf};

use templar_core::materials;
use templar_core::Change;
use templar_renderer::TemplateEngine;

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped; it already holds the generated content.
    Unchanged { path: PathBuf },
    /// Dry-run mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// atomic_write
// ---------------------------------------------------------------------------

/// Atomically replace `path` with `content` unless it already matches.
pub fn atomic_write(path: &Path, content: &str, dry_run: bool) -> Result<WriteResult, SyncError> {
    let tmp = PathBuf::from(format!("{}.templar.tmp", path.display()));
    atomic_write_with_tmp(path, content, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &str,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    write_private(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Create (or truncate) `path` readable only by its owner.
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

/// Inputs for generating one project's artifact.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    /// Browsable link prefix for the header.
    pub source_link: &'a str,
    pub template: &'a Path,
    /// Template path relative to the input root, `/`-separated.
    pub relative_template: &'a str,
    pub output: &'a Path,
    pub dry_run: bool,
}

/// Full artifact text plus the ledger changes against the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub content: String,
    pub changes: Vec<Change>,
}

/// Outcome of [`generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub changes: Vec<Change>,
    pub write: WriteResult,
}

/// Render the artifact for `request` without touching the output file.
pub fn render_artifact(
    engine: &TemplateEngine,
    request: &GenerateRequest<'_>,
) -> Result<RenderedArtifact, SyncError> {
    let previous = materials::read_previous(request.output);
    let rendered = engine.render(request.template)?;
    let changes = materials::diff(&previous, &rendered.ledger);

    let mut content =
        materials::header(request.source_link, request.relative_template, &rendered.ledger)?;
    content.push_str(&rendered.content);

    Ok(RenderedArtifact { content, changes })
}

/// Render and write one project's artifact; returns what changed.
///
/// A failed render leaves the output file untouched.
pub fn generate(
    engine: &TemplateEngine,
    request: &GenerateRequest<'_>,
) -> Result<GenerateOutcome, SyncError> {
    let artifact = render_artifact(engine, request)?;
    let write = atomic_write(request.output, &artifact.content, request.dry_run)?;
    Ok(GenerateOutcome {
        changes: artifact.changes,
        write,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
