//! # templar-sync
//!
//! Atomic artifact generation and the commit/build/push pipeline.
//!
//! Call [`generate`] to render one project's artifact, [`preview`] to see what
//! it would change, or [`run`] to process every project under an input root.

pub mod changelog;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod writer;

pub use changelog::format_changes;
pub use diff::{preview, FileDiff};
pub use error::SyncError;
pub use pipeline::{
    parse_project_filter, preflight, run, CommandRunner, PipelineOptions, ProjectReport,
    SystemRunner,
};
pub use writer::{
    atomic_write, generate, render_artifact, GenerateOutcome, GenerateRequest, RenderedArtifact,
    WriteResult,
};
