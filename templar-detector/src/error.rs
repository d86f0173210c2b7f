//! Error types for templar-detector.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use templar_core::ProjectName;
use templar_renderer::RenderError;

/// All errors that can arise while discovering and ordering projects.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The input tree could not be walked.
    #[error("failed to walk project tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// Two project directories share a base name.
    #[error("project '{name}' is defined twice: {} and {}", .first.display(), .second.display())]
    DuplicateProject {
        name: ProjectName,
        first: PathBuf,
        second: PathBuf,
    },

    /// A project template failed to parse or execute in dry-run mode.
    #[error("failed to read dependencies of project '{project}': {source}")]
    DryRun {
        project: ProjectName,
        #[source]
        source: RenderError,
    },

    /// Some projects can never be scheduled: a cycle, or a reference to a
    /// project that does not exist.
    #[error("could not fully resolve dependencies: {}", describe_remaining(.remaining))]
    Unresolved {
        remaining: BTreeMap<ProjectName, Vec<ProjectName>>,
    },
}

fn describe_remaining(remaining: &BTreeMap<ProjectName, Vec<ProjectName>>) -> String {
    remaining
        .iter()
        .map(|(project, needs)| {
            let needs: Vec<&str> = needs.iter().map(ProjectName::as_str).collect();
            format!("{project} needs [{}]", needs.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
