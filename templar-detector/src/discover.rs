//! Project discovery.
//!
//! A project is any directory that directly contains the template file. Hidden
//! directories are never entered, and a directory holding a file named
//! `IGNORE` is not a project (its subdirectories still may be).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use templar_core::ProjectName;

use crate::error::DetectError;

/// Marker file that excludes its directory from discovery.
pub const IGNORE_MARKER: &str = "IGNORE";

/// A discovered project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Base name of the project directory.
    pub name: ProjectName,
    pub dir: PathBuf,
    /// Absolute (or root-joined) path of the template file.
    pub template: PathBuf,
    /// Template path relative to the input root, `/`-separated.
    pub relative_template: String,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Find every project below `root`, sorted by name.
pub fn discover_projects(root: &Path, template_name: &str) -> Result<Vec<Project>, DetectError> {
    let mut projects: BTreeMap<ProjectName, Project> = BTreeMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != template_name {
            continue;
        }
        let template = entry.path().to_path_buf();
        let Some(dir) = template.parent().map(Path::to_path_buf) else {
            continue;
        };
        if dir.join(IGNORE_MARKER).exists() {
            tracing::debug!(dir = %dir.display(), "skipping ignored project");
            continue;
        }

        let base = dir
            .file_name()
            .or_else(|| root.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = ProjectName::from(base);
        if let Some(existing) = projects.get(&name) {
            return Err(DetectError::DuplicateProject {
                name,
                first: existing.dir.clone(),
                second: dir,
            });
        }

        tracing::debug!(project = %name, "discovered project");
        projects.insert(
            name.clone(),
            Project {
                relative_template: relative_slash_path(root, &template),
                name,
                dir,
                template,
            },
        );
    }

    Ok(projects.into_values().collect())
}
