//! Project discovery and build ordering for `templar-detector`.
//!
//! [`discover_projects`] finds every directory holding a project template.
//! [`DependencyGraph::build`] dry-runs each template to learn which other
//! projects it references through `image(ref=...)`, and
//! [`DependencyGraph::batches`] orders them so dependencies build first.

pub mod discover;
pub mod error;
pub mod graph;

use std::collections::BTreeMap;
use std::path::Path;

use templar_renderer::TemplateEngine;

pub use discover::{discover_projects, Project, IGNORE_MARKER};
pub use error::DetectError;
pub use graph::{local_image_refs, DependencyGraph};

/// Discover the projects below `root` and return them in build order.
pub fn find_projects(
    root: &Path,
    template_name: &str,
    engine: &TemplateEngine,
) -> Result<Vec<Project>, DetectError> {
    let projects = discover_projects(root, template_name)?;
    let order = DependencyGraph::build(&projects, engine)?.order()?;

    let mut by_name: BTreeMap<_, _> = projects.into_iter().map(|p| (p.name.clone(), p)).collect();
    Ok(order.iter().filter_map(|name| by_name.remove(name)).collect())
}
