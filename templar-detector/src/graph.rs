//! Build-order computation from dry-run image references.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use templar_core::{is_qualified_reference, ProjectName};
use templar_renderer::{RecordedCalls, TemplateEngine};

use crate::discover::Project;
use crate::error::DetectError;

/// The template function whose `ref` argument names another image.
pub const IMAGE_FUNCTION: &str = "image";

/// Unqualified `image(ref=...)` arguments seen during a dry run; each one
/// names another project in the same tree.
pub fn local_image_refs(calls: &RecordedCalls) -> BTreeSet<ProjectName> {
    calls
        .string_args(IMAGE_FUNCTION, "ref")
        .into_iter()
        .filter(|r| !is_qualified_reference(r))
        .map(ProjectName::from)
        .collect()
}

/// Build-order graph. Edges point from a dependency to its dependents.
///
/// A referenced name with no template of its own is kept as a node marked
/// missing; it is never placed, so its dependents stay unresolved.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ProjectName, ()>,
    nodes: BTreeMap<ProjectName, NodeIndex>,
    missing: BTreeSet<NodeIndex>,
}

impl DependencyGraph {
    /// Dry-run every project template and collect its local image references.
    pub fn build(projects: &[Project], engine: &TemplateEngine) -> Result<Self, DetectError> {
        let mut edges = Vec::with_capacity(projects.len());
        for project in projects {
            let calls = engine
                .dry_run(&project.template)
                .map_err(|source| DetectError::DryRun {
                    project: project.name.clone(),
                    source,
                })?;
            let deps = local_image_refs(&calls);
            tracing::debug!(project = %project.name, dependencies = ?deps, "read project dependencies");
            edges.push((project.name.clone(), deps));
        }
        Ok(Self::from_edges(edges))
    }

    pub fn from_edges<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (ProjectName, D)>,
        D: IntoIterator<Item = ProjectName>,
    {
        let edges: Vec<(ProjectName, Vec<ProjectName>)> = edges
            .into_iter()
            .map(|(project, deps)| (project, deps.into_iter().collect()))
            .collect();

        let mut graph = Self::default();
        for (project, _) in &edges {
            graph.node(project);
        }
        let known: BTreeSet<NodeIndex> = graph.nodes.values().copied().collect();

        for (project, deps) in &edges {
            let dependent = graph.nodes[project];
            for dep in deps {
                let dependency = graph.node(dep);
                if !known.contains(&dependency) {
                    graph.missing.insert(dependency);
                }
                graph.graph.update_edge(dependency, dependent, ());
            }
        }
        graph
    }

    fn node(&mut self, name: &ProjectName) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.nodes.insert(name.clone(), idx);
        idx
    }

    /// Projects that have a template, in name order.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectName> {
        self.nodes
            .iter()
            .filter(|(_, idx)| !self.missing.contains(idx))
            .map(|(name, _)| name)
    }

    /// Local projects `project` references. `None` if it has no template.
    pub fn dependencies(&self, project: &ProjectName) -> Option<BTreeSet<ProjectName>> {
        let idx = *self.nodes.get(project)?;
        if self.missing.contains(&idx) {
            return None;
        }
        Some(
            self.graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|dep| self.graph[dep].clone())
                .collect(),
        )
    }

    /// Group projects into batches; every project's dependencies sit in
    /// earlier batches. Each batch is sorted by name.
    pub fn batches(&self) -> Result<Vec<Vec<ProjectName>>, DetectError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
            .collect();
        let mut remaining: BTreeSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| !self.missing.contains(idx))
            .collect();
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<NodeIndex> = remaining
                .iter()
                .filter(|idx| in_degree[*idx] == 0)
                .copied()
                .collect();

            if ready.is_empty() {
                return Err(DetectError::Unresolved {
                    remaining: self.unmet(&remaining),
                });
            }

            for idx in &ready {
                remaining.remove(idx);
                for dependent in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
                    if let Some(deg) = in_degree.get_mut(&dependent) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }

            let mut batch: Vec<ProjectName> =
                ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
            batch.sort();
            batches.push(batch);
        }

        Ok(batches)
    }

    /// Unplaced projects and the dependencies they are still waiting on.
    fn unmet(&self, remaining: &BTreeSet<NodeIndex>) -> BTreeMap<ProjectName, Vec<ProjectName>> {
        remaining
            .iter()
            .map(|&idx| {
                let mut unmet: Vec<ProjectName> = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .filter(|dep| remaining.contains(dep) || self.missing.contains(dep))
                    .map(|dep| self.graph[dep].clone())
                    .collect();
                unmet.sort();
                (self.graph[idx].clone(), unmet)
            })
            .collect()
    }

    /// Flattened [`batches`](Self::batches): dependencies first, alphabetical
    /// within a batch.
    pub fn order(&self) -> Result<Vec<ProjectName>, DetectError> {
        Ok(self.batches()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::from_edges(edges.iter().map(|(p, deps)| {
            (
                ProjectName::from(*p),
                deps.iter().map(|d| ProjectName::from(*d)).collect::<Vec<_>>(),
            )
        }))
    }

    fn names(list: &[ProjectName]) -> Vec<&str> {
        list.iter().map(ProjectName::as_str).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(&[("app", &["base"]), ("base", &[])]);
        assert_eq!(names(&g.order().unwrap()), vec!["base", "app"]);
    }

    #[test]
    fn batches_are_alphabetical() {
        let g = graph(&[
            ("zeta", &[]),
            ("alpha", &[]),
            ("web", &["alpha", "zeta"]),
            ("api", &["alpha"]),
            ("edge", &["web"]),
        ]);
        let batches = g.batches().unwrap();
        let batches: Vec<Vec<&str>> = batches.iter().map(|b| names(b)).collect();
        assert_eq!(batches, vec![vec!["alpha", "zeta"], vec!["api", "web"], vec!["edge"]]);
    }

    #[test]
    fn reciprocal_references_are_unresolved() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let err = g.order().unwrap_err();
        let DetectError::Unresolved { remaining } = &err else {
            panic!("expected Unresolved, got {err}");
        };
        assert_eq!(remaining.len(), 2);
        assert_eq!(names(&remaining[&ProjectName::from("a")]), vec!["b"]);
        assert!(err.to_string().starts_with("could not fully resolve dependencies: a needs [b]"));
    }

    #[test]
    fn reference_to_missing_project_is_unresolved() {
        let g = graph(&[("app", &["ghost"])]);
        assert!(matches!(g.order(), Err(DetectError::Unresolved { .. })));
    }

    #[test]
    fn missing_project_is_reported_as_unmet() {
        let g = graph(&[("app", &["ghost", "base"]), ("base", &[])]);
        let DetectError::Unresolved { remaining } = g.batches().unwrap_err() else {
            panic!("expected Unresolved");
        };
        assert_eq!(remaining.len(), 1);
        assert_eq!(names(&remaining[&ProjectName::from("app")]), vec!["ghost"]);
    }

    #[test]
    fn missing_names_are_not_projects() {
        let g = graph(&[("app", &["ghost"])]);
        assert_eq!(g.projects().map(ProjectName::as_str).collect::<Vec<_>>(), vec!["app"]);
        assert!(g.dependencies(&ProjectName::from("ghost")).is_none());
        let deps = g.dependencies(&ProjectName::from("app")).unwrap();
        assert!(deps.contains(&ProjectName::from("ghost")));
    }

    #[test]
    fn duplicate_references_count_once() {
        let g = graph(&[("app", &["base", "base"]), ("base", &[])]);
        assert_eq!(names(&g.order().unwrap()), vec!["base", "app"]);
    }

    #[test]
    fn empty_graph_has_no_batches() {
        assert!(DependencyGraph::default().batches().unwrap().is_empty());
    }
}
