//! The generate → commit → build → push loop over every project.
//!
//! Projects are visited in build order. For each one:
//!
//! 1. Render and write `<output>/<project>/<output name>`.
//! 2. With `commit`, stage and commit the file with a changelog message. A
//!    failed commit (usually: nothing changed) skips the remaining steps for
//!    that project.
//! 3. With `commit && build`, or `force_build`, build the image.
//! 4. With `push`, push the built image, retrying on failure.
//!
//! Generation, build and push failures end the run.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use templar_core::{Change, ProjectName, Settings};
use templar_detector::{find_projects, Project};
use templar_renderer::TemplateEngine;

use crate::changelog::format_changes;
use crate::error::{io_err, SyncError};
use crate::writer::{generate, GenerateRequest, WriteResult};

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Runs external programs (`git`, `buildah`).
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<(), SyncError>;
}

/// Runs commands as child processes sharing this process's stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<(), SyncError> {
        let command = command_line(program, args);
        tracing::info!("running {command}");

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| io_err(program, e))?;

        if status.success() {
            return Ok(());
        }
        Err(SyncError::Command {
            command,
            detail: format!("exited with {status}"),
        })
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What a pipeline run does beyond generating files.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Root directory holding the project templates.
    pub input: PathBuf,
    /// Root directory of the generated output (a git checkout when committing).
    pub output: PathBuf,
    /// Only process these projects. `None` processes all of them.
    pub projects: Option<BTreeSet<ProjectName>>,
    pub commit: bool,
    pub build: bool,
    /// Build even when not committing.
    pub force_build: bool,
    pub push: bool,
    /// Wrap each project's log in GitHub Actions `::group::` markers.
    pub workflow_commands: bool,
    /// Render only; write nothing and run no commands.
    pub dry_run: bool,
}

impl PipelineOptions {
    fn builds(&self) -> bool {
        (self.commit && self.build) || self.force_build
    }

    fn selects(&self, project: &ProjectName) -> bool {
        self.projects
            .as_ref()
            .map_or(true, |wanted| wanted.contains(project))
    }
}

/// Parse a comma-separated project list. An empty list means "all projects".
pub fn parse_project_filter(filter: &str) -> Option<BTreeSet<ProjectName>> {
    let names: BTreeSet<ProjectName> = filter
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ProjectName::from)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one project during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReport {
    pub project: ProjectName,
    pub changes: Vec<Change>,
    pub write: WriteResult,
    pub committed: bool,
    pub built: bool,
    pub pushed: bool,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Check that the external programs needed by the enabled steps respond to
/// `--version`.
pub fn preflight(
    settings: &Settings,
    options: &PipelineOptions,
    runner: &dyn CommandRunner,
) -> Result<(), SyncError> {
    if options.dry_run {
        return Ok(());
    }
    if options.build || options.force_build {
        runner.run(&settings.buildah, &strings(["--version"]))?;
    }
    if options.commit {
        runner.run("git", &strings(["--version"]))?;
    }
    Ok(())
}

/// Process every selected project in build order.
///
/// `out` receives the workflow group markers.
pub fn run(
    settings: &Settings,
    engine: &TemplateEngine,
    options: &PipelineOptions,
    runner: &dyn CommandRunner,
    out: &mut dyn Write,
) -> Result<Vec<ProjectReport>, SyncError> {
    let projects = find_projects(&options.input, &settings.template_name, engine)?;
    preflight(settings, options, runner)?;

    let mut reports = Vec::new();
    for project in projects.iter().filter(|p| options.selects(&p.name)) {
        if options.workflow_commands {
            writeln!(out, "::group::{}", project.name).map_err(|e| io_err("stdout", e))?;
        }
        tracing::info!("Checking project {}", project.name);

        let report = process(settings, engine, options, runner, project)?;
        reports.push(report);

        if options.workflow_commands {
            writeln!(out, "::endgroup::").map_err(|e| io_err("stdout", e))?;
        }
    }
    Ok(reports)
}

fn process(
    settings: &Settings,
    engine: &TemplateEngine,
    options: &PipelineOptions,
    runner: &dyn CommandRunner,
    project: &Project,
) -> Result<ProjectReport, SyncError> {
    let name = &project.name;
    let output = output_path(&options.output, name, &settings.output_name);
    let outcome = generate(
        engine,
        &GenerateRequest {
            source_link: &settings.source_link,
            template: &project.template,
            relative_template: &project.relative_template,
            output: &output,
            dry_run: options.dry_run,
        },
    )
    .map_err(|source| SyncError::Generate {
        project: name.clone(),
        source: Box::new(source),
    })?;

    let mut report = ProjectReport {
        project: name.clone(),
        changes: outcome.changes,
        write: outcome.write,
        committed: false,
        built: false,
        pushed: false,
    };
    if options.dry_run {
        return Ok(report);
    }

    if options.commit {
        let committed = commit(
            runner,
            &options.output,
            name,
            &settings.output_name,
            &report.changes,
        );
        if let Err(err) = committed {
            tracing::warn!("Failed to commit {name}: {err}");
            return Ok(report);
        }
        report.committed = true;
    }

    if options.builds() {
        let image = format!("{}/{}", settings.registry, name);
        let context = options.output.join(name.as_str());
        runner
            .run(&settings.buildah, &build_args(&image, &context))
            .map_err(|source| SyncError::Build {
                project: name.clone(),
                source: Box::new(source),
            })?;
        report.built = true;

        if options.push {
            push(runner, &settings.buildah, &image, settings.push_retries)?;
            report.pushed = true;
        }
    }
    Ok(report)
}

fn output_path(root: &Path, project: &ProjectName, output_name: &str) -> PathBuf {
    root.join(project.as_str()).join(output_name)
}

fn build_args(image: &str, context: &Path) -> Vec<String> {
    let mut args = strings(["bud", "--timestamp", "0", "--layers", "--tag"]);
    args.push(image.to_string());
    args.push(context.display().to_string());
    args
}

/// `git add` then `git commit` the project's output file inside `output`.
fn commit(
    runner: &dyn CommandRunner,
    output: &Path,
    project: &ProjectName,
    output_name: &str,
    changes: &[Change],
) -> Result<(), SyncError> {
    let root = output.display().to_string();
    let file = format!("{project}/{output_name}");
    let message = format!("[{project}] {}", format_changes(changes));

    let mut add = strings(["-C"]);
    add.extend([root.clone(), "add".to_string(), file.clone()]);
    runner.run("git", &add)?;

    let mut commit = strings(["-C"]);
    commit.push(root);
    commit.extend(strings(["commit", "--no-gpg-sign", "-m"]));
    commit.extend([message, file]);
    runner.run("git", &commit)
}

/// Push `image`, trying `retries + 1` times in total.
fn push(
    runner: &dyn CommandRunner,
    buildah: &str,
    image: &str,
    retries: u32,
) -> Result<(), SyncError> {
    let attempts = retries.saturating_add(1);
    for attempt in 1..=attempts {
        match runner.run(buildah, &strings(["push", image])) {
            Ok(()) => return Ok(()),
            Err(err) => tracing::warn!("Failed to push {image} [attempt {attempt}/{attempts}]: {err}"),
        }
    }
    Err(SyncError::PushExhausted {
        image: image.to_string(),
        attempts,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
