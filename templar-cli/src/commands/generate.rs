//! `templar generate <input> <output>` — render every project, then
//! optionally commit, build and push.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use colored::Colorize;

use templar_sync::{format_changes, parse_project_filter, PipelineOptions, SystemRunner, WriteResult};

use super::settings::{engine, SettingsArgs};

/// Arguments for `templar generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory holding one sub-directory per project.
    pub input: PathBuf,

    /// Directory the generated files are written to.
    pub output: PathBuf,

    /// Comma-separated list of projects to generate instead of all of them.
    #[arg(long, env = "TEMPLAR_PROJECT", default_value = "")]
    pub project: String,

    /// Commit each generated file in the output repository.
    #[arg(long, env = "TEMPLAR_COMMIT")]
    pub commit: bool,

    /// Build images for successfully committed projects.
    #[arg(long, env = "TEMPLAR_BUILD")]
    pub build: bool,

    /// Build images regardless of changes.
    #[arg(long, env = "TEMPLAR_FORCE_BUILD")]
    pub force_build: bool,

    /// Push images after building them.
    #[arg(long, env = "TEMPLAR_PUSH")]
    pub push: bool,

    /// How many times to retry a failed push.
    #[arg(long, env = "TEMPLAR_PUSH_RETRIES", default_value_t = 2)]
    pub push_retries: u32,

    /// Emit GitHub Actions `::group::` markers around each project.
    #[arg(
        long,
        env = "TEMPLAR_WORKFLOW_COMMANDS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub workflow_commands: bool,

    /// Show what would be written without writing files or running commands.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

impl GenerateArgs {
    pub fn run(self) -> Result<()> {
        let mut settings = self.settings.settings();
        settings.push_retries = self.push_retries;
        let engine = engine(&settings)?;

        let options = PipelineOptions {
            input: self.input,
            output: self.output,
            projects: parse_project_filter(&self.project),
            commit: self.commit,
            build: self.build,
            force_build: self.force_build,
            push: self.push,
            workflow_commands: self.workflow_commands,
            dry_run: self.dry_run,
        };

        let mut stdout = std::io::stdout();
        let reports = templar_sync::run(&settings, &engine, &options, &SystemRunner, &mut stdout)
            .context("generate failed")?;

        if reports.is_empty() {
            println!("No projects matched.");
        }
        for report in &reports {
            let status = match &report.write {
                WriteResult::Written { .. } => "written".green(),
                WriteResult::Unchanged { .. } => "unchanged".bright_black(),
                WriteResult::WouldWrite { .. } => "would write".yellow(),
            };
            println!("{} {status}", report.project.as_str().bold());
            if !report.changes.is_empty() {
                for line in format_changes(&report.changes).lines() {
                    println!("  {line}");
                }
            }
        }
        Ok(())
    }
}
