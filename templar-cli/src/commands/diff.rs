//! `templar diff <input> <output>` — show what `generate` would change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use templar_detector::find_projects;
use templar_sync::{format_changes, parse_project_filter, preview, GenerateRequest};

use super::settings::{engine, SettingsArgs};

/// Arguments for `templar diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Directory holding one sub-directory per project.
    pub input: PathBuf,

    /// Directory holding the previously generated files.
    pub output: PathBuf,

    /// Comma-separated list of projects to diff instead of all of them.
    #[arg(long, env = "TEMPLAR_PROJECT", default_value = "")]
    pub project: String,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let settings = self.settings.settings();
        let engine = engine(&settings)?;
        let filter = parse_project_filter(&self.project);

        let projects = find_projects(&self.input, &settings.template_name, &engine)
            .with_context(|| format!("failed to find projects in {}", self.input.display()))?;

        let mut clean = true;
        for project in projects
            .iter()
            .filter(|p| filter.as_ref().map_or(true, |f| f.contains(&p.name)))
        {
            let output = self.output.join(project.name.as_str()).join(&settings.output_name);
            let label = format!("{}/{}", project.name, settings.output_name);
            let request = GenerateRequest {
                source_link: &settings.source_link,
                template: &project.template,
                relative_template: &project.relative_template,
                output: &output,
                dry_run: true,
            };
            let diff = preview(&engine, &request, &label)
                .with_context(|| format!("diff failed for '{}'", project.name))?;
            if diff.is_clean() {
                continue;
            }

            clean = false;
            println!("{}", format!("[{}] {}", project.name, format_changes(&diff.changes)).bold());
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        if clean {
            println!("No differences.");
        }
        Ok(())
    }
}
