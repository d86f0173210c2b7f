//! `templar order <input>` — print the order projects would be built in.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use templar_detector::{discover_projects, DependencyGraph};

use super::settings::{engine, SettingsArgs};

/// Arguments for `templar order`.
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Directory holding one sub-directory per project.
    pub input: PathBuf,

    /// Show the independent build batches as a table.
    #[arg(long)]
    pub batches: bool,

    /// Emit machine-readable JSON.
    #[arg(long, conflicts_with = "batches")]
    pub json: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Serialize)]
struct OrderJson {
    order: Vec<String>,
    batches: Vec<Vec<String>>,
}

#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "batch")]
    batch: usize,
    #[tabled(rename = "projects")]
    projects: String,
}

impl OrderArgs {
    pub fn run(self) -> Result<()> {
        let settings = self.settings.settings();
        let engine = engine(&settings)?;

        let projects = discover_projects(&self.input, &settings.template_name)
            .with_context(|| format!("failed to find projects in {}", self.input.display()))?;
        let graph = DependencyGraph::build(&projects, &engine)?;
        let batches: Vec<Vec<String>> = graph
            .batches()?
            .into_iter()
            .map(|batch| batch.into_iter().map(|p| p.0).collect())
            .collect();

        if self.json {
            let payload = OrderJson {
                order: batches.iter().flatten().cloned().collect(),
                batches,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize order JSON")?
            );
            return Ok(());
        }

        if self.batches {
            let rows: Vec<BatchRow> = batches
                .iter()
                .enumerate()
                .map(|(i, batch)| BatchRow {
                    batch: i + 1,
                    projects: batch.join(", "),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            return Ok(());
        }

        for name in batches.iter().flatten() {
            println!("{name}");
        }
        Ok(())
    }
}
