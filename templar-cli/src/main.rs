//! Templar — container-manifest generator.
//!
//! # Usage
//!
//! ```text
//! templar generate <input> <output> [--project a,b] [--commit] [--build] [--force-build]
//!                  [--push] [--push-retries N] [--workflow-commands BOOL] [--dry-run]
//! templar order <input> [--batches | --json]
//! templar diff <input> <output> [--project a,b]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, generate::GenerateArgs, order::OrderArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "templar",
    version,
    about = "Generate container manifests from templates with live upstream versions",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render every project, then optionally commit, build and push.
    Generate(GenerateArgs),

    /// Print the order projects would be built in.
    Order(OrderArgs),

    /// Show material changes and unified diffs without writing anything.
    Diff(DiffArgs),
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Generate(args) => args.run(),
        Commands::Order(args) => args.run(),
        Commands::Diff(args) => args.run(),
    }
}
