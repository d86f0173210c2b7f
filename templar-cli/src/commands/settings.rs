//! Flags shared by every subcommand, each with a `TEMPLAR_*` fallback.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use templar_core::{config::DEFAULT_ALPINE_MIRROR, Credentials, Settings};
use templar_renderer::TemplateEngine;
use templar_sources::standard_registry;

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// File name of the project templates.
    #[arg(long, env = "TEMPLAR_TEMPLATE", default_value = "Dockerfile.tera")]
    pub template: String,

    /// File name written into each output project directory.
    #[arg(long, env = "TEMPLAR_OUTPUT_NAME", default_value = "Dockerfile")]
    pub output_name: String,

    /// Link to a browsable version of the source repository.
    #[arg(
        long,
        env = "TEMPLAR_SOURCE_LINK",
        default_value = "https://github.com/example/repo/blob/master/"
    )]
    pub source_link: String,

    /// Registry used for pushes, pulls and unqualified image references.
    #[arg(long, env = "TEMPLAR_REGISTRY", default_value = "registry.example.com")]
    pub registry: String,

    /// Base URL of the Alpine mirror used for release and package lookups.
    #[arg(long, env = "TEMPLAR_ALPINE_MIRROR", default_value = DEFAULT_ALPINE_MIRROR)]
    pub alpine_mirror: String,

    /// Directory of shared `.tera` templates available to `include`.
    #[arg(long, env = "TEMPLAR_INCLUDES")]
    pub includes: Option<PathBuf>,

    /// Program used to build and push images.
    #[arg(long, env = "TEMPLAR_BUILDAH", default_value = "buildah")]
    pub buildah: String,

    #[arg(long, env = "TEMPLAR_REGISTRY_USER", default_value = "")]
    pub registry_user: String,

    #[arg(long, env = "TEMPLAR_REGISTRY_PASS", default_value = "", hide_env_values = true)]
    pub registry_pass: String,

    #[arg(long, env = "TEMPLAR_GIT_USER", default_value = "")]
    pub git_user: String,

    #[arg(long, env = "TEMPLAR_GIT_PASS", default_value = "", hide_env_values = true)]
    pub git_pass: String,
}

impl SettingsArgs {
    pub fn settings(&self) -> Settings {
        Settings {
            template_name: self.template.clone(),
            output_name: self.output_name.clone(),
            source_link: self.source_link.clone(),
            registry: self.registry.clone(),
            alpine_mirror: self.alpine_mirror.clone(),
            registry_credentials: Credentials::new(&self.registry_user, &self.registry_pass),
            git_credentials: Credentials::new(&self.git_user, &self.git_pass),
            buildah: self.buildah.clone(),
            includes_dir: self.includes.clone(),
            ..Settings::default()
        }
    }
}

/// Template engine wired to the live upstream providers.
pub fn engine(settings: &Settings) -> Result<TemplateEngine> {
    TemplateEngine::new(standard_registry(settings), settings.includes_dir.as_deref())
        .context("failed to load include templates")
}
