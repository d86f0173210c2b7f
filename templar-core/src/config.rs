//! Run-wide settings.
//!
//! Built once by the CLI (flags with `TEMPLAR_*` environment fallbacks) and
//! passed by reference to the sources, detector and sync pipeline.

use std::fmt;
use std::path::PathBuf;

/// Default Alpine mirror used for release and package index lookups.
pub const DEFAULT_ALPINE_MIRROR: &str = "https://dl-cdn.alpinelinux.org/alpine/";

/// Username/password pair for an upstream service.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `None` unless a username is configured.
    pub fn non_empty(&self) -> Option<&Credentials> {
        if self.username.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

// Keep passwords out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Everything a generation run needs to know that is not a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// File name that marks a directory as a project.
    pub template_name: String,
    /// File name written into `<output>/<project>/`.
    pub output_name: String,
    /// Browsable link to the source repository, prefixed to template paths.
    pub source_link: String,
    /// Registry used for unqualified image references, builds and pushes.
    pub registry: String,
    /// Base URL of the Alpine mirror.
    pub alpine_mirror: String,
    /// Credentials for image digest lookups.
    pub registry_credentials: Credentials,
    /// Credentials for git tag lookups over https.
    pub git_credentials: Credentials,
    /// Additional push attempts after the first failure.
    pub push_retries: u32,
    /// Program invoked for image builds and pushes.
    pub buildah: String,
    /// Directory of shared `.tera` include templates.
    pub includes_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_name: "Dockerfile.tera".to_string(),
            output_name: "Dockerfile".to_string(),
            source_link: "https://github.com/example/repo/blob/master/".to_string(),
            registry: "registry.example.com".to_string(),
            alpine_mirror: DEFAULT_ALPINE_MIRROR.to_string(),
            registry_credentials: Credentials::default(),
            git_credentials: Credentials::default(),
            push_retries: 2,
            buildah: "buildah".to_string(),
            includes_dir: None,
        }
    }
}
