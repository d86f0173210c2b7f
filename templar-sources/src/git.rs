//! Latest-tag lookups for git repositories.

use std::process::Command;
use std::sync::Arc;

use semver::Version;
use tera::Value;

use templar_core::{Credentials, Namespace};
use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

use crate::error::SourceError;

/// Lists the tag names of a remote repository.
pub trait TagProvider: Send + Sync {
    fn tags(&self, repo: &str) -> Result<Vec<String>, SourceError>;
}

/// [`TagProvider`] that shells out to `git ls-remote`.
#[derive(Debug, Clone)]
pub struct GitLsRemote {
    program: String,
    credentials: Credentials,
}

impl GitLsRemote {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            program: "git".to_string(),
            credentials,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// `repo` with credentials embedded, for https URLs only.
    fn authenticated_url(&self, repo: &str) -> String {
        match (self.credentials.non_empty(), repo.strip_prefix("https://")) {
            (Some(creds), Some(rest)) => {
                format!("https://{}:{}@{}", creds.username, creds.password, rest)
            }
            _ => repo.to_string(),
        }
    }
}

impl TagProvider for GitLsRemote {
    fn tags(&self, repo: &str) -> Result<Vec<String>, SourceError> {
        tracing::debug!(repo, "listing remote tags");
        let output = Command::new(&self.program)
            .args(["ls-remote", "--tags", "--refs"])
            .arg(self.authenticated_url(repo))
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| SourceError::GitCommand {
                repo: repo.to_string(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SourceError::GitCommand {
                repo: repo.to_string(),
                detail: format!("status {}: {}", output.status, stderr),
            });
        }

        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Tag names from `git ls-remote --tags --refs` output.
pub fn parse_ls_remote(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|reference| reference.strip_prefix("refs/tags/"))
        .map(str::to_string)
        .collect()
}

/// Parse a tag as a version, tolerating a leading `v` and missing
/// minor/patch components. Pre-releases and date-like tags are rejected.
fn tag_version(tag: &str, prefix: &str) -> Option<Version> {
    let trimmed = tag.strip_prefix(prefix).unwrap_or(tag);
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let mut padded = parts.clone();
    padded.resize(3, "0");
    let version = Version::parse(&format!("{}{}", padded.join("."), rest)).ok()?;

    if !version.pre.is_empty() {
        return None;
    }
    if parts[0].len() >= 4 && version.major >= 1900 {
        return None;
    }
    Some(version)
}

/// Highest release tag, in its original spelling.
pub fn select_latest_tag(tags: &[String], prefix: &str) -> Option<String> {
    tags.iter()
        .filter_map(|tag| tag_version(tag, prefix).map(|v| (v, tag)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.clone())
}

fn latest_tag(provider: &dyn TagProvider, repo: &str, prefix: &str) -> Result<String, SourceError> {
    let tags = provider.tags(repo)?;
    select_latest_tag(&tags, prefix).ok_or_else(|| SourceError::NoRelease(repo.to_string()))
}

/// Provides `git_tag`, `prefixed_git_tag`, `github_tag` and `prefixed_github_tag`.
pub struct GitSource {
    tags: Arc<dyn TagProvider>,
}

impl GitSource {
    pub fn new(tags: Arc<dyn TagProvider>) -> Self {
        Self { tags }
    }
}

fn tag_function(
    name: &'static str,
    namespace: Namespace,
    prefixed: bool,
    tags: Arc<dyn TagProvider>,
    sink: Arc<dyn MaterialSink>,
) -> TemplateFunction {
    TemplateFunction::new(name, ResultKind::Text, move |a: &Args| {
        let repo = args::string(a, name, "repo")?;
        let prefix = if prefixed {
            args::string(a, name, "prefix")?
        } else {
            String::new()
        };
        let url = match namespace {
            Namespace::Github => format!("https://github.com/{repo}"),
            _ => repo.clone(),
        };

        let tag = latest_tag(tags.as_ref(), &url, &prefix)?;
        let recorded = tag.strip_prefix(prefix.as_str()).unwrap_or(&tag);
        sink.record(&namespace.material(&repo), recorded);
        Ok(Value::from(tag))
    })
}

impl FunctionSource for GitSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        [
            ("git_tag", Namespace::Git, false),
            ("prefixed_git_tag", Namespace::Git, true),
            ("github_tag", Namespace::Github, false),
            ("prefixed_github_tag", Namespace::Github, true),
        ]
        .into_iter()
        .map(|(name, namespace, prefixed)| {
            tag_function(name, namespace, prefixed, Arc::clone(&self.tags), Arc::clone(&sink))
        })
        .collect()
    }
}
