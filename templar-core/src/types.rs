//! Domain types shared by every templar crate.
//!
//! All path fields use `PathBuf`; project identity is the directory base name.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A project, identified by the base name of the directory holding its template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl ProjectName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Material identifiers
// ---------------------------------------------------------------------------

/// Namespace prefix of a material identifier.
///
/// Bare materials (`alpine`, `golang`, `postgres15`) have no namespace and are
/// recorded under their plain name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Apk,
    Git,
    Github,
    Image,
    RegexUrl,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Apk => "apk",
            Namespace::Git => "git",
            Namespace::Github => "github",
            Namespace::Image => "image",
            Namespace::RegexUrl => "regexurl",
        }
    }

    /// Build the ledger identifier `<prefix>:<subject>`.
    pub fn material(&self, subject: &str) -> String {
        format!("{}:{subject}", self.prefix())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

// ---------------------------------------------------------------------------
// Image references
// ---------------------------------------------------------------------------

/// Whether an image reference names its registry explicitly.
///
/// A reference is fully qualified when a `.` appears before the first `/`
/// (`docker.io/library/alpine`, `registry.example.com/other`). Anything else
/// (`base`, `team/base`, `alpine.3`) refers to an image in the configured
/// registry, i.e. a local project.
pub fn is_qualified_reference(reference: &str) -> bool {
    match (reference.find('.'), reference.find('/')) {
        (Some(dot), Some(slash)) => dot < slash,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
