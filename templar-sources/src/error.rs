//! Error types for templar-sources.

use thiserror::Error;

/// All errors that can arise while querying upstream sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure or non-success HTTP status.
    #[error("request to {url} failed: {detail}")]
    Http { url: String, detail: String },

    /// A user-supplied regular expression did not compile.
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// The regular expression did not match (or had no capture group).
    #[error("no match found at {url}")]
    NoMatch { url: String },

    /// A checksum file did not start with a hexadecimal digest.
    #[error("invalid hash found at {url}: {hash}")]
    InvalidChecksum { url: String, hash: String },

    /// The requested package (or one of its dependencies) is not in the index.
    #[error("package required but not found: {0}")]
    PackageNotFound(String),

    /// The package index archive was unreadable or had no `APKINDEX` entry.
    #[error("malformed package index from {url}: {detail}")]
    IndexFormat { url: String, detail: String },

    /// An upstream document did not have the expected shape.
    #[error("unexpected response from {url}: {detail}")]
    UpstreamFormat { url: String, detail: String },

    /// `git ls-remote` could not be run or exited unsuccessfully.
    #[error("git ls-remote {repo} failed: {detail}")]
    GitCommand { repo: String, detail: String },

    /// No acceptable tag or release was found.
    #[error("no suitable release found for {0}")]
    NoRelease(String),

    /// The registry refused the credentials or the token exchange failed.
    #[error("registry authentication failed for {registry}: {detail}")]
    RegistryAuth { registry: String, detail: String },
}

/// Convenience constructor for [`SourceError::UpstreamFormat`].
pub(crate) fn upstream_err(url: &str, detail: impl ToString) -> SourceError {
    SourceError::UpstreamFormat {
        url: url.to_string(),
        detail: detail.to_string(),
    }
}

impl From<SourceError> for tera::Error {
    fn from(err: SourceError) -> Self {
        tera::Error::msg(err.to_string())
    }
}
