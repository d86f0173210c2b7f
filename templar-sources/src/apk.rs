//! Alpine package index resolution and the `alpine_packages` template function.
//!
//! The index of every configured sub-repository is fetched once per
//! [`PackageIndex`] and merged, later repositories replacing same-named
//! entries. Resolution walks dependencies breadth-first from the requested
//! names and returns every package in the closure with its version.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use tar::Archive;
use tera::Value;

use templar_core::Namespace;
use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

use crate::cache::Memo;
use crate::error::SourceError;
use crate::http::Fetcher;

/// Sub-repositories queried, in merge order.
pub const DEFAULT_REPOSITORIES: [&str; 2] = ["community", "main"];

pub const DEFAULT_ARCH: &str = "x86_64";

/// One record of an `APKINDEX` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    pub provides: Vec<String>,
}

/// Package (or provided) name → record.
pub type Packages = HashMap<String, PackageInfo>;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Drop a version qualifier such as `>=1.2` from a dependency or provides entry.
pub fn strip_version(name: &str) -> &str {
    match name.find(['>', '=', '<', '~']) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

fn store(packages: &mut Packages, record: PackageInfo) {
    if record.name.is_empty() {
        return;
    }
    for provided in &record.provides {
        // Real packages always win over provides entries.
        if provided != &record.name && !packages.contains_key(provided) {
            packages.insert(provided.clone(), record.clone());
        }
    }
    packages.insert(record.name.clone(), record);
}

/// Parse the text of an `APKINDEX` file.
pub fn parse_index(content: &str) -> Packages {
    let mut packages = Packages::new();
    let mut current = PackageInfo::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            store(&mut packages, std::mem::take(&mut current));
        } else if let Some(name) = line.strip_prefix("P:") {
            current.name = name.to_string();
        } else if let Some(version) = line.strip_prefix("V:") {
            current.version = version.to_string();
        } else if let Some(deps) = line.strip_prefix("D:") {
            current
                .dependencies
                .extend(deps.split_whitespace().map(|d| strip_version(d).to_string()));
        } else if let Some(provides) = line.strip_prefix("p:") {
            current
                .provides
                .extend(provides.split_whitespace().map(|p| strip_version(p).to_string()));
        }
    }
    store(&mut packages, current);

    packages
}

/// Extract and parse the `APKINDEX` entry of a gzip-compressed tar archive.
///
/// Alpine ships the signature and the index as concatenated gzip members,
/// so every member is decoded.
pub fn read_index_archive(url: &str, bytes: &[u8]) -> Result<Packages, SourceError> {
    let format_err = |detail: String| SourceError::IndexFormat {
        url: url.to_string(),
        detail,
    };

    let mut archive = Archive::new(MultiGzDecoder::new(bytes));
    let entries = archive.entries().map_err(|e| format_err(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| format_err(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let is_index = entry
            .path()
            .map(|p| &*p == Path::new("APKINDEX"))
            .unwrap_or(false);
        if is_index {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| format_err(e.to_string()))?;
            return Ok(parse_index(&String::from_utf8_lossy(&content)));
        }
    }
    Err(format_err("archive has no APKINDEX entry".to_string()))
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Every package reachable from `names`, by real name, with its version.
///
/// Names starting with `!` are conflict markers and are skipped.
pub fn closure(packages: &Packages, names: &[String]) -> Result<BTreeMap<String, String>, SourceError> {
    let mut resolved = BTreeMap::new();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<&str> = names.iter().map(String::as_str).collect();

    while let Some(name) = queue.pop_front() {
        if name.starts_with('!') || resolved.contains_key(name) || !visited.insert(name) {
            continue;
        }
        let info = packages
            .get(name)
            .ok_or_else(|| SourceError::PackageNotFound(name.to_string()))?;
        resolved.insert(info.name.clone(), info.version.clone());
        queue.extend(info.dependencies.iter().map(String::as_str));
    }

    Ok(resolved)
}

/// Lazily fetched, merged package index for one mirror.
pub struct PackageIndex {
    mirror: String,
    repositories: Vec<String>,
    arch: String,
    fetcher: Arc<dyn Fetcher>,
    packages: Memo<Arc<Packages>>,
}

impl PackageIndex {
    pub fn new(mirror: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            mirror: mirror.into(),
            repositories: DEFAULT_REPOSITORIES.iter().map(|r| r.to_string()).collect(),
            arch: DEFAULT_ARCH.to_string(),
            fetcher,
            packages: Memo::new(),
        }
    }

    pub fn with_repositories<I, S>(mut self, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repositories = repositories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn index_url(&self, repository: &str) -> String {
        format!(
            "{}/latest-stable/{}/{}/APKINDEX.tar.gz",
            self.mirror.trim_end_matches('/'),
            repository,
            self.arch
        )
    }

    /// The merged index, fetched on first use.
    pub fn packages(&self) -> Result<Arc<Packages>, SourceError> {
        self.packages.get_or_try_init(|| {
            let mut merged = Packages::new();
            for repository in &self.repositories {
                let url = self.index_url(repository);
                let bytes = self.fetcher.get_bytes(&url)?;
                let packages = read_index_archive(&url, &bytes)?;
                tracing::info!(repository = %repository, packages = packages.len(), "loaded alpine package index");
                merged.extend(packages);
            }
            Ok(Arc::new(merged))
        })
    }

    pub fn resolve(&self, names: &[String]) -> Result<BTreeMap<String, String>, SourceError> {
        let packages = self.packages()?;
        closure(&packages, names)
    }
}

/// Provides `alpine_packages(names)`.
pub struct AlpinePackagesSource {
    index: Arc<PackageIndex>,
}

impl AlpinePackagesSource {
    pub fn new(index: Arc<PackageIndex>) -> Self {
        Self { index }
    }
}

impl FunctionSource for AlpinePackagesSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let index = Arc::clone(&self.index);
        vec![TemplateFunction::new(
            "alpine_packages",
            ResultKind::Map,
            move |a: &Args| {
                let names = args::string_list(a, "alpine_packages", "names")?;
                let resolved = index.resolve(&names)?;
                let mut out = serde_json::Map::new();
                for (name, version) in resolved {
                    sink.record(&Namespace::Apk.material(&name), &version);
                    out.insert(name, Value::from(version));
                }
                Ok(Value::Object(out))
            },
        )
        .with_stub(requested_names)]
    }
}

/// Dry-run value: every requested name mapped to an empty version, so
/// templates can index the result by the names they asked for.
fn requested_names(a: &Args) -> Value {
    let names = args::string_list(a, "alpine_packages", "names").unwrap_or_default();
    let out = names
        .into_iter()
        .filter(|name| !name.starts_with('!'))
        .map(|name| (name, Value::from("")))
        .collect();
    Value::Object(out)
}
