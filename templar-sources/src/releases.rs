//! Latest upstream releases: Alpine minirootfs, Go source, PostgreSQL source.

use std::sync::Arc;

use regex::Regex;
use semver::Version;
use serde::Deserialize;
use tera::Value;

use templar_renderer::{args, Args, FunctionSource, MaterialSink, ResultKind, TemplateFunction};

use crate::cache::{Memo, MemoMap};
use crate::error::{upstream_err, SourceError};
use crate::http::{download_hash, Fetcher};

pub const GO_RELEASES_URL: &str = "https://go.dev/dl/?mode=json";
pub const GO_DOWNLOAD_BASE: &str = "https://go.dev/dl/";
pub const POSTGRES_RELEASE_INDEX: &str = "https://ftp.postgresql.org/pub/source/";

/// Major versions that get dedicated `postgres<N>_*` functions.
pub const POSTGRES_MAJORS: std::ops::RangeInclusive<u64> = 13..=17;

/// A downloadable release artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: String,
    pub url: String,
    pub checksum: String,
}

/// Looks up the newest release of each supported upstream.
pub trait ReleaseProvider: Send + Sync {
    fn alpine(&self) -> Result<Release, SourceError>;
    fn golang(&self) -> Result<Release, SourceError>;
    /// Newest stable release whose major version is at most `max_major`.
    fn postgres(&self, max_major: u64) -> Result<Release, SourceError>;
}

// ---------------------------------------------------------------------------
// Upstream documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlpineReleaseEntry {
    flavor: String,
    version: String,
    file: String,
    sha256: String,
}

#[derive(Debug, Deserialize)]
struct GoRelease {
    version: String,
    stable: bool,
    files: Vec<GoFile>,
}

#[derive(Debug, Deserialize)]
struct GoFile {
    filename: String,
    kind: String,
    sha256: String,
}

/// Release lookups against the real upstream sites.
pub struct UpstreamReleases {
    fetcher: Arc<dyn Fetcher>,
    alpine_mirror: String,
    arch: String,
}

impl UpstreamReleases {
    pub fn new(fetcher: Arc<dyn Fetcher>, alpine_mirror: impl Into<String>) -> Self {
        Self {
            fetcher,
            alpine_mirror: alpine_mirror.into(),
            arch: "x86_64".to_string(),
        }
    }

    fn alpine_releases_base(&self) -> String {
        format!(
            "{}/latest-stable/releases/{}/",
            self.alpine_mirror.trim_end_matches('/'),
            self.arch
        )
    }
}

impl ReleaseProvider for UpstreamReleases {
    fn alpine(&self) -> Result<Release, SourceError> {
        let base = self.alpine_releases_base();
        let url = format!("{base}latest-releases.yaml");
        let entries: Vec<AlpineReleaseEntry> =
            serde_yaml::from_str(&self.fetcher.get_text(&url)?).map_err(|e| upstream_err(&url, e))?;
        let entry = entries
            .into_iter()
            .find(|e| e.flavor == "alpine-minirootfs")
            .ok_or_else(|| SourceError::NoRelease("alpine-minirootfs".to_string()))?;
        Ok(Release {
            version: entry.version,
            url: format!("{base}{}", entry.file),
            checksum: entry.sha256,
        })
    }

    fn golang(&self) -> Result<Release, SourceError> {
        let releases: Vec<GoRelease> = serde_json::from_str(&self.fetcher.get_text(GO_RELEASES_URL)?)
            .map_err(|e| upstream_err(GO_RELEASES_URL, e))?;
        let release = releases
            .into_iter()
            .find(|r| r.stable)
            .ok_or_else(|| SourceError::NoRelease("go".to_string()))?;
        let source = release
            .files
            .into_iter()
            .find(|f| f.kind == "source")
            .ok_or_else(|| upstream_err(GO_RELEASES_URL, format!("{} has no source archive", release.version)))?;
        Ok(Release {
            version: release.version.trim_start_matches("go").to_string(),
            url: format!("{GO_DOWNLOAD_BASE}{}", source.filename),
            checksum: source.sha256,
        })
    }

    fn postgres(&self, max_major: u64) -> Result<Release, SourceError> {
        let listing = self.fetcher.get_text(POSTGRES_RELEASE_INDEX)?;
        let version = select_postgres_version(&listing, max_major)
            .ok_or_else(|| SourceError::NoRelease(format!("postgres {max_major}")))?;
        let url = format!("{POSTGRES_RELEASE_INDEX}v{version}/postgresql-{version}.tar.bz2");
        let checksum = download_hash(self.fetcher.as_ref(), &format!("{url}.sha256"))?;
        Ok(Release {
            version,
            url,
            checksum,
        })
    }
}

/// Highest `vX.Y[.Z]/` directory in the PostgreSQL source listing whose major
/// is at most `max_major`. Beta and rc directories never match.
pub fn select_postgres_version(listing: &str, max_major: u64) -> Option<String> {
    let re = Regex::new(r#"href="v(\d+(?:\.\d+){0,2})/""#).ok()?;
    re.captures_iter(listing)
        .filter_map(|caps| {
            let raw = caps[1].to_string();
            let mut parts: Vec<&str> = raw.split('.').collect();
            parts.resize(3, "0");
            let parsed = Version::parse(&parts.join(".")).ok()?;
            (parsed.major <= max_major).then_some((parsed, raw))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw)
}

// ---------------------------------------------------------------------------
// Function sources
// ---------------------------------------------------------------------------

fn url_and_checksum<F>(prefix: &str, material: String, lookup: F, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction>
where
    F: Fn() -> Result<Release, SourceError> + Send + Sync + 'static,
{
    let lookup = Arc::new(lookup);
    let material = Arc::new(material);

    let (url_lookup, url_material, url_sink) = (Arc::clone(&lookup), Arc::clone(&material), Arc::clone(&sink));
    let url = TemplateFunction::new(format!("{prefix}_url"), ResultKind::Text, move |_: &Args| {
        let release = url_lookup()?;
        url_sink.record(&url_material, &release.version);
        Ok(Value::from(release.url))
    });

    let checksum = TemplateFunction::new(format!("{prefix}_checksum"), ResultKind::Text, move |_: &Args| {
        let release = lookup()?;
        sink.record(&material, &release.version);
        Ok(Value::from(release.checksum))
    });

    vec![url, checksum]
}

/// Provides `alpine_url` and `alpine_checksum`.
pub struct AlpineReleaseSource {
    releases: Arc<dyn ReleaseProvider>,
    latest: Arc<Memo<Release>>,
}

impl AlpineReleaseSource {
    pub fn new(releases: Arc<dyn ReleaseProvider>) -> Self {
        Self {
            releases,
            latest: Arc::new(Memo::new()),
        }
    }
}

impl FunctionSource for AlpineReleaseSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let releases = Arc::clone(&self.releases);
        let latest = Arc::clone(&self.latest);
        url_and_checksum(
            "alpine",
            "alpine".to_string(),
            move || latest.get_or_try_init(|| releases.alpine()),
            sink,
        )
    }
}

/// Provides `golang_url` and `golang_checksum`.
pub struct GoReleaseSource {
    releases: Arc<dyn ReleaseProvider>,
    latest: Arc<Memo<Release>>,
}

impl GoReleaseSource {
    pub fn new(releases: Arc<dyn ReleaseProvider>) -> Self {
        Self {
            releases,
            latest: Arc::new(Memo::new()),
        }
    }
}

impl FunctionSource for GoReleaseSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let releases = Arc::clone(&self.releases);
        let latest = Arc::clone(&self.latest);
        url_and_checksum(
            "golang",
            "golang".to_string(),
            move || latest.get_or_try_init(|| releases.golang()),
            sink,
        )
    }
}

/// Provides `postgres<N>_url`/`postgres<N>_checksum` for each of
/// [`POSTGRES_MAJORS`], plus `postgres_url(version)`/`postgres_checksum(version)`.
/// All of them share one cache keyed by major version.
pub struct PostgresReleaseSource {
    releases: Arc<dyn ReleaseProvider>,
    by_major: Arc<MemoMap<u64, Release>>,
}

impl PostgresReleaseSource {
    pub fn new(releases: Arc<dyn ReleaseProvider>) -> Self {
        Self {
            releases,
            by_major: Arc::new(MemoMap::new()),
        }
    }

    fn dynamic(&self, name: &'static str, pick: fn(Release) -> String, sink: Arc<dyn MaterialSink>) -> TemplateFunction {
        let releases = Arc::clone(&self.releases);
        let by_major = Arc::clone(&self.by_major);
        TemplateFunction::new(name, ResultKind::Text, move |a: &Args| {
            let version = args::int(a, name, "version")?;
            let major = u64::try_from(version)
                .map_err(|_| tera::Error::msg(format!("`{name}` version must not be negative, got {version}")))?;
            let release = by_major.get_or_try_insert(&major, || releases.postgres(major))?;
            sink.record(&format!("postgres{major}"), &release.version);
            Ok(Value::from(pick(release)))
        })
    }
}

impl FunctionSource for PostgresReleaseSource {
    fn functions(&self, sink: Arc<dyn MaterialSink>) -> Vec<TemplateFunction> {
        let mut functions = vec![
            self.dynamic("postgres_url", |r| r.url, Arc::clone(&sink)),
            self.dynamic("postgres_checksum", |r| r.checksum, Arc::clone(&sink)),
        ];
        for major in POSTGRES_MAJORS {
            let releases = Arc::clone(&self.releases);
            let by_major = Arc::clone(&self.by_major);
            functions.extend(url_and_checksum(
                &format!("postgres{major}"),
                format!("postgres{major}"),
                move || by_major.get_or_try_insert(&major, || releases.postgres(major)),
                Arc::clone(&sink),
            ));
        }
        functions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSink, StaticFetcher};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LISTING: &str = r#"
<a href="v9.6.24/">v9.6.24/</a>
<a href="v15.6/">v15.6/</a>
<a href="v15.10/">v15.10/</a>
<a href="v16.2/">v16.2/</a>
<a href="v17beta1/">v17beta1/</a>
<a href="v17rc1/">v17rc1/</a>
"#;

    #[test]
    fn postgres_version_respects_major_cap() {
        assert_eq!(select_postgres_version(LISTING, 15).as_deref(), Some("15.10"));
        assert_eq!(select_postgres_version(LISTING, 16).as_deref(), Some("16.2"));
        assert_eq!(select_postgres_version(LISTING, 17).as_deref(), Some("16.2"));
        assert_eq!(select_postgres_version(LISTING, 9).as_deref(), Some("9.6.24"));
        assert_eq!(select_postgres_version(LISTING, 8), None);
    }

    #[test]
    fn postgres_release_from_listing_and_checksum() {
        let fetcher = StaticFetcher::new()
            .with_text(POSTGRES_RELEASE_INDEX, LISTING)
            .with_text(
                "https://ftp.postgresql.org/pub/source/v16.2/postgresql-16.2.tar.bz2.sha256",
                "446e88294dbc2c9085ab4b7061a646fa604b4bec03521d5ea671c2e5ad9b2952  postgresql-16.2.tar.bz2\n",
            );
        let upstream = UpstreamReleases::new(Arc::new(fetcher), "https://m/");
        let release = upstream.postgres(16).unwrap();
        assert_eq!(release.version, "16.2");
        assert_eq!(
            release.url,
            "https://ftp.postgresql.org/pub/source/v16.2/postgresql-16.2.tar.bz2"
        );
        assert!(release.checksum.starts_with("446e8829"));
    }

    #[test]
    fn alpine_minirootfs_entry_is_selected() {
        let yaml = "\
- title: Standard
  flavor: alpine-standard
  version: 3.19.1
  file: alpine-standard-3.19.1-x86_64.iso
  sha256: aaaa
- title: Mini root filesystem
  flavor: alpine-minirootfs
  version: 3.19.1
  file: alpine-minirootfs-3.19.1-x86_64.tar.gz
  sha256: bbbb
";
        let fetcher = StaticFetcher::new().with_text(
            "https://mirror.test/alpine/latest-stable/releases/x86_64/latest-releases.yaml",
            yaml,
        );
        let release = UpstreamReleases::new(Arc::new(fetcher), "https://mirror.test/alpine/")
            .alpine()
            .unwrap();
        assert_eq!(release.version, "3.19.1");
        assert_eq!(
            release.url,
            "https://mirror.test/alpine/latest-stable/releases/x86_64/alpine-minirootfs-3.19.1-x86_64.tar.gz"
        );
        assert_eq!(release.checksum, "bbbb");
    }

    #[test]
    fn go_first_stable_source_archive() {
        let json = r#"[
            {"version": "go1.23rc1", "stable": false, "files": []},
            {"version": "go1.22.1", "stable": true, "files": [
                {"filename": "go1.22.1.linux-amd64.tar.gz", "kind": "archive", "sha256": "aa"},
                {"filename": "go1.22.1.src.tar.gz", "kind": "source", "sha256": "bb"}
            ]}
        ]"#;
        let fetcher = StaticFetcher::new().with_text(GO_RELEASES_URL, json);
        let release = UpstreamReleases::new(Arc::new(fetcher), "https://m/").golang().unwrap();
        assert_eq!(release.version, "1.22.1");
        assert_eq!(release.url, "https://go.dev/dl/go1.22.1.src.tar.gz");
        assert_eq!(release.checksum, "bb");
    }

    /// Counts postgres lookups per major.
    #[derive(Default)]
    struct CountingReleases {
        lookups: AtomicUsize,
    }

    impl ReleaseProvider for CountingReleases {
        fn alpine(&self) -> Result<Release, SourceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Release {
                version: "3.19.1".into(),
                url: "https://alpine/x.tar.gz".into(),
                checksum: "cc".into(),
            })
        }

        fn golang(&self) -> Result<Release, SourceError> {
            Err(SourceError::NoRelease("go".into()))
        }

        fn postgres(&self, max_major: u64) -> Result<Release, SourceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(Release {
                version: format!("{max_major}.1"),
                url: format!("https://pg/{max_major}"),
                checksum: format!("sum{max_major}"),
            })
        }
    }

    fn by_name(functions: Vec<TemplateFunction>) -> HashMap<String, TemplateFunction> {
        functions.into_iter().map(|f| (f.name().to_string(), f)).collect()
    }

    #[test]
    fn alpine_lookup_is_shared_between_url_and_checksum_and_renders() {
        let provider = Arc::new(CountingReleases::default());
        let source = AlpineReleaseSource::new(provider.clone());

        for _ in 0..2 {
            let sink = Arc::new(RecordingSink::default());
            let functions = by_name(source.functions(sink.clone()));
            assert_eq!(
                functions["alpine_url"].call(&Args::new()).unwrap(),
                Value::from("https://alpine/x.tar.gz")
            );
            assert_eq!(functions["alpine_checksum"].call(&Args::new()).unwrap(), Value::from("cc"));
            assert_eq!(sink.get("alpine").as_deref(), Some("3.19.1"));
        }
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn go_failure_propagates() {
        let source = GoReleaseSource::new(Arc::new(CountingReleases::default()));
        let functions = by_name(source.functions(Arc::new(RecordingSink::default())));
        let err = functions["golang_url"].call(&Args::new()).unwrap_err();
        assert!(err.to_string().contains("no suitable release"));
    }

    #[test]
    fn postgres_functions_cover_fixed_and_dynamic_majors() {
        let provider = Arc::new(CountingReleases::default());
        let source = PostgresReleaseSource::new(provider.clone());
        let sink = Arc::new(RecordingSink::default());
        let functions = by_name(source.functions(sink.clone()));

        for major in 13..=17 {
            assert!(functions.contains_key(&format!("postgres{major}_url")));
            assert!(functions.contains_key(&format!("postgres{major}_checksum")));
        }
        assert_eq!(functions.len(), 12);

        assert_eq!(
            functions["postgres15_checksum"].call(&Args::new()).unwrap(),
            Value::from("sum15")
        );
        let mut args = Args::new();
        args.insert("version".into(), Value::from(15));
        assert_eq!(
            functions["postgres_url"].call(&args).unwrap(),
            Value::from("https://pg/15")
        );
        assert_eq!(sink.get("postgres15").as_deref(), Some("15.1"));
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1, "cache is shared per major");

        args.insert("version".into(), Value::from(12));
        functions["postgres_checksum"].call(&args).unwrap();
        assert_eq!(sink.get("postgres12").as_deref(), Some("12.1"));
    }

    #[test]
    fn postgres_rejects_negative_version() {
        let source = PostgresReleaseSource::new(Arc::new(CountingReleases::default()));
        let functions = by_name(source.functions(Arc::new(RecordingSink::default())));
        let mut args = Args::new();
        args.insert("version".into(), Value::from(-1));
        assert!(functions["postgres_url"].call(&args).is_err());
    }
}
