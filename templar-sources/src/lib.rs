//! # templar-sources
//!
//! Template function sources backed by upstream services: Alpine package
//! indexes, container registries, git remotes, arbitrary web pages and
//! release feeds, plus a few value helpers.
//!
//! Every network-facing lookup sits behind a trait ([`Fetcher`],
//! [`DigestProvider`], [`TagProvider`], [`ReleaseProvider`]) so a registry
//! can be assembled from in-memory doubles with [`registry_from`].

pub mod apk;
pub mod cache;
pub mod error;
pub mod git;
pub mod http;
pub mod image;
pub mod releases;
pub mod util;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use templar_core::Settings;
use templar_renderer::FunctionRegistry;

pub use apk::{AlpinePackagesSource, PackageIndex, PackageInfo};
pub use error::SourceError;
pub use git::{GitLsRemote, GitSource, TagProvider};
pub use http::{Fetcher, HttpSource, UreqFetcher};
pub use image::{DigestProvider, ImageReference, ImageSource, RegistryClient};
pub use releases::{
    AlpineReleaseSource, GoReleaseSource, PostgresReleaseSource, Release, ReleaseProvider,
    UpstreamReleases,
};
pub use util::UtilSource;

/// The upstream lookups a registry is assembled from.
#[derive(Clone)]
pub struct Providers {
    pub fetcher: Arc<dyn Fetcher>,
    pub digests: Arc<dyn DigestProvider>,
    pub tags: Arc<dyn TagProvider>,
    pub releases: Arc<dyn ReleaseProvider>,
}

impl Providers {
    /// Live providers configured from `settings`.
    pub fn upstream(settings: &Settings) -> Self {
        let fetcher = UreqFetcher::new();
        let digests = RegistryClient::new(
            fetcher.agent().clone(),
            &settings.registry,
            settings.registry_credentials.clone(),
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        Self {
            releases: Arc::new(UpstreamReleases::new(Arc::clone(&fetcher), &settings.alpine_mirror)),
            digests: Arc::new(digests),
            tags: Arc::new(GitLsRemote::new(settings.git_credentials.clone())),
            fetcher,
        }
    }
}

/// Registry with every standard function, talking to the real upstreams.
pub fn standard_registry(settings: &Settings) -> FunctionRegistry {
    registry_from(settings, Providers::upstream(settings))
}

/// Registry with every standard function, using `providers` for lookups.
pub fn registry_from(settings: &Settings, providers: Providers) -> FunctionRegistry {
    let index = PackageIndex::new(&settings.alpine_mirror, Arc::clone(&providers.fetcher));

    FunctionRegistry::new()
        .with(AlpinePackagesSource::new(Arc::new(index)))
        .with(ImageSource::new(&settings.registry, providers.digests))
        .with(GitSource::new(providers.tags))
        .with(HttpSource::new(providers.fetcher))
        .with(AlpineReleaseSource::new(Arc::clone(&providers.releases)))
        .with(GoReleaseSource::new(Arc::clone(&providers.releases)))
        .with(PostgresReleaseSource::new(providers.releases))
        .with(UtilSource)
}
