//! Wires fetchers, resolvers and collaborators from a [`Config`]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::version::error::RegistryError;
use crate::version::fetcher::{HttpFetcher, JsonFetcher};
use crate::version::registries::{
    FileListingResolver, GitHubResolver, ListingKind, NpmResolver, RateLimitMonitor,
};
use crate::version::resolver::resolve;
use crate::version::store::ListingStore;
use crate::version::telemetry::Telemetry;
use crate::version::types::{FileListing, MetadataDocument, RepoId};

/// Outcome of resolving a specifier against a package or repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub document: MetadataDocument,
    /// None when no version satisfies the specifier
    pub version: Option<String>,
}

pub struct Service {
    max_age: Duration,
    npm: NpmResolver,
    github: GitHubResolver,
    files: FileListingResolver,
    monitor: Option<RateLimitMonitor>,
}

impl Service {
    pub fn from_config(
        config: &Config,
        store: Option<Arc<dyn ListingStore>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let fetcher: Arc<dyn JsonFetcher> = Arc::new(HttpFetcher::new());
        let github_fetcher: Arc<dyn JsonFetcher> =
            Arc::new(HttpFetcher::github(config.github.token.as_deref()));

        Self::with_fetchers(config, fetcher, github_fetcher, store, telemetry)
    }

    /// Like [`Service::from_config`] with explicit fetchers for registries and GitHub
    pub fn with_fetchers(
        config: &Config,
        fetcher: Arc<dyn JsonFetcher>,
        github_fetcher: Arc<dyn JsonFetcher>,
        store: Option<Arc<dyn ListingStore>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let monitor = (config.github.rate_limit_poll_ms > 0).then(|| {
            RateLimitMonitor::new(
                Arc::clone(&github_fetcher),
                &config.github.base_url,
                Arc::clone(&telemetry),
                Duration::from_millis(config.github.rate_limit_poll_ms),
            )
        });

        Self {
            max_age: config.cache.max_age(),
            npm: NpmResolver::new(Arc::clone(&fetcher), config.npm.sources.clone()),
            github: GitHubResolver::new(github_fetcher, &config.github.base_url, telemetry),
            files: FileListingResolver::new(
                fetcher,
                &config.files.source,
                &config.files.listing_path,
                store,
            ),
            monitor,
        }
    }

    pub async fn npm_metadata(&self, name: &str) -> Result<MetadataDocument, RegistryError> {
        self.npm.resolve_metadata(name, self.max_age).await
    }

    pub async fn github_tags(&self, repo: &RepoId) -> Result<MetadataDocument, RegistryError> {
        self.github
            .resolve_tags(&repo.owner, &repo.repo, self.max_age)
            .await
    }

    pub async fn files(
        &self,
        kind: ListingKind,
        name: &str,
        version: &str,
    ) -> Result<FileListing, RegistryError> {
        self.files
            .resolve_files(kind, name, version, self.max_age)
            .await
    }

    pub async fn resolve_npm(&self, name: &str, spec: &str) -> Result<Resolution, RegistryError> {
        let document = self.npm_metadata(name).await?;
        let version = resolve(&document, spec);
        Ok(Resolution { document, version })
    }

    pub async fn resolve_github(
        &self,
        repo: &RepoId,
        spec: &str,
    ) -> Result<Resolution, RegistryError> {
        let document = self.github_tags(repo).await?;
        let version = resolve(&document, spec);
        Ok(Resolution { document, version })
    }

    /// Starts the rate limit monitor; None when polling is disabled or
    /// the monitor was already started
    pub fn spawn_rate_limit_monitor(&mut self) -> Option<JoinHandle<()>> {
        let monitor = self.monitor.take()?;
        info!("Starting GitHub rate limit monitor");
        Some(monitor.spawn())
    }
}
