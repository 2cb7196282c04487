//! npm registry metadata with fallback across several sources

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::version::cache::{Load, SharedCache};
use crate::version::error::{FetchError, RegistryError};
use crate::version::fetcher::JsonFetcher;
use crate::version::semver::sort_semver_desc;
use crate::version::types::{MetadataDocument, PackageName};

/// Response from npm registry API
#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(rename = "dist-tags", default)]
    dist_tags: IndexMap<String, String>,
    versions: Option<IndexMap<String, Value>>,
}

/// Resolves package metadata from one or more npm-compatible registries
pub struct NpmResolver {
    fetcher: Arc<dyn JsonFetcher>,
    sources: Arc<[String]>,
    cache: SharedCache<MetadataDocument, RegistryError>,
}

impl NpmResolver {
    /// Creates a resolver querying `sources`; on total failure the error of
    /// the first source is reported
    pub fn new(fetcher: Arc<dyn JsonFetcher>, sources: Vec<String>) -> Self {
        let sources = sources
            .into_iter()
            .map(|s| s.trim_end_matches('/').to_string())
            .collect();
        Self {
            fetcher,
            sources,
            cache: SharedCache::new(),
        }
    }

    /// Fetches the versions and dist-tags of `name`
    ///
    /// Results are cached for `max_age` under `npm/<name>`. A 404 is cached
    /// for the same duration; other failures are not cached.
    pub async fn resolve_metadata(
        &self,
        name: &str,
        max_age: Duration,
    ) -> Result<MetadataDocument, RegistryError> {
        let name = PackageName::parse(name)?;
        let key = format!("npm/{}", name);
        let fetcher = Arc::clone(&self.fetcher);
        let sources = Arc::clone(&self.sources);

        self.cache
            .get(
                &key,
                move || async move {
                    match fetch_first_success(fetcher.as_ref(), &sources, &name).await {
                        Ok(body) => Load::from(build_document(&name, body)),
                        Err(FetchError::Status { status: 404, .. }) => {
                            info!("Package not found: {}", name);
                            Load::Settled {
                                result: Err(RegistryError::NotFound(name.to_string())),
                                max_age,
                            }
                        }
                        Err(e) => {
                            warn!("Failed to fetch npm metadata for {}: {}", name, e);
                            Load::Failed(e.into())
                        }
                    }
                },
                max_age,
            )
            .await
    }
}

/// Queries every source concurrently and returns the first success
///
/// When all sources fail, the failure of the first configured source is
/// returned so callers always see the same error for the same setup.
async fn fetch_first_success(
    fetcher: &dyn JsonFetcher,
    sources: &[String],
    name: &PackageName,
) -> Result<Value, FetchError> {
    let path = name.url_encoded();

    if let [source] = sources {
        return fetcher.fetch_json(&format!("{}/{}", source, path)).await;
    }

    let mut pending: FuturesUnordered<_> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let url = format!("{}/{}", source, path);
            async move { (i, fetcher.fetch_json(&url).await) }
        })
        .collect();

    let mut failures: Vec<Option<FetchError>> = vec![None; sources.len()];
    while let Some((i, result)) = pending.next().await {
        match result {
            Ok(body) => return Ok(body),
            Err(e) => {
                warn!("Registry {} failed for {}: {}", sources[i], name, e);
                failures[i] = Some(e);
            }
        }
    }

    Err(failures
        .into_iter()
        .next()
        .flatten()
        .unwrap_or_else(|| FetchError::Transport("no registry sources configured".to_string())))
}

fn build_document(name: &PackageName, body: Value) -> Result<MetadataDocument, RegistryError> {
    let package: NpmPackageResponse = serde_json::from_value(body).map_err(|e| {
        warn!("Failed to parse npm registry response for {}: {}", name, e);
        RegistryError::Validation(e.to_string())
    })?;

    let versions = package.versions.ok_or_else(|| {
        RegistryError::Validation(format!("response for {} has no versions", name))
    })?;

    Ok(MetadataDocument::new(
        package.dist_tags,
        sort_semver_desc(versions.into_keys()),
    ))
}
