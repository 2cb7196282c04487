//! GitHub tags API implementation

use std::sync::Arc;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GITHUB_PAGE_SIZE;
use crate::version::cache::{Load, SharedCache};
use crate::version::error::{FetchError, RegistryError};
use crate::version::fetcher::JsonFetcher;
use crate::version::semver::sort_loose_desc;
use crate::version::telemetry::{TagEvent, Telemetry};
use crate::version::types::{MetadataDocument, RepoId};

/// Tag entry from the GitHub tags API
#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Resolves the tags of a GitHub repository as versions
pub struct GitHubResolver {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: Arc<str>,
    telemetry: Arc<dyn Telemetry>,
    cache: SharedCache<MetadataDocument, RegistryError>,
}

impl GitHubResolver {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: &str,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').into(),
            telemetry,
            cache: SharedCache::new(),
        }
    }

    /// Fetches every tag of `owner/repo`
    ///
    /// Results are cached for `max_age` under `gh/<owner>/<repo>`. A missing
    /// or blocked repository is cached for twice as long; plain rate limiting
    /// is not cached.
    pub async fn resolve_tags(
        &self,
        owner: &str,
        repo: &str,
        max_age: Duration,
    ) -> Result<MetadataDocument, RegistryError> {
        let repo = RepoId::new(owner, repo)?;
        let key = format!("gh/{}", repo);
        let fetcher = Arc::clone(&self.fetcher);
        let base_url = Arc::clone(&self.base_url);
        let telemetry = Arc::clone(&self.telemetry);

        self.cache
            .get(
                &key,
                move || async move {
                    load_tags(fetcher.as_ref(), &base_url, telemetry.as_ref(), &repo, max_age)
                        .await
                },
                max_age,
            )
            .await
    }
}

async fn load_tags(
    fetcher: &dyn JsonFetcher,
    base_url: &str,
    telemetry: &dyn Telemetry,
    repo: &RepoId,
    max_age: Duration,
) -> Load<MetadataDocument, RegistryError> {
    let mut event = TagEvent::new(&repo.owner, &repo.repo);
    let mut names = Vec::new();

    for page in 1.. {
        let url = format!(
            "{}/repos/{}/{}/tags?per_page={}&page={}",
            base_url, repo.owner, repo.repo, GITHUB_PAGE_SIZE, page
        );

        let body = match fetcher.fetch_json(&url).await {
            Ok(body) => body,
            Err(e) => return classify_failure(e, repo, &mut event, telemetry, max_age),
        };

        let tags: Vec<Tag> = match serde_json::from_value(body) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Failed to parse GitHub tags response for {}: {}", repo, e);
                return Load::Failed(RegistryError::Validation(e.to_string()));
            }
        };

        let count = tags.len();
        names.extend(tags.into_iter().map(|t| t.name));
        debug!("Fetched {} tags from page {} of {}", count, page, repo);

        if count < GITHUB_PAGE_SIZE {
            break;
        }
    }

    let versions = normalize_tags(names);
    event.tag_count = Some(versions.len());
    telemetry.record_tags(&event);

    Load::Fresh(MetadataDocument::new(IndexMap::new(), versions))
}

fn classify_failure(
    e: FetchError,
    repo: &RepoId,
    event: &mut TagEvent,
    telemetry: &dyn Telemetry,
    max_age: Duration,
) -> Load<MetadataDocument, RegistryError> {
    let load = match e {
        FetchError::Status { status: 404, .. } => {
            event.not_found = true;
            Load::Settled {
                result: Err(RegistryError::NotFound(repo.to_string())),
                max_age: max_age * 2,
            }
        }
        FetchError::Status { status: 403, body } if is_blocked(&body) => {
            warn!("GitHub blocked access to {}", repo);
            event.rate_limited = true;
            event.blocked = true;
            Load::Settled {
                result: Err(RegistryError::RateLimited { blocked: true }),
                max_age: max_age * 2,
            }
        }
        FetchError::Status { status: 403, .. } => {
            // Not cached: the next caller goes straight back to GitHub
            warn!("GitHub rate limit hit while fetching tags of {}", repo);
            event.rate_limited = true;
            Load::Failed(RegistryError::RateLimited { blocked: false })
        }
        e => {
            warn!("Failed to fetch tags of {}: {}", repo, e);
            return Load::Failed(e.into());
        }
    };

    telemetry.record_tags(event);
    load
}

/// Whether a 403 body carries GitHub's block object rather than a rate limit
fn is_blocked(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("block").map(Value::is_object))
        .unwrap_or(false)
}

/// Strips a leading `v`, removes duplicates and sorts newest first
pub fn normalize_tags(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let unique: IndexSet<String> = names
        .into_iter()
        .map(|name| match name.strip_prefix('v') {
            Some(stripped) => stripped.to_string(),
            None => name,
        })
        .collect();

    let mut versions: Vec<String> = unique.into_iter().collect();
    sort_loose_desc(&mut versions);
    versions
}
