//! File listings of published package versions

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::version::cache::{Load, SharedCache};
use crate::version::error::{FetchError, RegistryError};
use crate::version::fetcher::JsonFetcher;
use crate::version::store::ListingStore;
use crate::version::types::{FileListing, PackageName, RepoId};

/// Where a listed package is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Npm,
    GitHub,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Npm => "npm",
            ListingKind::GitHub => "gh",
        }
    }

    fn validate(&self, name: &str) -> Result<(), RegistryError> {
        match self {
            ListingKind::Npm => PackageName::parse(name).map(|_| ()),
            ListingKind::GitHub => RepoId::parse(name).map(|_| ()),
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    default: Option<String>,
    files: Vec<Value>,
}

/// Resolves the file listing of one package version
pub struct FileListingResolver {
    fetcher: Arc<dyn JsonFetcher>,
    source: Arc<str>,
    listing_path: Arc<str>,
    store: Option<Arc<dyn ListingStore>>,
    cache: SharedCache<FileListing, RegistryError>,
}

impl FileListingResolver {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        source: &str,
        listing_path: &str,
        store: Option<Arc<dyn ListingStore>>,
    ) -> Self {
        Self {
            fetcher,
            source: source.trim_end_matches('/').into(),
            listing_path: listing_path.trim_matches('/').into(),
            store,
            cache: SharedCache::new(),
        }
    }

    /// Returns the listing of `name@version`
    ///
    /// The persisted store is consulted before the network. A denied listing
    /// is returned as [`FileListing::Denied`] and cached like a success.
    pub async fn resolve_files(
        &self,
        kind: ListingKind,
        name: &str,
        version: &str,
        max_age: Duration,
    ) -> Result<FileListing, RegistryError> {
        kind.validate(name)?;
        // Listings are stored forever, so only immutable exact versions are accepted
        if semver::Version::parse(version).is_err() {
            return Err(RegistryError::Validation(format!(
                "expected an exact version, got {:?}",
                version
            )));
        }

        let key = format!("files/{}/{}@{}", kind, name, version);
        let request = ListingRequest {
            fetcher: Arc::clone(&self.fetcher),
            url: format!(
                "{}/{}/{}@{}/{}",
                self.source, kind, name, version, self.listing_path
            ),
            store: self.store.clone(),
            kind,
            name: name.to_string(),
            version: version.to_string(),
        };

        self.cache
            .get(&key, move || request.load(max_age), max_age)
            .await
    }
}

struct ListingRequest {
    fetcher: Arc<dyn JsonFetcher>,
    url: String,
    store: Option<Arc<dyn ListingStore>>,
    kind: ListingKind,
    name: String,
    version: String,
}

impl ListingRequest {
    async fn load(self, max_age: Duration) -> Load<FileListing, RegistryError> {
        if let Some(listing) = self.stored() {
            debug!("Listing store hit for {}/{}@{}", self.kind, self.name, self.version);
            return Load::Fresh(listing);
        }

        match self.fetcher.fetch_json(&self.url).await {
            Ok(body) => match serde_json::from_value::<ListingResponse>(body) {
                Ok(response) => {
                    let listing = FileListing::Files {
                        default: response.default,
                        files: response.files,
                    };
                    self.persist(&listing);
                    Load::Fresh(listing)
                }
                Err(e) => {
                    warn!("Invalid file listing for {}@{}: {}", self.name, self.version, e);
                    Load::Failed(RegistryError::Validation(e.to_string()))
                }
            },
            Err(FetchError::Status { status: 403, body }) => {
                info!("File listing denied for {}@{}", self.name, self.version);
                Load::Fresh(FileListing::Denied {
                    status: 403,
                    message: denial_message(&body),
                })
            }
            Err(FetchError::Status { status: 404, .. }) => Load::Settled {
                result: Err(RegistryError::NotFound(format!(
                    "{}@{}",
                    self.name, self.version
                ))),
                max_age,
            },
            Err(e) => {
                warn!(
                    "Failed to fetch file listing for {}@{}: {}",
                    self.name, self.version, e
                );
                Load::Failed(e.into())
            }
        }
    }

    fn stored(&self) -> Option<FileListing> {
        let store = self.store.as_ref()?;
        match store.get(self.kind.as_str(), &self.name, &self.version) {
            Ok(listing) => listing,
            Err(e) => {
                error!("Failed to read listing store: {}", e);
                None
            }
        }
    }

    fn persist(&self, listing: &FileListing) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.put(self.kind.as_str(), &self.name, &self.version, listing) {
            error!(
                "Failed to store listing for {}@{}: {}",
                self.name, self.version, e
            );
        }
    }
}

/// Upstream `message` field when present, otherwise the raw body
fn denial_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::error::StoreError;
    use crate::version::fetcher::{HttpFetcher, MockJsonFetcher};
    use crate::version::store::{MockListingStore, SqliteListingStore};
    use mockito::Server;
    use serde_json::json;

    const MAX_AGE: Duration = Duration::from_secs(60);

    fn files(default: &str) -> FileListing {
        FileListing::Files {
            default: Some(default.to_string()),
            files: vec![json!({"name": default, "hash": "abc", "size": 42})],
        }
    }

    #[tokio::test]
    async fn resolve_files_fetches_and_persists_listing() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/npm/lodash@4.17.21/flat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"default": "/lodash.js", "files": [{"name": "/lodash.js", "hash": "abc", "size": 42}]}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(SqliteListingStore::in_memory().unwrap());
        let resolver = FileListingResolver::new(
            Arc::new(HttpFetcher::new()),
            &server.url(),
            "flat",
            Some(store.clone()),
        );

        let first = resolver
            .resolve_files(ListingKind::Npm, "lodash", "4.17.21", MAX_AGE)
            .await
            .unwrap();
        let second = resolver
            .resolve_files(ListingKind::Npm, "lodash", "4.17.21", MAX_AGE)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(first, files("/lodash.js"));
        assert_eq!(first, second);
        assert_eq!(
            store.get("npm", "lodash", "4.17.21").unwrap(),
            Some(files("/lodash.js"))
        );
    }

    #[tokio::test]
    async fn resolve_files_uses_stored_listing_without_fetching() {
        let mut fetcher = MockJsonFetcher::new();
        fetcher.expect_fetch_json().times(0);

        let mut store = MockListingStore::new();
        store
            .expect_get()
            .withf(|kind, name, version| kind == "gh" && name == "jquery/jquery" && version == "3.7.1")
            .times(1)
            .returning(|_, _, _| Ok(Some(files("/dist/jquery.js"))));
        store.expect_put().times(0);

        let resolver = FileListingResolver::new(
            Arc::new(fetcher),
            "https://data.example",
            "flat",
            Some(Arc::new(store)),
        );
        let result = resolver
            .resolve_files(ListingKind::GitHub, "jquery/jquery", "3.7.1", MAX_AGE)
            .await
            .unwrap();

        assert_eq!(result, files("/dist/jquery.js"));
    }

    #[tokio::test]
    async fn resolve_files_ignores_store_failures() {
        let mut fetcher = MockJsonFetcher::new();
        fetcher
            .expect_fetch_json()
            .times(1)
            .returning(|_| Ok(json!({"files": []})));

        let mut store = MockListingStore::new();
        store
            .expect_get()
            .returning(|_, _, _| Err(StoreError::LockPoisoned));
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Err(StoreError::LockPoisoned));

        let resolver = FileListingResolver::new(
            Arc::new(fetcher),
            "https://data.example",
            "flat",
            Some(Arc::new(store)),
        );
        let result = resolver
            .resolve_files(ListingKind::Npm, "left-pad", "1.3.0", MAX_AGE)
            .await
            .unwrap();

        assert_eq!(
            result,
            FileListing::Files {
                default: None,
                files: vec![]
            }
        );
    }

    #[tokio::test]
    async fn resolve_files_caches_denied_listing_without_persisting() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/npm/huge-package@1.0.0/flat")
            .with_status(403)
            .with_body(r#"{"status": 403, "message": "Package size exceeded the configured limit of 150 MB."}"#)
            .expect(1)
            .create_async()
            .await;

        let mut store = MockListingStore::new();
        store.expect_get().returning(|_, _, _| Ok(None));
        store.expect_put().times(0);

        let resolver = FileListingResolver::new(
            Arc::new(HttpFetcher::new()),
            &server.url(),
            "flat",
            Some(Arc::new(store)),
        );

        for _ in 0..2 {
            let result = resolver
                .resolve_files(ListingKind::Npm, "huge-package", "1.0.0", MAX_AGE)
                .await
                .unwrap();
            assert_eq!(
                result,
                FileListing::Denied {
                    status: 403,
                    message: "Package size exceeded the configured limit of 150 MB.".to_string()
                }
            );
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn resolve_files_caches_not_found() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/npm/lodash@0.0.0-missing/flat")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let resolver =
            FileListingResolver::new(Arc::new(HttpFetcher::new()), &server.url(), "flat", None);

        for _ in 0..2 {
            let result = resolver
                .resolve_files(ListingKind::Npm, "lodash", "0.0.0-missing", MAX_AGE)
                .await;
            assert!(matches!(result, Err(RegistryError::NotFound(_))));
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn resolve_files_rejects_listing_without_files() {
        let mut fetcher = MockJsonFetcher::new();
        fetcher
            .expect_fetch_json()
            .times(2)
            .returning(|_| Ok(json!({"default": "/index.js"})));

        let resolver =
            FileListingResolver::new(Arc::new(fetcher), "https://data.example", "flat", None);

        for _ in 0..2 {
            let result = resolver
                .resolve_files(ListingKind::Npm, "react", "18.2.0", MAX_AGE)
                .await;
            assert!(matches!(result, Err(RegistryError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn resolve_files_rejects_invalid_identifiers() {
        let mut fetcher = MockJsonFetcher::new();
        fetcher.expect_fetch_json().times(0);

        let resolver =
            FileListingResolver::new(Arc::new(fetcher), "https://data.example", "flat", None);

        let bad_repo = resolver
            .resolve_files(ListingKind::GitHub, "not-a-repo", "1.0.0", MAX_AGE)
            .await;
        let bad_version = resolver
            .resolve_files(ListingKind::Npm, "react", "", MAX_AGE)
            .await;

        assert!(matches!(bad_repo, Err(RegistryError::Validation(_))));
        assert!(matches!(bad_version, Err(RegistryError::Validation(_))));
    }

    #[rstest::rstest]
    #[case("latest")]
    #[case("^1")]
    #[case("1.0")]
    #[case("v1.0.0")]
    #[case("1.0.0/../../../admin")]
    #[case("1.0.0?x=1")]
    #[tokio::test]
    async fn resolve_files_rejects_versions_that_are_not_exact(#[case] version: &str) {
        let mut fetcher = MockJsonFetcher::new();
        fetcher.expect_fetch_json().times(0);

        let mut store = MockListingStore::new();
        store.expect_get().times(0);
        store.expect_put().times(0);

        let resolver = FileListingResolver::new(
            Arc::new(fetcher),
            "https://data.example",
            "flat",
            Some(Arc::new(store)),
        );
        let result = resolver
            .resolve_files(ListingKind::Npm, "lodash", version, MAX_AGE)
            .await;

        assert!(matches!(result, Err(RegistryError::Validation(_))));
    }

    #[tokio::test]
    async fn resolve_files_accepts_prerelease_versions() {
        let mut fetcher = MockJsonFetcher::new();
        fetcher
            .expect_fetch_json()
            .withf(|url| url == "https://data.example/npm/react@19.0.0-rc.1/flat")
            .times(1)
            .returning(|_| Ok(json!({"files": []})));

        let resolver =
            FileListingResolver::new(Arc::new(fetcher), "https://data.example", "flat", None);

        assert!(
            resolver
                .resolve_files(ListingKind::Npm, "react", "19.0.0-rc.1", MAX_AGE)
                .await
                .is_ok()
        );
    }

    #[rstest::rstest]
    #[case(r#"{"message": "Forbidden"}"#, "Forbidden")]
    #[case("plain text", "plain text")]
    fn denial_message_prefers_message_field(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(denial_message(body), expected);
    }
}
