//! Data model shared by the resolvers

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::error::RegistryError;

/// Versions and dist-tags of one package or repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Tag name to exact version, in upstream order
    pub tags: IndexMap<String, String>,
    /// Unique versions, newest first
    pub versions: Vec<String>,
}

impl MetadataDocument {
    pub fn new(tags: IndexMap<String, String>, versions: Vec<String>) -> Self {
        Self { tags, versions }
    }
}

/// Outcome of a file listing lookup
///
/// A denied listing is a regular value: it is cached and passed through with
/// its upstream status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FileListing {
    Files {
        default: Option<String>,
        files: Vec<serde_json::Value>,
    },
    Denied {
        status: u16,
        message: String,
    },
}

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:@[a-z0-9][a-z0-9._~-]*/)?[a-z0-9][a-z0-9._~-]*$").expect("valid regex")
});

static REPO_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").expect("valid regex"));

const MAX_PACKAGE_NAME_LEN: usize = 214;

/// Validated npm package name, optionally scoped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn parse(name: &str) -> Result<Self, RegistryError> {
        if name.len() > MAX_PACKAGE_NAME_LEN || !PACKAGE_NAME.is_match(name) {
            return Err(RegistryError::Validation(format!(
                "invalid package name: {:?}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name as it appears in a registry URL (`@scope/name` -> `@scope%2Fname`)
    pub fn url_encoded(&self) -> String {
        if self.0.starts_with('@') {
            self.0.replace('/', "%2F")
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated GitHub `owner/repo` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: &str, repo: &str) -> Result<Self, RegistryError> {
        let valid = |segment: &str| {
            REPO_SEGMENT.is_match(segment) && segment != "." && segment != ".."
        };
        if !valid(owner) || !valid(repo) {
            return Err(RegistryError::Validation(format!(
                "invalid repository: {}/{}",
                owner, repo
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Parses `owner/repo`
    pub fn parse(slug: &str) -> Result<Self, RegistryError> {
        match slug.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Err(RegistryError::Validation(format!(
                "expected owner/repo, got {:?}",
                slug
            ))),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
