//! Resolves a requested version specifier against a metadata document
//!
//! Lookup order:
//! 1. an exact entry of `versions`
//! 2. a dist-tag name (e.g. `next`)
//! 3. empty or `latest`: the newest release (pre-releases skipped)
//! 4. anything else as a range: the newest release satisfying it

use crate::version::range::VersionRange;
use crate::version::semver::{compare_loose, is_prerelease, parse_version};
use crate::version::types::MetadataDocument;

const LATEST: &str = "latest";

/// Resolve `spec` to an exact version, or None when nothing matches
pub fn resolve(doc: &MetadataDocument, spec: &str) -> Option<String> {
    if doc.versions.iter().any(|v| v == spec) {
        return Some(spec.to_string());
    }

    if let Some(version) = doc.tags.get(spec) {
        return Some(version.clone());
    }

    let mut releases = doc.versions.iter().filter(|v| !is_prerelease(v));

    if spec.is_empty() || spec == LATEST {
        return releases.next().cloned();
    }

    let range = VersionRange::parse(spec)?;

    releases
        .filter(|v| parse_version(v).is_some_and(|parsed| range.satisfies(&parsed)))
        .max_by(|a, b| compare_loose(a, b))
        .cloned()
}
