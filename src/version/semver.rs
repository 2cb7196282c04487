use std::cmp::Ordering;

use semver::Version;

/// Parse a version string into a semver::Version, normalizing partial versions.
///
/// Handles partial versions like "1" or "1.2" by padding with zeros.
/// Does NOT strip 'v' prefix.
///
/// Examples:
/// - "1" -> Version(1, 0, 0)
/// - "1.2" -> Version(1, 2, 0)
/// - "1.2.3" -> Version(1, 2, 3)
pub fn parse_version(version: &str) -> Option<Version> {
    let parts: Vec<&str> = version.split('.').collect();
    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    };
    Version::parse(&normalized).ok()
}

/// Whether `version` is a pre-release. Unparseable strings are not.
pub fn is_prerelease(version: &str) -> bool {
    parse_version(version).is_some_and(|v| !v.pre.is_empty())
}

/// Orders two version strings, tolerating non-semver input
///
/// Parseable versions compare by semver precedence and rank above anything
/// unparseable; two unparseable strings compare lexically.
pub fn compare_loose(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp_precedence(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Sorts strict semver strings newest first, dropping anything unparseable
pub fn sort_semver_desc(versions: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut parsed: Vec<(String, Version)> = versions
        .into_iter()
        .filter_map(|v| Version::parse(&v).ok().map(|parsed| (v, parsed)))
        .collect();

    parsed.sort_by(|(_, a), (_, b)| b.cmp(a));

    parsed.into_iter().map(|(v, _)| v).collect()
}

/// Sorts version strings newest first using [`compare_loose`]
pub fn sort_loose_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_loose(b, a));
}
