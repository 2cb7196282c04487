//! Upstream sources behind the shared cache

pub mod files;
pub mod github;
pub mod npm;
pub mod rate_limit;

pub use files::{FileListingResolver, ListingKind};
pub use github::GitHubResolver;
pub use npm::NpmResolver;
pub use rate_limit::RateLimitMonitor;
