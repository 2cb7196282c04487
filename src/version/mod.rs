//! Package metadata layer
//!
//! Fetches version metadata from npm registries and GitHub, keeps it in a
//! single-flight cache, and resolves version specifiers against it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Fetcher   │────▶│ Registries  │────▶│    Cache    │
//! │ (JSON/HTTP) │     │(npm,gh,file)│     │(single-flt) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │    Store    │     │  Resolver   │
//!                     │  (listings) │     │ (spec→ver)  │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: In-process single-flight TTL cache
//! - [`fetcher`]: JSON fetcher with timeout and parse retries
//! - [`registries`]: npm, GitHub tags, file listings and rate limit monitor
//! - [`resolver`]: Picks a concrete version for a specifier
//! - [`range`]: npm-style version ranges
//! - [`store`]: SQLite store for immutable file listings
//! - [`telemetry`]: Diagnostic events
//! - [`error`]: Error types for fetch, registry and store operations
//! - [`semver`]: Shared semver utilities
//! - [`types`]: Metadata documents and validated identifiers

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod range;
pub mod registries;
pub mod resolver;
pub mod semver;
pub mod store;
pub mod telemetry;
pub mod types;
