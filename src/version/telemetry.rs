//! Diagnostic events reported to an external collaborator

#[cfg(test)]
use mockall::automock;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Result of a GitHub tag lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagEvent {
    pub owner: String,
    pub repo: String,
    pub tag_count: Option<usize>,
    pub not_found: bool,
    pub rate_limited: bool,
    pub blocked: bool,
}

impl TagEvent {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            ..Self::default()
        }
    }
}

/// Core API quota as reported by GitHub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset: DateTime<Utc>,
}

/// Trait for receiving diagnostic events
#[cfg_attr(test, automock)]
pub trait Telemetry: Send + Sync {
    fn record_tags(&self, event: &TagEvent);

    fn record_rate_limit(&self, snapshot: &RateLimitSnapshot);
}

/// Telemetry sink writing events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record_tags(&self, event: &TagEvent) {
        info!(
            owner = %event.owner,
            repo = %event.repo,
            tag_count = ?event.tag_count,
            not_found = event.not_found,
            rate_limited = event.rate_limited,
            blocked = event.blocked,
            "github tags"
        );
    }

    fn record_rate_limit(&self, snapshot: &RateLimitSnapshot) {
        if snapshot.remaining == 0 {
            warn!(
                limit = snapshot.limit,
                reset = %snapshot.reset,
                "github rate limit exhausted"
            );
        } else {
            info!(
                limit = snapshot.limit,
                remaining = snapshot.remaining,
                reset = %snapshot.reset,
                "github rate limit"
            );
        }
    }
}
