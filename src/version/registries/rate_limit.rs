//! Periodic report of the GitHub API quota

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::version::error::RegistryError;
use crate::version::fetcher::JsonFetcher;
use crate::version::telemetry::{RateLimitSnapshot, Telemetry};

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: Resources,
}

#[derive(Debug, Deserialize)]
struct Resources {
    core: CoreQuota,
}

#[derive(Debug, Deserialize)]
struct CoreQuota {
    limit: u64,
    remaining: u64,
    /// Unix seconds
    reset: i64,
}

pub struct RateLimitMonitor {
    fetcher: Arc<dyn JsonFetcher>,
    url: String,
    telemetry: Arc<dyn Telemetry>,
    interval: Duration,
}

impl RateLimitMonitor {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        base_url: &str,
        telemetry: Arc<dyn Telemetry>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            url: format!("{}/rate_limit", base_url.trim_end_matches('/')),
            telemetry,
            interval,
        }
    }

    /// Fetches the core quota once and reports it
    pub async fn poll_once(&self) -> Result<RateLimitSnapshot, RegistryError> {
        let body = self.fetcher.fetch_json(&self.url).await?;
        let response: RateLimitResponse = serde_json::from_value(body)
            .map_err(|e| RegistryError::Validation(e.to_string()))?;

        let core = response.resources.core;
        let reset = DateTime::<Utc>::from_timestamp(core.reset, 0).ok_or_else(|| {
            RegistryError::Validation(format!("invalid reset timestamp: {}", core.reset))
        })?;
        let snapshot = RateLimitSnapshot {
            limit: core.limit,
            remaining: core.remaining,
            reset,
        };

        self.telemetry.record_rate_limit(&snapshot);
        Ok(snapshot)
    }

    /// Polls every interval until the returned handle is aborted
    ///
    /// The first poll happens immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.poll_once().await {
                    Ok(snapshot) => debug!("GitHub quota: {}/{}", snapshot.remaining, snapshot.limit),
                    Err(e) => warn!("Failed to poll GitHub rate limit: {}", e),
                }
            }
        })
    }
}
