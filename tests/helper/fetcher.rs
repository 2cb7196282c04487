//! Scripted fetcher and telemetry doubles

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use pkgmeta::version::error::FetchError;
use pkgmeta::version::fetcher::JsonFetcher;
use pkgmeta::version::telemetry::{RateLimitSnapshot, TagEvent, Telemetry};

/// Scripted response for a URL
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<Value, FetchError>,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(body),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(FetchError::Status {
                status,
                body: body.to_string(),
            }),
        }
    }

    pub fn err(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Fetcher answering from a URL table and counting requests per URL
#[derive(Default)]
pub struct FakeFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, reply: Reply) -> Self {
        self.set(url, reply);
        self
    }

    /// Replaces the reply for `url`
    pub fn set(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), reply);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JsonFetcher for FakeFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(reply) => {
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                reply.result
            }
            None => Err(FetchError::Status {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// Telemetry keeping every event in memory
#[derive(Default)]
pub struct RecordingTelemetry {
    pub tags: Mutex<Vec<TagEvent>>,
    pub rate_limits: Mutex<Vec<RateLimitSnapshot>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tag_events(&self) -> Vec<TagEvent> {
        self.tags.lock().unwrap().clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_tags(&self, event: &TagEvent) {
        self.tags.lock().unwrap().push(event.clone());
    }

    fn record_rate_limit(&self, snapshot: &RateLimitSnapshot) {
        self.rate_limits.lock().unwrap().push(snapshot.clone());
    }
}
