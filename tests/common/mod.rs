//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lead_gateway::download::{DownloadRequest, DownloadTrigger};
use lead_gateway::rate_limit::{ManualClock, MemoryStore, RateLimiter, ThrottlePolicy};
use lead_gateway::relay::Web3FormsRelay;
use lead_gateway::submission::WorkflowDeps;
use wiremock::MockServer;

pub const ACCESS_KEY: &str = "test-access-key";
pub const START_MS: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z

/// Download trigger that remembers what it was asked to start.
#[derive(Default)]
pub struct RecordingDownloads {
    pub started: Mutex<Vec<DownloadRequest>>,
}

impl DownloadTrigger for RecordingDownloads {
    fn trigger(&self, request: &DownloadRequest) {
        self.started.lock().unwrap().push(request.clone());
    }
}

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub limiter: Arc<RateLimiter>,
    pub downloads: Arc<RecordingDownloads>,
    pub deps: WorkflowDeps,
}

pub fn relay_for(server: &MockServer) -> Web3FormsRelay {
    Web3FormsRelay::new(reqwest::Client::new(), ACCESS_KEY)
        .with_base_url(server.uri())
        .with_timeout(Duration::from_secs(5))
}

pub fn fixture(server: &MockServer) -> Fixture {
    let clock = Arc::new(ManualClock::new(START_MS));
    let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryStore::new()), clock.clone()));
    let downloads = Arc::new(RecordingDownloads::default());
    let deps = WorkflowDeps {
        limiter: limiter.clone(),
        relay: Arc::new(relay_for(server)),
        downloads: downloads.clone(),
        policy: ThrottlePolicy::default(),
        relay_timeout: Duration::from_secs(5),
        download_delay: Duration::from_millis(50),
    };
    Fixture {
        clock,
        limiter,
        downloads,
        deps,
    }
}
