//! `/health` endpoint payload.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Health check response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the coordinator is running.
    pub status: String,
    /// Seconds since the coordinator started.
    pub uptime_secs: u64,
    /// Sessions currently subscribed to the event bus.
    pub subscribers: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, subscribers: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        subscribers,
    }
}
