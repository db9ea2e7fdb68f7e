//! HTTP client for the coordinator's protocol endpoints.

use std::time::Duration;

use hive_core::{
    AuthToken, ConfigureRequest, ConfigureResponse, EventPollResponse, HandshakeRequest,
    HandshakeResponse, HeartbeatRequest, HeartbeatResponse, SessionId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Transport-level failure talking to the coordinator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout, or body decode failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The coordinator answered with a non-success status.
    #[error("coordinator returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        message: String,
    },
}

impl ClientError {
    /// Whether the coordinator reported the resource as gone (unknown
    /// session or closed queue).
    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Api { status: 404 | 410, .. })
    }
}

/// Thin reqwest wrapper over the coordinator's HTTP API.
///
/// Every call carries its own timeout so a hung coordinator can never
/// starve the caller's cancellation.
#[derive(Clone)]
pub struct CoordClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordClient {
    /// Create a client for a coordinator address (`host:port` or a full
    /// `http://` URL).
    #[must_use]
    pub fn new(coordinator_addr: &str) -> Self {
        let base_url = if coordinator_addr.starts_with("http://")
            || coordinator_addr.starts_with("https://")
        {
            coordinator_addr.trim_end_matches('/').to_owned()
        } else {
            format!("http://{}", coordinator_addr.trim_end_matches('/'))
        };
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Base URL this client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<Req, Resp>(
        &self,
        path: &str,
        req: &Req,
        timeout: Duration,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .timeout(timeout)
            .json(req)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Resp, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    /// Perform a handshake.
    pub async fn handshake(
        &self,
        req: &HandshakeRequest,
        timeout: Duration,
    ) -> Result<HandshakeResponse, ClientError> {
        self.post_json("/api/v1/handshake", req, timeout).await
    }

    /// Send one heartbeat.
    pub async fn heartbeat(
        &self,
        req: &HeartbeatRequest,
        timeout: Duration,
    ) -> Result<HeartbeatResponse, ClientError> {
        self.post_json("/api/v1/heartbeat", req, timeout).await
    }

    /// Push a configuration update.
    pub async fn configure(
        &self,
        req: &ConfigureRequest,
        timeout: Duration,
    ) -> Result<ConfigureResponse, ClientError> {
        self.post_json("/api/v1/configure", req, timeout).await
    }

    /// Drain queued coordinator events for a session, waiting server-side
    /// up to `wait_ms` for the first one.
    pub async fn poll_events(
        &self,
        session_id: &SessionId,
        auth_token: &AuthToken,
        wait_ms: u64,
        timeout: Duration,
    ) -> Result<EventPollResponse, ClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/events", self.base_url))
            .timeout(timeout)
            .query(&[
                ("session_id", session_id.as_str()),
                ("auth_token", auth_token.as_str()),
                ("wait_ms", &wait_ms.to_string()),
            ])
            .send()
            .await?;
        Self::decode(response).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addr_gets_http_scheme() {
        let client = CoordClient::new("127.0.0.1:8080");
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn full_url_kept_and_trailing_slash_trimmed() {
        let client = CoordClient::new("https://coord.example.com/");
        assert_eq!(client.base_url(), "https://coord.example.com");
    }

    #[test]
    fn gone_detection() {
        let gone = ClientError::Api {
            status: 404,
            message: String::new(),
        };
        let not_gone = ClientError::Api {
            status: 500,
            message: String::new(),
        };
        assert!(gone.is_gone());
        assert!(!not_gone.is_gone());
    }
}
