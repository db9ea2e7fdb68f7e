//! Wire protocol request/response pairs.
//!
//! Field names here are contractual — plugins in any language build against
//! this JSON shape. Rejections are structured responses, never transport
//! errors, so every response type carries its own success flag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::HiveError;
use crate::events::CoreEvent;
use crate::ids::{AuthToken, SessionId};

/// Sent by a plugin when connecting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Plugin id (definition key).
    pub plugin_id: String,
    /// Plugin build version.
    pub version: String,
    /// Declared coordinator API version.
    pub api_version: String,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Shared-secret token (checked only when security is enabled).
    #[serde(default)]
    pub token: String,
}

/// Coordinator's answer to a handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Whether the session was established.
    pub accepted: bool,
    /// Issued session id (present iff accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Coordinator build version.
    #[serde(default)]
    pub core_version: String,
    /// Initial configuration pushed to the plugin.
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Rejection reason (present iff not accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Issued per-session secret (present iff accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<AuthToken>,
}

impl HandshakeResponse {
    /// Build an accepted response.
    #[must_use]
    pub fn accepted(session_id: SessionId, auth_token: AuthToken, core_version: &str) -> Self {
        Self {
            accepted: true,
            session_id: Some(session_id),
            core_version: core_version.to_owned(),
            config: HashMap::new(),
            error: None,
            auth_token: Some(auth_token),
        }
    }

    /// Build a structured rejection from a protocol error.
    #[must_use]
    pub fn rejected(err: &HiveError) -> Self {
        Self {
            accepted: false,
            session_id: None,
            core_version: String::new(),
            config: HashMap::new(),
            error: Some(err.to_string()),
            auth_token: None,
        }
    }
}

/// Sent periodically by a plugin to prove liveness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Session to refresh.
    pub session_id: SessionId,
    /// Per-session secret issued at handshake.
    pub auth_token: AuthToken,
    /// Free-form status payload.
    #[serde(default)]
    pub status: HashMap<String, String>,
}

/// Coordinator's answer to a heartbeat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Whether the heartbeat was accepted.
    pub ok: bool,
    /// `"ok"` or the rejection reason.
    #[serde(default)]
    pub message: String,
}

impl HeartbeatResponse {
    /// Accepted heartbeat.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: "ok".to_owned(),
        }
    }

    /// Rejected heartbeat with a reason.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Dynamic configuration push (currently acknowledged without effect).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Per-session secret.
    pub auth_token: AuthToken,
    /// Configuration key/value pairs.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Coordinator's answer to a configure request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigureResponse {
    /// Whether the configuration was accepted.
    pub ok: bool,
    /// Failure reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch of queued events returned by the retrieval endpoint.
///
/// `terminated=true` means the session's queue has been closed (the session
/// was unsubscribed or the coordinator stopped) and no further events will
/// ever arrive for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPollResponse {
    /// Events drained from the session's queue, in enqueue order.
    #[serde(default)]
    pub events: Vec<CoreEvent>,
    /// Whether the session's queue is closed.
    #[serde(default)]
    pub terminated: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
