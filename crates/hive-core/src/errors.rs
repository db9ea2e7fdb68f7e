//! Error hierarchy for the Hive coordinator.
//!
//! [`HiveError`] covers every failure the protocol surfaces. Request-path
//! failures (handshake, heartbeat, configure) are never returned as errors
//! to the transport — they become structured `accepted=false` / `ok=false`
//! responses — but the variants here carry the reason and a stable
//! machine-readable code for both the wire and the logs.

use thiserror::Error;

use crate::ids::{PluginId, SessionId};

/// Top-level error type for the Hive coordinator.
#[derive(Debug, Error)]
pub enum HiveError {
    /// Presented token does not match the configured shared secret.
    #[error("invalid token")]
    Authentication,

    /// Plugin id is not on the configured allow-list.
    #[error("plugin not allowed")]
    Authorization,

    /// Declared API version is from a different major than the core's.
    #[error("incompatible API version: plugin declared {declared}, core supports {supported}")]
    VersionIncompatible {
        /// API version declared by the plugin.
        declared: String,
        /// API version the core supports.
        supported: String,
    },

    /// Unknown session id.
    #[error("session not found")]
    SessionNotFound(SessionId),

    /// Unknown plugin id.
    #[error("plugin not found")]
    DefinitionNotFound(PluginId),

    /// Persistence gateway failure on a critical path.
    #[error("internal error: {0}")]
    Internal(String),

    /// A subscriber queue was full; the event was dropped, not retried.
    #[error("event queue full for {0}")]
    ChannelFull(SessionId),

    /// Direct send to a session that has no subscriber queue.
    #[error("plugin not found or not subscribed: {0}")]
    NotSubscribed(SessionId),
}

impl HiveError {
    /// Stable machine-readable code for logs and wire payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::VersionIncompatible { .. } => "VERSION_INCOMPATIBLE",
            Self::SessionNotFound(_) | Self::DefinitionNotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ChannelFull(_) => "CHANNEL_FULL",
            Self::NotSubscribed(_) => "NOT_SUBSCRIBED",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_message_matches_wire_contract() {
        assert_eq!(HiveError::Authentication.to_string(), "invalid token");
        assert_eq!(HiveError::Authentication.code(), "AUTHENTICATION_ERROR");
    }

    #[test]
    fn authorization_message_matches_wire_contract() {
        assert_eq!(HiveError::Authorization.to_string(), "plugin not allowed");
    }

    #[test]
    fn version_incompatible_names_both_sides() {
        let err = HiveError::VersionIncompatible {
            declared: "2.0".into(),
            supported: "1.0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2.0"));
        assert!(msg.contains("1.0"));
        assert_eq!(err.code(), "VERSION_INCOMPATIBLE");
    }

    #[test]
    fn session_not_found_message() {
        let err = HiveError::SessionNotFound(SessionId::from("inst-x"));
        assert_eq!(err.to_string(), "session not found");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn bus_error_codes() {
        let id = SessionId::from("inst-1");
        assert_eq!(HiveError::ChannelFull(id.clone()).code(), "CHANNEL_FULL");
        assert_eq!(HiveError::NotSubscribed(id).code(), "NOT_SUBSCRIBED");
    }

    #[test]
    fn is_std_error() {
        let err = HiveError::Internal("gateway down".into());
        let _: &dyn std::error::Error = &err;
    }
}
