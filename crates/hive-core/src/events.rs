//! Event envelopes and the well-known event vocabulary.
//!
//! [`CoreEvent`] flows coordinator → plugin (direct or broadcast).
//! [`PluginEvent`] is the reserved plugin → coordinator direction; the
//! coordinator does not consume it yet but the wire shape is contractual.

use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Well-known event types the coordinator emits or understands.
///
/// The wire carries a plain string so plugins may define their own types;
/// this enum is the vocabulary the coordinator itself uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A plugin completed a handshake. Data carries the plugin id.
    PluginConnected,
    /// A plugin session was disconnected. Data carries the plugin id.
    PluginDisconnected,
    /// The coordinator (or an admin) is asking the plugin to shut down.
    Shutdown,
    /// Configuration changed; the plugin should re-read its config.
    ConfigUpdate,
    /// The plugin should restart itself.
    Restart,
    /// The plugin should change its log level. Data carries the level.
    LogLevel,
    /// The coordinator is asking for a status report.
    StatusQuery,
}

impl EventType {
    /// Stable wire string for this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PluginConnected => "plugin_connected",
            Self::PluginDisconnected => "plugin_disconnected",
            Self::Shutdown => "shutdown",
            Self::ConfigUpdate => "config_update",
            Self::Restart => "restart",
            Self::LogLevel => "log_level",
            Self::StatusQuery => "status_query",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification pushed from the coordinator to a plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoreEvent {
    /// Event type string (one of [`EventType`] for coordinator-emitted
    /// events, or free-form).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    #[serde(default)]
    pub data: String,
}

impl CoreEvent {
    /// Build an event with a well-known type.
    #[must_use]
    pub fn new(event_type: EventType, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.as_str().to_owned(),
            data: data.into(),
        }
    }

    /// Build an event with a free-form type string.
    #[must_use]
    pub fn custom(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

/// Reserved plugin → coordinator event envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    /// Session the event originates from.
    pub session_id: SessionId,
    /// Event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload.
    #[serde(default)]
    pub data: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_strings() {
        assert_eq!(EventType::PluginConnected.as_str(), "plugin_connected");
        assert_eq!(EventType::PluginDisconnected.as_str(), "plugin_disconnected");
        assert_eq!(EventType::Shutdown.as_str(), "shutdown");
        assert_eq!(EventType::ConfigUpdate.as_str(), "config_update");
        assert_eq!(EventType::Restart.as_str(), "restart");
        assert_eq!(EventType::LogLevel.as_str(), "log_level");
        assert_eq!(EventType::StatusQuery.as_str(), "status_query");
    }

    #[test]
    fn event_type_serde_matches_as_str() {
        let json = serde_json::to_string(&EventType::ConfigUpdate).unwrap();
        assert_eq!(json, "\"config_update\"");
    }

    #[test]
    fn core_event_serializes_type_field() {
        let event = CoreEvent::new(EventType::Shutdown, "system shutting down");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "shutdown");
        assert_eq!(json["data"], "system shutting down");
    }

    #[test]
    fn core_event_custom_type() {
        let event = CoreEvent::custom("cache_invalidate", "users");
        assert_eq!(event.event_type, "cache_invalidate");
    }

    #[test]
    fn core_event_data_defaults_empty() {
        let event: CoreEvent = serde_json::from_str(r#"{"type":"restart"}"#).unwrap();
        assert_eq!(event.event_type, "restart");
        assert!(event.data.is_empty());
    }

    #[test]
    fn plugin_event_round_trip() {
        let event = PluginEvent {
            session_id: SessionId::from("inst-9"),
            event_type: "status_report".into(),
            data: "healthy".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"session_id\""));
        assert!(json.contains("\"type\""));
        let back: PluginEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
