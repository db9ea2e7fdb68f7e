//! Plugin definitions and instances.
//!
//! A [`PluginDefinition`] describes a plugin *kind* (keyed by plugin id) and
//! is overwritten wholesale on every successful handshake for that id. A
//! [`PluginInstance`] is one live session of a kind; it owns the session's
//! auth token and liveness state.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuthToken, PluginId, SessionId};

/// Liveness state of a plugin instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Registered but not currently running.
    Available,
    /// Actively heartbeating.
    Running,
    /// Explicitly disabled.
    Stopped,
    /// Missed its heartbeat window; demoted by the liveness sweep.
    Unhealthy,
}

impl PluginStatus {
    /// Stable string form (matches the wire representation).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "unhealthy" => Ok(Self::Unhealthy),
            other => Err(format!("unknown plugin status: {other}")),
        }
    }
}

/// Registered descriptor of a plugin kind, keyed by plugin id.
///
/// Created or overwritten (last-write-wins, full replace, no merge) on every
/// successful handshake for that id. Never deleted by the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginDefinition {
    /// Globally unique plugin id.
    pub id: PluginId,
    /// Plugin build version, as declared by the plugin.
    pub version: String,
    /// Declared coordinator API version (`major.minor`).
    pub api_version: String,
    /// Ids of plugins this one depends on.
    #[serde(default)]
    pub depends_on: BTreeSet<PluginId>,
    /// Declared capability strings.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Whether handshakes for this kind are administratively enabled.
    pub enabled: bool,
    /// Free-form descriptive metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the definition was first registered.
    pub created_at: DateTime<Utc>,
    /// When the definition was last overwritten.
    pub updated_at: DateTime<Utc>,
}

impl PluginDefinition {
    /// Build a fresh definition as registered by a handshake.
    #[must_use]
    pub fn new(
        id: PluginId,
        version: impl Into<String>,
        api_version: impl Into<String>,
        capabilities: BTreeSet<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: version.into(),
            api_version: api_version.into(),
            depends_on: BTreeSet::new(),
            capabilities,
            enabled: true,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One live session of a plugin kind.
///
/// Created at handshake success with status `running`; demoted to
/// `unhealthy` only by the liveness sweep; resurrected to `running` only by
/// a valid heartbeat; moved to `stopped` only by explicit disable. Never
/// auto-deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginInstance {
    /// Session id (opaque, process-unique).
    pub id: SessionId,
    /// The definition this session belongs to. Always resolves at creation
    /// time because the owning handshake upserts the definition first.
    pub definition_id: PluginId,
    /// Liveness state.
    pub status: PluginStatus,
    /// Whether the instance is administratively enabled.
    pub enabled: bool,
    /// Per-session secret. Never serialized outward.
    #[serde(skip_serializing, default)]
    pub auth_token: AuthToken,
    /// When the last valid heartbeat arrived. `None` means no heartbeat has
    /// ever been recorded, which is distinct from a stale timestamp.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// When the session was established.
    pub started_at: DateTime<Utc>,
    /// Free-form metadata supplied at handshake.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl PluginInstance {
    /// Build the instance created by a successful handshake: status
    /// `running`, heartbeat clock started now.
    #[must_use]
    pub fn new(
        id: SessionId,
        definition_id: PluginId,
        auth_token: AuthToken,
        metadata: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            definition_id,
            status: PluginStatus::Running,
            enabled: true,
            auth_token,
            last_heartbeat: Some(now),
            started_at: now,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
