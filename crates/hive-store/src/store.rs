//! The `PluginStore` gateway trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_core::{PluginDefinition, PluginId, PluginInstance, SessionId};

use crate::errors::Result;

/// CRUD gateway for plugin definitions and instances.
///
/// Implementations must provide per-row atomicity: concurrent writers to the
/// same definition id resolve last-write-wins with no merging, and an
/// instance update never interleaves with another write to the same row.
/// Nothing here retries; callers decide what a failure means.
#[async_trait]
pub trait PluginStore: Send + Sync {
    /// Create or wholesale-replace a definition (last-write-wins).
    ///
    /// `created_at` of an existing row is preserved; every other field is
    /// replaced by the incoming value.
    async fn upsert_definition(&self, def: PluginDefinition) -> Result<()>;

    /// Fetch a definition by plugin id.
    async fn get_definition(&self, id: &PluginId) -> Result<PluginDefinition>;

    /// All registered definitions.
    async fn list_definitions(&self) -> Result<Vec<PluginDefinition>>;

    /// Flip a definition's enabled flag.
    async fn set_definition_enabled(&self, id: &PluginId, enabled: bool) -> Result<()>;

    /// Insert a new instance row. Fails on a duplicate session id.
    async fn create_instance(&self, inst: PluginInstance) -> Result<()>;

    /// Fetch an instance by session id.
    async fn get_instance(&self, id: &SessionId) -> Result<PluginInstance>;

    /// All instance rows.
    async fn list_instances(&self) -> Result<Vec<PluginInstance>>;

    /// Replace an existing instance row.
    async fn update_instance(&self, inst: PluginInstance) -> Result<()>;

    /// Flip an instance's enabled flag.
    async fn set_instance_enabled(&self, id: &SessionId, enabled: bool) -> Result<()>;

    /// Running instances whose last heartbeat is absent or older than
    /// `cutoff` — the liveness sweep's input.
    async fn stale_instances(&self, cutoff: DateTime<Utc>) -> Result<Vec<PluginInstance>>;
}
