//! In-memory gateway implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_core::{PluginDefinition, PluginId, PluginInstance, PluginStatus, SessionId};
use parking_lot::RwLock;

use crate::errors::{Result, StoreError};
use crate::store::PluginStore;

/// Map-backed store with per-row atomicity via one lock per table.
///
/// Suitable for tests and for coordinators that do not need state to
/// survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    definitions: RwLock<HashMap<PluginId, PluginDefinition>>,
    instances: RwLock<HashMap<SessionId, PluginInstance>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStore for MemoryStore {
    async fn upsert_definition(&self, mut def: PluginDefinition) -> Result<()> {
        let mut defs = self.definitions.write();
        if let Some(existing) = defs.get(&def.id) {
            def.created_at = existing.created_at;
        }
        def.updated_at = Utc::now();
        let _ = defs.insert(def.id.clone(), def);
        Ok(())
    }

    async fn get_definition(&self, id: &PluginId) -> Result<PluginDefinition> {
        self.definitions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::definition_not_found(id.as_str()))
    }

    async fn list_definitions(&self) -> Result<Vec<PluginDefinition>> {
        let mut defs: Vec<_> = self.definitions.read().values().cloned().collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(defs)
    }

    async fn set_definition_enabled(&self, id: &PluginId, enabled: bool) -> Result<()> {
        let mut defs = self.definitions.write();
        let def = defs
            .get_mut(id)
            .ok_or_else(|| StoreError::definition_not_found(id.as_str()))?;
        def.enabled = enabled;
        def.updated_at = Utc::now();
        Ok(())
    }

    async fn create_instance(&self, inst: PluginInstance) -> Result<()> {
        let mut instances = self.instances.write();
        if instances.contains_key(&inst.id) {
            return Err(StoreError::Duplicate(inst.id.as_str().to_owned()));
        }
        let _ = instances.insert(inst.id.clone(), inst);
        Ok(())
    }

    async fn get_instance(&self, id: &SessionId) -> Result<PluginInstance> {
        self.instances
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::instance_not_found(id.as_str()))
    }

    async fn list_instances(&self) -> Result<Vec<PluginInstance>> {
        let mut instances: Vec<_> = self.instances.read().values().cloned().collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    async fn update_instance(&self, mut inst: PluginInstance) -> Result<()> {
        let mut instances = self.instances.write();
        if !instances.contains_key(&inst.id) {
            return Err(StoreError::instance_not_found(inst.id.as_str()));
        }
        inst.updated_at = Utc::now();
        let _ = instances.insert(inst.id.clone(), inst);
        Ok(())
    }

    async fn set_instance_enabled(&self, id: &SessionId, enabled: bool) -> Result<()> {
        let mut instances = self.instances.write();
        let inst = instances
            .get_mut(id)
            .ok_or_else(|| StoreError::instance_not_found(id.as_str()))?;
        inst.enabled = enabled;
        inst.updated_at = Utc::now();
        Ok(())
    }

    async fn stale_instances(&self, cutoff: DateTime<Utc>) -> Result<Vec<PluginInstance>> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|inst| {
                inst.status == PluginStatus::Running
                    && inst.last_heartbeat.is_none_or(|at| at < cutoff)
            })
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
