//! Liveness monitor — periodic sweep demoting stale instances to unhealthy.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hive_store::PluginStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::LivenessSection;

/// Periodically demotes running instances whose heartbeat is absent or older
/// than the configured timeout.
///
/// Runs as a single task: a sweep is always awaited before the next tick, so
/// sweeps can never overlap. Persistence failures during a sweep are logged
/// and the sweep continues with the remaining instances.
pub struct LivenessMonitor {
    store: Arc<dyn PluginStore>,
    sweep_interval: Duration,
    heartbeat_timeout: chrono::Duration,
}

impl LivenessMonitor {
    /// Create a monitor from the liveness config section.
    #[must_use]
    pub fn new(store: Arc<dyn PluginStore>, config: &LivenessSection) -> Self {
        Self {
            store,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            heartbeat_timeout: chrono::Duration::seconds(
                i64::try_from(config.heartbeat_timeout_secs).unwrap_or(i64::MAX),
            ),
        }
    }

    /// Run sweeps until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; the first sweep happens one full
        // interval after startup.
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                () = cancel.cancelled() => {
                    info!("liveness monitor stopped");
                    return;
                }
            }
        }
    }

    /// One sweep: demote every running instance with an absent or stale
    /// heartbeat.
    pub async fn sweep(&self) {
        let cutoff = Utc::now() - self.heartbeat_timeout;
        let stale = match self.store.stale_instances(cutoff).await {
            Ok(stale) => stale,
            Err(err) => {
                error!(error = %err, "failed to query stale instances");
                return;
            }
        };

        for mut inst in stale {
            let session_id = inst.id.clone();
            inst.status = hive_core::PluginStatus::Unhealthy;
            if let Err(err) = self.store.update_instance(inst).await {
                error!(session_id = %session_id, error = %err, "failed to update instance status");
                continue;
            }
            warn!(session_id = %session_id, "plugin unhealthy");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use hive_core::{
        AuthToken, PluginDefinition, PluginId, PluginInstance, PluginStatus, SessionId,
    };
    use hive_store::{MemoryStore, StoreError};

    use super::*;

    fn config(timeout_secs: u64) -> LivenessSection {
        LivenessSection {
            heartbeat_timeout_secs: timeout_secs,
            sweep_interval_secs: 10,
        }
    }

    fn make_instance(id: &str, heartbeat: Option<DateTime<Utc>>) -> PluginInstance {
        let mut inst = PluginInstance::new(
            SessionId::from(id),
            PluginId::from("weather"),
            AuthToken::generate(),
            HashMap::new(),
        );
        inst.last_heartbeat = heartbeat;
        inst
    }

    #[tokio::test]
    async fn sweep_demotes_stale_running_instance() {
        let store = Arc::new(MemoryStore::new());
        let stale = make_instance("inst-stale", Some(Utc::now() - ChronoDuration::seconds(120)));
        store.create_instance(stale).await.unwrap();

        let monitor = LivenessMonitor::new(store.clone(), &config(30));
        monitor.sweep().await;

        let inst = store.get_instance(&SessionId::from("inst-stale")).await.unwrap();
        assert_eq!(inst.status, PluginStatus::Unhealthy);
    }

    #[tokio::test]
    async fn sweep_demotes_never_heartbeated_instance() {
        let store = Arc::new(MemoryStore::new());
        store.create_instance(make_instance("inst-silent", None)).await.unwrap();

        LivenessMonitor::new(store.clone(), &config(30)).sweep().await;

        let inst = store.get_instance(&SessionId::from("inst-silent")).await.unwrap();
        assert_eq!(inst.status, PluginStatus::Unhealthy);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_instance_running() {
        let store = Arc::new(MemoryStore::new());
        store.create_instance(make_instance("inst-fresh", Some(Utc::now()))).await.unwrap();

        LivenessMonitor::new(store.clone(), &config(30)).sweep().await;

        let inst = store.get_instance(&SessionId::from("inst-fresh")).await.unwrap();
        assert_eq!(inst.status, PluginStatus::Running);
    }

    #[tokio::test]
    async fn sweep_leaves_stopped_and_unhealthy_untouched() {
        let store = Arc::new(MemoryStore::new());
        let mut stopped = make_instance("inst-stopped", None);
        stopped.status = PluginStatus::Stopped;
        store.create_instance(stopped).await.unwrap();

        LivenessMonitor::new(store.clone(), &config(30)).sweep().await;

        let inst = store.get_instance(&SessionId::from("inst-stopped")).await.unwrap();
        assert_eq!(inst.status, PluginStatus::Stopped);
    }

    /// Store wrapper that fails `update_instance` for one session id.
    struct FlakyStore {
        inner: MemoryStore,
        fail_for: SessionId,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl hive_store::PluginStore for FlakyStore {
        async fn upsert_definition(&self, def: PluginDefinition) -> hive_store::Result<()> {
            self.inner.upsert_definition(def).await
        }
        async fn get_definition(&self, id: &PluginId) -> hive_store::Result<PluginDefinition> {
            self.inner.get_definition(id).await
        }
        async fn list_definitions(&self) -> hive_store::Result<Vec<PluginDefinition>> {
            self.inner.list_definitions().await
        }
        async fn set_definition_enabled(&self, id: &PluginId, enabled: bool) -> hive_store::Result<()> {
            self.inner.set_definition_enabled(id, enabled).await
        }
        async fn create_instance(&self, inst: PluginInstance) -> hive_store::Result<()> {
            self.inner.create_instance(inst).await
        }
        async fn get_instance(&self, id: &SessionId) -> hive_store::Result<PluginInstance> {
            self.inner.get_instance(id).await
        }
        async fn list_instances(&self) -> hive_store::Result<Vec<PluginInstance>> {
            self.inner.list_instances().await
        }
        async fn update_instance(&self, inst: PluginInstance) -> hive_store::Result<()> {
            if inst.id == self.fail_for {
                self.tripped.store(true, Ordering::Relaxed);
                return Err(StoreError::Backend("simulated write failure".into()));
            }
            self.inner.update_instance(inst).await
        }
        async fn set_instance_enabled(&self, id: &SessionId, enabled: bool) -> hive_store::Result<()> {
            self.inner.set_instance_enabled(id, enabled).await
        }
        async fn stale_instances(
            &self,
            cutoff: DateTime<Utc>,
        ) -> hive_store::Result<Vec<PluginInstance>> {
            self.inner.stale_instances(cutoff).await
        }
    }

    #[tokio::test]
    async fn sweep_continues_past_persistence_failure() {
        let inner = MemoryStore::new();
        inner
            .create_instance(make_instance("inst-a", None))
            .await
            .unwrap();
        inner
            .create_instance(make_instance("inst-b", None))
            .await
            .unwrap();

        let store = Arc::new(FlakyStore {
            inner,
            fail_for: SessionId::from("inst-a"),
            tripped: AtomicBool::new(false),
        });

        LivenessMonitor::new(store.clone(), &config(30)).sweep().await;

        assert!(store.tripped.load(Ordering::Relaxed));
        // The failing row is left as-is; the other one was still demoted.
        let a = store.get_instance(&SessionId::from("inst-a")).await.unwrap();
        let b = store.get_instance(&SessionId::from("inst-b")).await.unwrap();
        assert_eq!(a.status, PluginStatus::Running);
        assert_eq!(b.status, PluginStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_on_the_interval_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        store.create_instance(make_instance("inst-silent", None)).await.unwrap();

        let monitor = LivenessMonitor::new(store.clone(), &config(30));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        // First sweep fires one interval after startup.
        tokio::time::sleep(Duration::from_secs(11)).await;
        let inst = store.get_instance(&SessionId::from("inst-silent")).await.unwrap();
        assert_eq!(inst.status, PluginStatus::Unhealthy);

        cancel.cancel();
        handle.await.unwrap();
    }
}
