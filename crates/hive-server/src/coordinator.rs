//! Session protocol — handshake authentication, heartbeat processing, and
//! the administrative operations around plugin definitions and instances.
//!
//! Every inbound request is handled by its own task; there is no global
//! request-serializing lock. Rejections are structured responses, never
//! transport errors. Nothing in here retries — a failed side effect is
//! logged and the caller decides.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hive_core::{
    AuthToken, CORE_VERSION, ConfigureRequest, ConfigureResponse, CoreEvent, EventPollResponse,
    EventType, HandshakeRequest, HandshakeResponse, HeartbeatRequest, HeartbeatResponse,
    HiveError, PluginDefinition, PluginId, PluginInstance, PluginStatus, SessionId,
    api_major_compatible,
};
use hive_store::PluginStore;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::config::CoordConfig;

type Mailbox = Arc<Mutex<mpsc::Receiver<CoreEvent>>>;

/// The coordinator's session protocol and admin surface.
///
/// Owns the persistence gateway, the event bus, and the per-session
/// mailboxes (the receiving halves of the bus queues, drained by the event
/// retrieval endpoint).
pub struct Coordinator {
    store: Arc<dyn PluginStore>,
    bus: Arc<EventBus>,
    config: CoordConfig,
    mailboxes: RwLock<HashMap<SessionId, Mailbox>>,
}

impl Coordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(store: Arc<dyn PluginStore>, bus: Arc<EventBus>, config: CoordConfig) -> Self {
        Self {
            store,
            bus,
            config,
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// The event bus this coordinator publishes through.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The persistence gateway.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    // ── Session protocol ────────────────────────────────────────────────

    /// Process a plugin connection request.
    ///
    /// Validation order (first failure wins, each failure is a structured
    /// rejection): shared-secret token when security is enabled, then the
    /// allow-list when one is configured, then API major-version
    /// compatibility. On success the definition is replaced wholesale, a
    /// fresh session is issued, and a `plugin_connected` broadcast goes out.
    pub async fn handshake(&self, req: HandshakeRequest) -> HandshakeResponse {
        info!(plugin_id = %req.plugin_id, version = %req.version, "handshake request");

        if self.config.security.enabled {
            let secret = self.config.security.shared_secret.as_deref().unwrap_or("");
            if req.token != secret {
                warn!(plugin_id = %req.plugin_id, "handshake rejected: invalid token");
                return HandshakeResponse::rejected(&HiveError::Authentication);
            }
        }

        let allowed = &self.config.security.allowed_plugins;
        if !allowed.is_empty() && !allowed.iter().any(|p| p == &req.plugin_id) {
            warn!(plugin_id = %req.plugin_id, "handshake rejected: not on allow-list");
            return HandshakeResponse::rejected(&HiveError::Authorization);
        }

        if !api_major_compatible(&req.api_version, &self.config.api_version) {
            warn!(
                plugin_id = %req.plugin_id,
                declared = %req.api_version,
                supported = %self.config.api_version,
                "handshake rejected: incompatible API version"
            );
            return HandshakeResponse::rejected(&HiveError::VersionIncompatible {
                declared: req.api_version,
                supported: self.config.api_version.clone(),
            });
        }

        let plugin_id = PluginId::from(req.plugin_id);
        let definition = PluginDefinition::new(
            plugin_id.clone(),
            req.version,
            req.api_version,
            req.capabilities.into_iter().collect(),
            req.metadata.clone(),
        );
        // Non-critical: the instance can still be created if the definition
        // write fails.
        if let Err(err) = self.store.upsert_definition(definition).await {
            error!(plugin_id = %plugin_id, error = %err, "failed to upsert definition");
        }

        let session_id = SessionId::generate();
        let auth_token = AuthToken::generate();
        let instance = PluginInstance::new(
            session_id.clone(),
            plugin_id.clone(),
            auth_token.clone(),
            req.metadata,
        );
        if let Err(err) = self.store.create_instance(instance).await {
            error!(plugin_id = %plugin_id, error = %err, "failed to create instance");
            return HandshakeResponse::rejected(&HiveError::Internal(
                "failed to create instance".into(),
            ));
        }

        let rx = self.bus.subscribe(&session_id).await;
        let _ = self
            .mailboxes
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(rx)));

        self.bus
            .broadcast(CoreEvent::new(EventType::PluginConnected, plugin_id.as_str()));

        info!(plugin_id = %plugin_id, session_id = %session_id, "handshake accepted");
        HandshakeResponse::accepted(session_id, auth_token, CORE_VERSION)
    }

    /// Process a periodic health check from a plugin.
    ///
    /// A valid heartbeat refreshes the liveness clock and always sets the
    /// instance back to `running`, resurrecting one the sweep demoted.
    pub async fn heartbeat(&self, req: HeartbeatRequest) -> HeartbeatResponse {
        let mut instance = match self.store.get_instance(&req.session_id).await {
            Ok(instance) => instance,
            Err(err) if err.is_not_found() => {
                return HeartbeatResponse::rejected("session not found");
            }
            Err(err) => {
                error!(session_id = %req.session_id, error = %err, "failed to load instance");
                return HeartbeatResponse::rejected("internal error");
            }
        };

        if instance.auth_token != req.auth_token {
            return HeartbeatResponse::rejected("invalid auth token");
        }

        instance.last_heartbeat = Some(Utc::now());
        instance.status = PluginStatus::Running;
        if let Err(err) = self.store.update_instance(instance).await {
            // The heartbeat itself is still acknowledged; the next one (or
            // the sweep) reconciles.
            error!(session_id = %req.session_id, error = %err, "failed to update instance");
        }

        HeartbeatResponse::ok()
    }

    /// Acknowledge a dynamic configuration push. Currently a no-op.
    pub async fn configure(&self, _req: ConfigureRequest) -> ConfigureResponse {
        ConfigureResponse {
            ok: true,
            error: None,
        }
    }

    /// Drain queued events for a session, waiting up to `wait` for the
    /// first one.
    ///
    /// A closed queue means the session was terminated (unsubscribed or the
    /// coordinator stopped); the response says so and the mailbox is
    /// forgotten.
    pub async fn poll_events(
        &self,
        session_id: &SessionId,
        auth_token: &AuthToken,
        wait: Duration,
    ) -> Result<EventPollResponse, HiveError> {
        let instance = self.store.get_instance(session_id).await.map_err(|err| {
            if err.is_not_found() {
                HiveError::SessionNotFound(session_id.clone())
            } else {
                HiveError::Internal(err.to_string())
            }
        })?;
        if &instance.auth_token != auth_token {
            return Err(HiveError::Authentication);
        }

        let mailbox = self
            .mailboxes
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| HiveError::NotSubscribed(session_id.clone()))?;

        let mut rx = mailbox.lock().await;
        let mut events = Vec::new();
        let mut terminated = false;

        if wait.is_zero() {
            drain(&mut rx, &mut events, &mut terminated);
        } else {
            match tokio::time::timeout(wait, rx.recv()).await {
                Err(_) => {} // nothing arrived inside the window
                Ok(Some(event)) => {
                    events.push(event);
                    drain(&mut rx, &mut events, &mut terminated);
                }
                Ok(None) => terminated = true,
            }
        }
        drop(rx);

        if terminated {
            let _ = self.mailboxes.write().await.remove(session_id);
        }
        Ok(EventPollResponse { events, terminated })
    }

    // ── Event delivery ──────────────────────────────────────────────────

    /// Enqueue an event for one session.
    pub async fn send_to_plugin(
        &self,
        session_id: &SessionId,
        event: CoreEvent,
    ) -> Result<(), HiveError> {
        self.bus.send_direct(session_id, event).await.map_err(Into::into)
    }

    /// Broadcast an event to every subscribed session.
    pub fn broadcast(&self, event: CoreEvent) {
        self.bus.broadcast(event);
    }

    /// Tear down a session: emit `plugin_disconnected` (carrying the plugin
    /// id when the instance still resolves) and close the session's queue.
    pub async fn disconnect(&self, session_id: &SessionId) {
        let plugin_id = match self.store.get_instance(session_id).await {
            Ok(instance) => instance.definition_id.into_inner(),
            Err(_) => String::new(),
        };

        self.bus
            .broadcast(CoreEvent::new(EventType::PluginDisconnected, plugin_id.clone()));
        self.bus.unsubscribe(session_id).await;
        let _ = self.mailboxes.write().await.remove(session_id);

        info!(session_id = %session_id, plugin_id = %plugin_id, "plugin disconnected");
    }

    // ── Admin surface ───────────────────────────────────────────────────

    /// All registered definitions.
    pub async fn list_definitions(&self) -> Result<Vec<PluginDefinition>, HiveError> {
        self.store
            .list_definitions()
            .await
            .map_err(|err| HiveError::Internal(err.to_string()))
    }

    /// One definition by plugin id.
    pub async fn get_definition(&self, id: &PluginId) -> Result<PluginDefinition, HiveError> {
        self.store.get_definition(id).await.map_err(|err| {
            if err.is_not_found() {
                HiveError::DefinitionNotFound(id.clone())
            } else {
                HiveError::Internal(err.to_string())
            }
        })
    }

    /// Flip a definition's enabled flag.
    pub async fn set_definition_enabled(
        &self,
        id: &PluginId,
        enabled: bool,
    ) -> Result<(), HiveError> {
        self.store.set_definition_enabled(id, enabled).await.map_err(|err| {
            if err.is_not_found() {
                HiveError::DefinitionNotFound(id.clone())
            } else {
                HiveError::Internal(err.to_string())
            }
        })
    }

    /// All instance rows.
    pub async fn list_instances(&self) -> Result<Vec<PluginInstance>, HiveError> {
        self.store
            .list_instances()
            .await
            .map_err(|err| HiveError::Internal(err.to_string()))
    }

    /// One instance by session id.
    pub async fn get_instance(&self, id: &SessionId) -> Result<PluginInstance, HiveError> {
        self.store.get_instance(id).await.map_err(|err| {
            if err.is_not_found() {
                HiveError::SessionNotFound(id.clone())
            } else {
                HiveError::Internal(err.to_string())
            }
        })
    }

    /// Enable or disable an instance.
    ///
    /// Disabling moves the instance to `stopped` and sends it a direct
    /// `shutdown` event, best effort.
    pub async fn set_instance_enabled(
        &self,
        id: &SessionId,
        enabled: bool,
    ) -> Result<(), HiveError> {
        let mut instance = self.get_instance(id).await?;
        instance.enabled = enabled;
        if !enabled {
            instance.status = PluginStatus::Stopped;
            if let Err(err) = self
                .bus
                .send_direct(id, CoreEvent::new(EventType::Shutdown, "instance disabled"))
                .await
            {
                warn!(session_id = %id, error = %err, "failed to notify disabled instance");
            }
        }
        self.store
            .update_instance(instance)
            .await
            .map_err(|err| HiveError::Internal(err.to_string()))
    }
}

/// Pull everything already queued; flips `terminated` if the queue turns
/// out to be closed.
fn drain(
    rx: &mut mpsc::Receiver<CoreEvent>,
    events: &mut Vec<CoreEvent>,
    terminated: &mut bool,
) {
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(mpsc::error::TryRecvError::Empty) => return,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                *terminated = true;
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
