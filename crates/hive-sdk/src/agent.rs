//! The plugin-side session agent state machine.
//!
//! `Disconnected → Handshaking → Connected → Stopping → Disconnected`.
//!
//! [`PluginAgent::start`] performs exactly one handshake bounded by the
//! caller's deadline; any rejection or transport failure lands back in
//! `Disconnected` with no background work spawned. On acceptance two loops
//! run under one shared cancellation scope: the heartbeat loop and, when a
//! handler is configured, the event retrieval loop. [`PluginAgent::stop`]
//! cancels the scope and blocks until both loops have observably exited.
//!
//! Neither loop retries, backs off, or reconnects; a transport error is
//! logged and the next tick tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hive_core::{AuthToken, CoreEvent, HandshakeRequest, HeartbeatRequest, SessionId};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{ClientError, CoordClient};

/// Sub-timeout applied to every heartbeat call.
const HEARTBEAT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Sub-timeout applied to every event poll call.
const EVENT_POLL_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback invoked synchronously for each retrieved coordinator event.
pub type EventHandler = Arc<dyn Fn(CoreEvent) + Send + Sync>;

/// Failure starting the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The coordinator answered but refused the session.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// The handshake never completed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// `start` was called while the agent was not disconnected.
    #[error("agent already started")]
    AlreadyStarted,
}

/// Agent lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    /// No session, no background work.
    Disconnected,
    /// Handshake in flight.
    Handshaking,
    /// Session established; loops running.
    Connected,
    /// `stop` is joining the loops.
    Stopping,
}

/// Static configuration for a plugin agent.
#[derive(Clone)]
pub struct AgentConfig {
    /// Plugin id to register under.
    pub plugin_id: String,
    /// Plugin build version.
    pub version: String,
    /// Coordinator API version this plugin speaks.
    pub api_version: String,
    /// Coordinator address (`host:port` or full URL).
    pub coordinator_addr: String,
    /// Shared-secret token (empty when the coordinator runs open).
    pub token: String,
    /// Declared capabilities.
    pub capabilities: Vec<String>,
    /// Free-form metadata sent at handshake.
    pub metadata: HashMap<String, String>,
    /// Interval between heartbeats.
    pub heartbeat_interval: Duration,
    /// Interval between event polls.
    pub event_poll_interval: Duration,
    /// Called for each coordinator event. The event loop only runs when
    /// this is set.
    pub event_handler: Option<EventHandler>,
}

impl AgentConfig {
    /// Config with the conventional defaults: API version `1.0`, 10s
    /// heartbeats, 5s event polls, no handler.
    #[must_use]
    pub fn new(plugin_id: impl Into<String>, coordinator_addr: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            version: "0.0.0".into(),
            api_version: hive_core::CORE_API_VERSION.into(),
            coordinator_addr: coordinator_addr.into(),
            token: String::new(),
            capabilities: Vec::new(),
            metadata: HashMap::new(),
            heartbeat_interval: Duration::from_secs(10),
            event_poll_interval: Duration::from_secs(5),
            event_handler: None,
        }
    }
}

#[derive(Clone)]
struct Session {
    session_id: SessionId,
    auth_token: AuthToken,
}

/// Worker-side state machine driving handshake, heartbeat loop, and event
/// retrieval loop.
pub struct PluginAgent {
    config: AgentConfig,
    client: CoordClient,
    state: Mutex<AgentState>,
    session: Mutex<Option<Session>>,
    cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PluginAgent {
    /// Create an agent in the `Disconnected` state.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let client = CoordClient::new(&config.coordinator_addr);
        Self {
            config,
            client,
            state: Mutex::new(AgentState::Disconnected),
            session: Mutex::new(None),
            cancel: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    /// The established session id, if connected.
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.lock().as_ref().map(|s| s.session_id.clone())
    }

    /// Perform exactly one handshake bounded by `deadline` and, on
    /// acceptance, spawn the background loops.
    ///
    /// Any rejection or transport failure leaves the agent `Disconnected`
    /// with no partial state.
    pub async fn start(&self, deadline: Duration) -> Result<(), AgentError> {
        {
            let mut state = self.state.lock();
            if *state != AgentState::Disconnected {
                return Err(AgentError::AlreadyStarted);
            }
            *state = AgentState::Handshaking;
        }

        let request = HandshakeRequest {
            plugin_id: self.config.plugin_id.clone(),
            version: self.config.version.clone(),
            api_version: self.config.api_version.clone(),
            capabilities: self.config.capabilities.clone(),
            metadata: self.config.metadata.clone(),
            token: self.config.token.clone(),
        };

        let response = match self.client.handshake(&request, deadline).await {
            Ok(response) => response,
            Err(err) => {
                *self.state.lock() = AgentState::Disconnected;
                return Err(err.into());
            }
        };

        if !response.accepted {
            *self.state.lock() = AgentState::Disconnected;
            return Err(AgentError::Rejected(
                response.error.unwrap_or_else(|| "unknown reason".into()),
            ));
        }
        let (Some(session_id), Some(auth_token)) = (response.session_id, response.auth_token)
        else {
            *self.state.lock() = AgentState::Disconnected;
            return Err(AgentError::Rejected(
                "response missing session credentials".into(),
            ));
        };

        info!(
            plugin_id = %self.config.plugin_id,
            session_id = %session_id,
            "handshake accepted"
        );
        let session = Session {
            session_id,
            auth_token,
        };
        *self.session.lock() = Some(session.clone());

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(heartbeat_loop(
            self.client.clone(),
            session.clone(),
            self.config.heartbeat_interval,
            cancel.clone(),
        )));

        if let Some(handler) = self.config.event_handler.clone() {
            tasks.push(tokio::spawn(event_loop(
                self.client.clone(),
                session,
                self.config.event_poll_interval,
                handler,
                cancel.clone(),
            )));
        }

        *self.cancel.lock() = Some(cancel);
        *self.tasks.lock() = tasks;
        *self.state.lock() = AgentState::Connected;
        Ok(())
    }

    /// Cancel the shared scope and block until every loop has exited.
    ///
    /// Guaranteed to leave zero schedulable tasks behind. Safe to call from
    /// any state; a disconnected agent is a no-op.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == AgentState::Disconnected {
                return;
            }
            *state = AgentState::Stopping;
        }

        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }

        *self.session.lock() = None;
        *self.state.lock() = AgentState::Disconnected;
        info!(plugin_id = %self.config.plugin_id, "agent stopped");
    }

    /// How many background tasks are currently tracked (0 after `stop`).
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Fixed-interval heartbeats with a per-call sub-timeout. Errors are
/// logged and the loop continues — no backoff, no give-up threshold, no
/// reconnection.
async fn heartbeat_loop(
    client: CoordClient,
    session: Session,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval's first tick is immediate; the first heartbeat should
    // land one full interval after the handshake.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    session_id: session.session_id.clone(),
                    auth_token: session.auth_token.clone(),
                    status: HashMap::from([("status".to_owned(), "healthy".to_owned())]),
                };
                match client.heartbeat(&request, HEARTBEAT_RPC_TIMEOUT).await {
                    Ok(response) if !response.ok => {
                        warn!(message = %response.message, "heartbeat rejected");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "heartbeat error"),
                }
            }
        }
    }
}

/// Periodic event retrieval; each event is dispatched to the handler
/// synchronously. Exits when the coordinator reports the session
/// terminated.
async fn event_loop(
    client: CoordClient,
    session: Session,
    interval: Duration,
    handler: EventHandler,
    cancel: CancellationToken,
) {
    info!(session_id = %session.session_id, "event listener started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(session_id = %session.session_id, "event listener stopped");
                return;
            }
            _ = ticker.tick() => {
                let batch = match client
                    .poll_events(&session.session_id, &session.auth_token, 0, EVENT_POLL_RPC_TIMEOUT)
                    .await
                {
                    Ok(batch) => batch,
                    Err(err) if err.is_gone() => {
                        info!(session_id = %session.session_id, "session terminated by coordinator");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "event poll error");
                        continue;
                    }
                };

                for event in batch.events {
                    handler(event);
                }
                if batch.terminated {
                    info!(session_id = %session.session_id, "event queue closed, session terminated");
                    return;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
