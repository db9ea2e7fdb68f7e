//! # hive-server
//!
//! The Hive coordinator: accepts long-lived worker plugins, authenticates
//! them, tracks their liveness, and distributes notifications.
//!
//! - **Session protocol** ([`coordinator`]): handshake validation and
//!   session issuance, heartbeat processing, admin operations
//! - **Liveness monitor** ([`monitor`]): periodic sweep demoting stale
//!   instances to unhealthy
//! - **Event bus** ([`bus`]): per-session bounded queues plus a relayed
//!   broadcast fan-out, best effort and at most once
//! - **HTTP surface** ([`http`]): axum routes for the protocol, event
//!   retrieval, and administration
//! - **Config** ([`config`]) and **graceful shutdown** ([`shutdown`])

#![deny(unsafe_code)]

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod health;
pub mod http;
pub mod monitor;
pub mod shutdown;

pub use bus::{BusError, EventBus, RELAY_QUEUE_CAPACITY, SUBSCRIBER_QUEUE_CAPACITY};
pub use config::{ConfigError, CoordConfig};
pub use coordinator::Coordinator;
pub use http::{AppState, router};
pub use monitor::LivenessMonitor;
pub use shutdown::ShutdownCoordinator;
