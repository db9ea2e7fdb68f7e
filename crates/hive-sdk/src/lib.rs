//! # hive-sdk
//!
//! Plugin-side session agent for the Hive coordinator.
//!
//! [`PluginAgent`] mirrors the coordinator's session protocol from the
//! worker's perspective: one handshake bounded by the caller's deadline,
//! then a heartbeat loop and an optional event retrieval loop running under
//! one shared cancellation scope until [`PluginAgent::stop`] joins them
//! both.
//!
//! ```no_run
//! use std::time::Duration;
//! use hive_sdk::{AgentConfig, PluginAgent};
//!
//! # async fn run() -> Result<(), hive_sdk::AgentError> {
//! let mut config = AgentConfig::new("weather", "127.0.0.1:8080");
//! config.capabilities = vec!["forecast".into()];
//! let agent = PluginAgent::new(config);
//! agent.start(Duration::from_secs(5)).await?;
//! // ... do plugin work ...
//! agent.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod agent;
pub mod client;

pub use agent::{AgentConfig, AgentError, AgentState, EventHandler, PluginAgent};
pub use client::{ClientError, CoordClient};
