//! # hive-core
//!
//! Foundation types for the Hive plugin coordinator.
//!
//! This crate provides the shared vocabulary that the coordinator, the
//! persistence gateway, and the plugin SDK all depend on:
//!
//! - **Branded IDs**: [`PluginId`] and [`SessionId`] newtypes, plus the
//!   [`AuthToken`] secret issued at handshake
//! - **Entities**: [`PluginDefinition`] (a plugin kind) and
//!   [`PluginInstance`] (one live session of a kind)
//! - **Wire protocol**: handshake / heartbeat / configure request and
//!   response pairs with contractual field names
//! - **Events**: [`CoreEvent`] envelopes and the well-known [`EventType`]
//!   vocabulary
//! - **Errors**: the [`HiveError`] hierarchy via `thiserror`
//! - **Version compatibility**: [`api_major_compatible`]

#![deny(unsafe_code)]

pub mod entities;
pub mod errors;
pub mod events;
pub mod ids;
pub mod protocol;
pub mod version;

pub use entities::{PluginDefinition, PluginInstance, PluginStatus};
pub use errors::HiveError;
pub use events::{CoreEvent, EventType, PluginEvent};
pub use ids::{AuthToken, PluginId, SessionId};
pub use protocol::{
    ConfigureRequest, ConfigureResponse, EventPollResponse, HandshakeRequest, HandshakeResponse,
    HeartbeatRequest, HeartbeatResponse,
};
pub use version::{CORE_API_VERSION, CORE_VERSION, api_major_compatible};
