//! # hive-store
//!
//! Persistence gateway for the Hive coordinator.
//!
//! The coordinator treats storage as a CRUD gateway with per-row atomicity:
//! upsert-by-id for [`PluginDefinition`](hive_core::PluginDefinition)s,
//! create/get/list/update for
//! [`PluginInstance`](hive_core::PluginInstance)s, enabled-flag setters for
//! each, and a staleness query feeding the liveness sweep.
//!
//! Two implementations:
//!
//! - [`MemoryStore`] — lock-protected maps, used by tests and by the
//!   coordinator when no database path is configured
//! - [`SqliteStore`] — rusqlite behind an r2d2 pool with WAL mode

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::PluginStore;
