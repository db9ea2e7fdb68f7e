//! Coordinator version constants and API compatibility.

/// Coordinator build version, returned in handshake responses.
pub const CORE_VERSION: &str = "1.0.0";

/// API version the coordinator speaks by default. Only the major component
/// (the substring before the first `.`) participates in compatibility.
pub const CORE_API_VERSION: &str = "1.0";

/// Whether a plugin's declared API version is compatible with the core's.
///
/// Compatibility is major-version equality: the substrings before the first
/// `.` must match exactly. `"1.1"` is compatible with `"1.0"`; `"2.0"` is
/// not.
#[must_use]
pub fn api_major_compatible(plugin: &str, core: &str) -> bool {
    let plugin_major = plugin.split('.').next().unwrap_or(plugin);
    let core_major = core.split('.').next().unwrap_or(core);
    plugin_major == core_major
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
