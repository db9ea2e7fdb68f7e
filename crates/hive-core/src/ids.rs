//! Branded ID newtypes and the session auth token.
//!
//! Plugin ids and session ids are both strings on the wire, so each gets a
//! distinct newtype to keep them from being swapped at a call site. Session
//! ids are generated from UUID v7 (time-ordered) with an `inst-` prefix;
//! plugin ids are chosen by the plugin author and never generated here.
//!
//! [`AuthToken`] is the per-session secret issued at handshake: 32 random
//! bytes, hex-encoded. Its `Debug` output is redacted so a token can never
//! leak through logging.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of a plugin kind, chosen by the plugin author.
    ///
    /// Globally unique across all registered definitions.
    PluginId
}

branded_id! {
    /// Identifier of one live plugin session.
    ///
    /// Opaque and process-unique; issued by the coordinator at handshake.
    SessionId
}

impl SessionId {
    /// Generate a fresh session id (`inst-` + UUID v7).
    ///
    /// UUID v7 is time-ordered and collision-free at process scale, so two
    /// concurrent handshakes can never be issued the same id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("inst-{}", Uuid::now_v7().simple()))
    }
}

/// Per-session authentication secret issued at handshake.
///
/// 32 cryptographically random bytes, hex-encoded. The token travels to the
/// plugin exactly once (inside the handshake response) and must accompany
/// every subsequent heartbeat and event poll. It is never serialized as part
/// of a stored [`PluginInstance`](crate::entities::PluginInstance).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Generate a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this token is the empty placeholder (e.g. deserialized from a
    /// representation that omits secrets).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

impl From<String> for AuthToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AuthToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_inst_prefix() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with("inst-"));
    }

    #[test]
    fn session_ids_are_unique_at_scale() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(SessionId::generate()));
        }
    }

    #[test]
    fn auth_tokens_are_unique_at_scale() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(AuthToken::generate().as_str().to_owned()));
        }
    }

    #[test]
    fn auth_token_is_64_hex_chars() {
        let token = AuthToken::generate();
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn auth_token_debug_is_redacted() {
        let token = AuthToken::generate();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.as_str()));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn default_auth_token_is_empty() {
        assert!(AuthToken::default().is_empty());
        assert!(!AuthToken::generate().is_empty());
    }

    #[test]
    fn plugin_id_from_str() {
        let id = PluginId::from("weather-agent");
        assert_eq!(id.as_str(), "weather-agent");
        assert_eq!(format!("{id}"), "weather-agent");
    }

    #[test]
    fn session_id_deref_and_into() {
        let id = SessionId::from("inst-abc");
        let s: &str = &id;
        assert_eq!(s, "inst-abc");
        let owned: String = id.into();
        assert_eq!(owned, "inst-abc");
    }

    #[test]
    fn ids_serde_transparent() {
        let id = PluginId::from("metrics");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"metrics\"");
        let back: PluginId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ids_usable_as_map_keys() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = SessionId::from("inst-1");
        let _ = set.insert(id.clone());
        let _ = set.insert(id);
        assert_eq!(set.len(), 1);
    }
}
