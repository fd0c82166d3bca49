//! Routing and addressing types for hush.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Maximum length of an identity in characters.
pub const MAX_IDENTITY_LEN: usize = 80;

/// The name a participant registers under for routing.
///
/// Identities are chosen by users and are not unique-checked by the relay;
/// the relay only validates that they are usable as routing keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity string.
    pub fn new(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypesError::InvalidIdentity("empty".into()));
        }
        if value.chars().count() > MAX_IDENTITY_LEN {
            return Err(TypesError::InvalidIdentity(format!(
                "longer than {MAX_IDENTITY_LEN} characters"
            )));
        }
        if value.chars().any(char::is_control) {
            return Err(TypesError::InvalidIdentity(
                "contains control characters".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl FromStr for Identity {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

/// Handle of one live connection.
///
/// Assigned by the relay when a socket opens and shared with peers in
/// signaling events so they can address their reply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Create a new random ConnectionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", &self.to_string()[..8])
    }
}

/// Unguessable token addressing one object in the blind store.
///
/// 16 bytes from the OS random source, displayed as URL-safe base64
/// so it can be embedded in a download path as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle([u8; 16]);

impl ObjectHandle {
    /// Draw a fresh handle from the OS random source.
    pub fn generate() -> Result<Self, TypesError> {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).map_err(|e| TypesError::Random(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Create an ObjectHandle from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 16]>::try_from(bytes).ok().map(Self)
    }
}

impl FromStr for ObjectHandle {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| TypesError::InvalidHandle)?;
        Self::from_bytes(&bytes).ok_or(TypesError::InvalidHandle)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

// Handles are bearer tokens; keep them out of logs.
impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({}..)", &self.to_string()[..4])
    }
}

impl Serialize for ObjectHandle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectHandle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accepts_plain_names() {
        let id = Identity::new("alice").unwrap();
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
    }

    #[test]
    fn identity_rejects_empty() {
        assert!(Identity::new("").is_err());
    }

    #[test]
    fn identity_rejects_control_characters() {
        assert!(Identity::new("ali\nce").is_err());
        assert!(Identity::new("\u{0}").is_err());
    }

    #[test]
    fn identity_length_boundary() {
        assert!(Identity::new("a".repeat(MAX_IDENTITY_LEN)).is_ok());
        assert!(Identity::new("a".repeat(MAX_IDENTITY_LEN + 1)).is_err());

        // Counted in characters, not bytes
        assert!(Identity::new("日".repeat(MAX_IDENTITY_LEN)).is_ok());
    }

    #[test]
    fn identity_deserialize_validates() {
        let ok: Identity = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn connection_ids_are_distinct() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn connection_id_serializes_as_string() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn object_handle_is_url_safe() {
        let handle = ObjectHandle::generate().unwrap();
        let display = handle.to_string();
        assert_eq!(display.len(), 22); // 16 bytes = 22 base64 chars (no padding)
        assert!(display
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn object_handle_parses_its_display() {
        let handle = ObjectHandle::generate().unwrap();
        let parsed: ObjectHandle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn object_handle_rejects_garbage() {
        assert!("not a handle".parse::<ObjectHandle>().is_err());
        assert!("AAAA".parse::<ObjectHandle>().is_err()); // decodes, wrong length
        assert!(ObjectHandle::from_bytes(&[0u8; 32]).is_none());
    }

    #[test]
    fn object_handle_debug_is_redacted() {
        let handle = ObjectHandle::generate().unwrap();
        let debug = format!("{:?}", handle);
        assert!(!debug.contains(&handle.to_string()));
    }
}
