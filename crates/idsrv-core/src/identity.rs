//! # Network Identity Newtype
//!
//! `MatrixId` is the network identity a 3PID resolves to. It is a newtype
//! with a validated constructor so that a reply can never be built around an
//! arbitrary string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A Matrix user ID, `@localpart:server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixId(String);

impl MatrixId {
    /// Parse and validate a Matrix user ID.
    ///
    /// The sigil must be `@`, the localpart and server name must both be
    /// non-empty, and the ID must not contain whitespace.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidMatrixId(raw.to_string());
        let rest = raw.strip_prefix('@').ok_or_else(invalid)?;
        let (localpart, server) = rest.split_once(':').ok_or_else(invalid)?;
        if localpart.is_empty() || server.is_empty() {
            return Err(invalid());
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self(raw.to_string()))
    }

    /// The full ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the first `:`.
    pub fn server_name(&self) -> &str {
        self.0.split_once(':').map(|(_, s)| s).unwrap_or_default()
    }
}

impl std::fmt::Display for MatrixId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MatrixId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MatrixId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
