use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

/// Plaintext API key. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a plaintext key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the plaintext for use in a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl FromStr for ApiKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ApiKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where a resolved key came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeySource {
    /// The user's own stored key.
    User,
    /// The system key from configuration.
    System,
    /// A key from the shared system pool.
    Pooled,
}

/// A key ready to be used for one provider call.
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    /// Plaintext key.
    pub key: ApiKey,
    /// Origin of the key.
    pub source: KeySource,
    /// Stored record id, for user and pooled keys.
    pub record_id: Option<Uuid>,
}

impl ResolvedKey {
    /// Creates a resolved key.
    pub fn new(key: ApiKey, source: KeySource, record_id: Option<Uuid>) -> Self {
        Self {
            key,
            source,
            record_id,
        }
    }
}
