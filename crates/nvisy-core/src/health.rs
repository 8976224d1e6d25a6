//! Health summaries.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};

/// Coarse health of a service.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceStatus {
    /// Serving from its preferred backends.
    #[default]
    Healthy,
    /// Serving, but only through a fallback path.
    Degraded,
}

/// Point-in-time health summary with free-form details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Overall status.
    pub status: ServiceStatus,
    /// Explanation for a degraded status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the summary was taken.
    pub checked_at: Timestamp,
    /// Per-component details, keyed by component name.
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl ServiceHealth {
    /// Healthy summary taken now.
    pub fn healthy() -> Self {
        Self::new(ServiceStatus::Healthy, None)
    }

    /// Degraded summary taken now.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ServiceStatus::Degraded, Some(message.into()))
    }

    fn new(status: ServiceStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Timestamp::now(),
            details: BTreeMap::new(),
        }
    }

    /// Attaches a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Returns true if the status is [`ServiceStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_carries_message_and_details() {
        let health = ServiceHealth::degraded("fallback only").with_detail("openai", "no_api_key");
        assert!(!health.is_healthy());
        assert_eq!(health.message.as_deref(), Some("fallback only"));
        assert_eq!(health.details["openai"], "no_api_key");

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "degraded");
    }

    #[test]
    fn test_healthy_omits_message() {
        let json = serde_json::to_value(ServiceHealth::healthy()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("message").is_none());
    }
}
