use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Configuration settings handed to the provider verbatim, keyed by option name.
pub type Settings = BTreeMap<String, String>;

/// A single entry of an environment's provider-side event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

/// The asynchronous provider operations whose completion is signalled through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Terminate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Terminate => write!(f, "terminate"),
        }
    }
}

/// Typed completion signal derived from a raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The awaited operation finished successfully.
    Succeeded,
    /// The provider reported a fatal failure; carries the provider's own text.
    Failed(String),
    /// The event says nothing about the awaited operation's outcome.
    Pending,
}

/// Environment health as reported by the provider.
///
/// Only [`HealthStatus::Green`] is healthy. Values the provider reports that are
/// not known here are kept verbatim in [`HealthStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
    Grey,
    Other(String),
}

impl HealthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Green => "Green",
            HealthStatus::Yellow => "Yellow",
            HealthStatus::Red => "Red",
            HealthStatus::Grey => "Grey",
            HealthStatus::Other(raw) => raw,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Green)
    }
}

impl From<&str> for HealthStatus {
    fn from(raw: &str) -> Self {
        // Exact literal match: "green" is not "Green".
        match raw {
            "Green" => HealthStatus::Green,
            "Yellow" => HealthStatus::Yellow,
            "Red" => HealthStatus::Red,
            "Grey" => HealthStatus::Grey,
            other => HealthStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for HealthStatus {
    fn from(raw: String) -> Self {
        HealthStatus::from(raw.as_str())
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to roll a build artifact out to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub version_label: String,
    #[serde(default)]
    pub settings: Settings,
}

impl DeployRequest {
    pub fn new(version_label: impl Into<String>) -> Self {
        Self {
            version_label: version_label.into(),
            settings: Settings::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}
