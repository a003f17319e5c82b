use crate::naming::MAX_ENV_NAME_LEN;
use crate::smoke::SmokeTestConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl From<String> for ConfigError {
    fn from(message: String) -> Self {
        ConfigError::Invalid { message }
    }
}

/// How an environment is created, and how it is redeployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationOptions {
    pub solution_stack: String,
    #[serde(default)]
    pub cname_prefix: Option<String>,
    #[serde(default)]
    pub phoenix_mode: bool,
    #[serde(default)]
    pub smoke_test: Option<SmokeTestConfig>,
}

impl CreationOptions {
    pub fn new(solution_stack: impl Into<String>) -> Self {
        Self {
            solution_stack: solution_stack.into(),
            cname_prefix: None,
            phoenix_mode: false,
            smoke_test: None,
        }
    }

    pub fn with_cname_prefix(mut self, cname_prefix: impl Into<String>) -> Self {
        self.cname_prefix = Some(cname_prefix.into());
        self
    }

    pub fn with_phoenix_mode(mut self, phoenix_mode: bool) -> Self {
        self.phoenix_mode = phoenix_mode;
        self
    }

    pub fn with_smoke_test(mut self, smoke_test: SmokeTestConfig) -> Self {
        self.smoke_test = Some(smoke_test);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.solution_stack.trim().is_empty() {
            return Err("Solution stack cannot be empty".to_string());
        }

        if let Some(prefix) = &self.cname_prefix {
            if prefix.is_empty() {
                return Err("CNAME prefix cannot be empty when set".to_string());
            }
        }

        if let Some(smoke_test) = &self.smoke_test {
            smoke_test.validate()?;
        }

        Ok(())
    }
}

/// Polling cadence and ceiling for the health-convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            timeout_secs: 600,
        }
    }
}

impl HealthPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("Health poll interval must be greater than 0".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Health timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// One deploy target, as read from a TOML file.
///
/// ```toml
/// app = "myapp"
/// environment = "prod"
///
/// [options]
/// solution_stack = "64bit Amazon Linux 2023 running Docker"
/// cname_prefix = "myapp-prod"
/// phoenix_mode = false
///
/// [options.smoke_test]
/// path = "/health"
/// protocol = "https"
///
/// [health]
/// interval_secs = 15
/// timeout_secs = 600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerConfig {
    pub app: String,
    pub environment: String,
    pub options: CreationOptions,
    #[serde(default)]
    pub health: HealthPolicy,
}

impl DeployerConfig {
    pub fn new(
        app: impl Into<String>,
        environment: impl Into<String>,
        options: CreationOptions,
    ) -> Self {
        Self {
            app: app.into(),
            environment: environment.into(),
            options,
            health: HealthPolicy::default(),
        }
    }

    pub fn with_health(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: DeployerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.app.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        if self.environment.is_empty() {
            return Err("Environment name cannot be empty".to_string());
        }

        if self.environment.chars().count() > MAX_ENV_NAME_LEN {
            return Err(format!(
                "Environment name '{}' exceeds {} characters",
                self.environment, MAX_ENV_NAME_LEN
            ));
        }

        self.options.validate()?;
        self.health.validate()
    }
}
