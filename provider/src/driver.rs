use crate::signal;
use crate::types::{Completion, Event, Operation, Settings};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Environment {env} not found in application {app}")]
    EnvironmentNotFound { app: String, env: String },

    #[error("Provider request failed: {message}")]
    Request { message: String },

    #[error("Provider throttled the request")]
    Throttled,

    #[error("Event stream error: {message}")]
    EventStream { message: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Operations the orchestrator issues against the remote platform.
///
/// Every method is a single remote call; none of them wait for the operation
/// to complete. Completion is observed through an
/// [`EventPoller`](crate::events::EventPoller) and interpreted with
/// [`ProviderDriver::classify`].
#[async_trait]
pub trait ProviderDriver: Send + Sync {
    async fn environment_exists(&self, app: &str, env: &str) -> ProviderResult<bool>;

    async fn create_environment(
        &self,
        app: &str,
        env: &str,
        solution_stack: &str,
        cname_prefix: Option<&str>,
        version_label: &str,
        settings: &Settings,
    ) -> ProviderResult<()>;

    async fn update_environment(
        &self,
        app: &str,
        env: &str,
        version_label: &str,
        settings: &Settings,
    ) -> ProviderResult<()>;

    async fn delete_environment(&self, app: &str, env: &str) -> ProviderResult<()>;

    async fn environment_cname(&self, app: &str, env: &str) -> ProviderResult<String>;

    async fn environment_cname_prefix(&self, app: &str, env: &str) -> ProviderResult<String>;

    async fn environment_swap_cname(&self, app: &str, env_a: &str, env_b: &str)
        -> ProviderResult<()>;

    async fn environment_health_state(&self, app: &str, env: &str) -> ProviderResult<String>;

    /// Interpret `event` with respect to the awaited `operation`.
    ///
    /// Drivers for platforms that word their events differently override this.
    fn classify(&self, operation: Operation, event: &Event) -> Completion {
        signal::classify(operation, &event.message)
    }

    fn provider_name(&self) -> &'static str;
}
