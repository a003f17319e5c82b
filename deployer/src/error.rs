use crate::config::ConfigError;
use crate::naming::NameTooLong;
use crate::smoke::SmokeTestError;
use crate::state::DeployState;
use provider::{Operation, ProviderError};
use std::time::Duration;
use thiserror::Error;

/// Everything that can stop a deploy or a CNAME swap.
///
/// None of these are retried. Whatever the provider said is carried through
/// unchanged.
#[derive(Error, Debug)]
pub enum DeployError {
    /// Environment name exceeds the provider's bound
    #[error("Environment name '{name}' is too long ({length} chars), it must be at most 15 characters")]
    NameTooLong { name: String, length: usize },

    /// The event log reported a fatal failure; holds the provider's message verbatim
    #[error("Provider operation failed: {0}")]
    ProviderOperationFailure(String),

    /// The smoke test rejected the new deployment
    #[error("Smoke test failed: {0}")]
    SmokeTestFailure(#[from] SmokeTestError),

    /// Health never reached Green within the ceiling
    #[error(
        "Environment did not become healthy within {}s (last status: {})",
        .elapsed.as_secs(),
        .last_status
    )]
    HealthCheckTimeout {
        elapsed: Duration,
        last_status: String,
    },

    /// A provider call itself failed
    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// The event poller ran dry before the operation reached an outcome
    #[error("Event stream ended before the {operation} operation completed")]
    EventStreamClosed { operation: Operation },

    /// The orchestrator attempted an illegal state change
    #[error("Invalid deploy state transition from {from} to {to}")]
    InvalidTransition { from: DeployState, to: DeployState },

    /// Configuration was rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl From<NameTooLong> for DeployError {
    fn from(err: NameTooLong) -> Self {
        DeployError::NameTooLong {
            name: err.name,
            length: err.length,
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
