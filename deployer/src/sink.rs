//! Where the orchestrator reports what it observes.
//!
//! Every consumed provider event and every health poll goes to a
//! [`DeploySink`] together with the environment identity. [`TracingSink`]
//! turns them into `tracing` records; [`RecordingSink`] keeps them in memory.

use crate::naming::EnvironmentId;
use crate::state::DeployState;
use chrono::{DateTime, Utc};
use provider::{Event, HealthStatus};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

pub trait DeploySink: Send + Sync {
    fn event(&self, app: &str, env: &EnvironmentId, event: &Event);

    fn health(&self, app: &str, env: &EnvironmentId, at: DateTime<Utc>, status: &HealthStatus);

    fn transition(&self, _app: &str, _env: &EnvironmentId, _from: DeployState, _to: DeployState) {}
}

/// Emits one `info` record per event and health poll, formatted as
/// `[<timestamp>][<tag>:<env>] <message>`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    tag: String,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new("paas")
    }
}

impl TracingSink {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn format_line(&self, env: &EnvironmentId, at: DateTime<Utc>, message: &str) -> String {
        format!("[{}][{}:{}] {}", at, self.tag, env, message)
    }
}

impl DeploySink for TracingSink {
    fn event(&self, app: &str, env: &EnvironmentId, event: &Event) {
        info!(
            app,
            env = %env,
            timestamp = %event.timestamp,
            "{}",
            self.format_line(env, event.timestamp, &event.message)
        );
    }

    fn health(&self, app: &str, env: &EnvironmentId, at: DateTime<Utc>, status: &HealthStatus) {
        info!(
            app,
            env = %env,
            timestamp = %at,
            health = %status,
            "{}",
            self.format_line(env, at, &format!("health status: {}", status))
        );
    }

    fn transition(&self, app: &str, env: &EnvironmentId, from: DeployState, to: DeployState) {
        debug!(app, env = %env, "State transition: {} → {}", from, to);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRecord {
    Event {
        app: String,
        env: EnvironmentId,
        event: Event,
    },
    Health {
        app: String,
        env: EnvironmentId,
        at: DateTime<Utc>,
        status: HealthStatus,
    },
    Transition {
        app: String,
        env: EnvironmentId,
        from: DeployState,
        to: DeployState,
    },
}

/// Keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SinkRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                SinkRecord::Event { event, .. } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn health_polls(&self) -> Vec<HealthStatus> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                SinkRecord::Health { status, .. } => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    /// The states entered, in order.
    pub fn states(&self) -> Vec<DeployState> {
        self.lock()
            .iter()
            .filter_map(|record| match record {
                SinkRecord::Transition { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeploySink for RecordingSink {
    fn event(&self, app: &str, env: &EnvironmentId, event: &Event) {
        self.lock().push(SinkRecord::Event {
            app: app.to_string(),
            env: env.clone(),
            event: event.clone(),
        });
    }

    fn health(&self, app: &str, env: &EnvironmentId, at: DateTime<Utc>, status: &HealthStatus) {
        self.lock().push(SinkRecord::Health {
            app: app.to_string(),
            env: env.clone(),
            at,
            status: status.clone(),
        });
    }

    fn transition(&self, app: &str, env: &EnvironmentId, from: DeployState, to: DeployState) {
        self.lock().push(SinkRecord::Transition {
            app: app.to_string(),
            env: env.clone(),
            from,
            to,
        });
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::derive_id;

    #[test]
    fn test_format_line_carries_identity_timestamp_and_message() {
        let sink = TracingSink::new("beanstalk");
        let env = derive_id("myapp", "prod").unwrap();
        let at = Utc::now();

        let line = sink.format_line(&env, at, "createEnvironment is starting.");
        assert_eq!(
            line,
            format!("[{}][beanstalk:prod-030b220] createEnvironment is starting.", at)
        );
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let env = derive_id("myapp", "prod").unwrap();
        let at = Utc::now();

        sink.transition("myapp", &env, DeployState::Idle, DeployState::Applying);
        sink.event("myapp", &env, &Event::new(at, "first"));
        sink.health("myapp", &env, at, &HealthStatus::Yellow);
        sink.event("myapp", &env, &Event::new(at, "second"));

        assert_eq!(sink.records().len(), 4);
        let messages: Vec<String> = sink.events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(sink.health_polls(), vec![HealthStatus::Yellow]);
        assert_eq!(sink.states(), vec![DeployState::Applying]);
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        let sink = TracingSink::default();
        let env = derive_id("myapp", "prod").unwrap();
        sink.event("myapp", &env, &Event::new(Utc::now(), "hello"));
        sink.health("myapp", &env, Utc::now(), &HealthStatus::Green);
        sink.transition("myapp", &env, DeployState::Idle, DeployState::Applying);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        assert!(!init_tracing());
    }
}
