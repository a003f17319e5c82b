//! In-memory stand-in for a managed application platform.
//!
//! [`SimulatedProvider`] implements both [`ProviderDriver`] and [`EventPoller`]
//! without any network access. It keeps a journal of every call it receives,
//! appends scripted events to an environment's log whenever an asynchronous
//! operation is issued, and replays a scripted sequence of health states.
//!
//! ```rust
//! use provider::simulated::{CallKind, SimulatedProvider};
//! use provider::types::Operation;
//!
//! let provider = SimulatedProvider::new()
//!     .with_existing_environment("myapp", "prod-030b220", "myapp-prod")
//!     .with_script(Operation::Update, ["Environment update completed successfully."])
//!     .with_health_sequence(["Grey", "Yellow", "Green"]);
//!
//! assert!(provider.has_environment("myapp", "prod-030b220"));
//! assert_eq!(provider.calls_of(CallKind::UpdateEnvironment), 0);
//! ```

use crate::driver::{ProviderDriver, ProviderError, ProviderResult};
use crate::events::{EventPoller, EventStream};
use crate::types::{Event, Operation, Settings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Supplies the timestamps stamped onto simulated events.
pub type TimeSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const DOMAIN: &str = "simulated.example.com";

/// Discriminant of a [`ProviderCall`], used for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    EnvironmentExists,
    CreateEnvironment,
    UpdateEnvironment,
    DeleteEnvironment,
    EnvironmentCname,
    EnvironmentCnamePrefix,
    EnvironmentSwapCname,
    EnvironmentHealthState,
}

/// One call received by the simulated provider, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    EnvironmentExists {
        app: String,
        env: String,
    },
    CreateEnvironment {
        app: String,
        env: String,
        solution_stack: String,
        cname_prefix: Option<String>,
        version_label: String,
        settings: Settings,
    },
    UpdateEnvironment {
        app: String,
        env: String,
        version_label: String,
        settings: Settings,
    },
    DeleteEnvironment {
        app: String,
        env: String,
    },
    EnvironmentCname {
        app: String,
        env: String,
    },
    EnvironmentCnamePrefix {
        app: String,
        env: String,
    },
    EnvironmentSwapCname {
        app: String,
        env_a: String,
        env_b: String,
    },
    EnvironmentHealthState {
        app: String,
        env: String,
    },
}

impl ProviderCall {
    pub fn kind(&self) -> CallKind {
        match self {
            ProviderCall::EnvironmentExists { .. } => CallKind::EnvironmentExists,
            ProviderCall::CreateEnvironment { .. } => CallKind::CreateEnvironment,
            ProviderCall::UpdateEnvironment { .. } => CallKind::UpdateEnvironment,
            ProviderCall::DeleteEnvironment { .. } => CallKind::DeleteEnvironment,
            ProviderCall::EnvironmentCname { .. } => CallKind::EnvironmentCname,
            ProviderCall::EnvironmentCnamePrefix { .. } => CallKind::EnvironmentCnamePrefix,
            ProviderCall::EnvironmentSwapCname { .. } => CallKind::EnvironmentSwapCname,
            ProviderCall::EnvironmentHealthState { .. } => CallKind::EnvironmentHealthState,
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatedEnvironment {
    cname_prefix: String,
    version_label: Option<String>,
}

struct LoggedEvent {
    app: String,
    env: String,
    event: Event,
}

struct State {
    environments: HashMap<(String, String), SimulatedEnvironment>,
    log: Vec<LoggedEvent>,
    scripts: HashMap<Operation, Vec<String>>,
    health: VecDeque<String>,
    last_health: String,
    failures: HashMap<CallKind, ProviderError>,
    stream_failure: Option<ProviderError>,
    calls: Vec<ProviderCall>,
    delivered: usize,
}

fn default_scripts() -> HashMap<Operation, Vec<String>> {
    let script = |lines: &[&str]| lines.iter().map(|line| line.to_string()).collect();
    HashMap::from([
        (
            Operation::Create,
            script(&[
                "createEnvironment is starting.",
                "Created security group named: {env}-sg",
                "Successfully launched environment: {env}",
            ]),
        ),
        (
            Operation::Update,
            script(&[
                "Environment update is starting.",
                "Deploying new version to instance(s).",
                "Environment update completed successfully.",
            ]),
        ),
        (
            Operation::Terminate,
            script(&[
                "terminateEnvironment is starting.",
                "Deleted security group named: {env}-sg",
                "terminateEnvironment completed successfully.",
            ]),
        ),
    ])
}

/// Scripted, in-memory provider. Cheap to share behind an `Arc`.
pub struct SimulatedProvider {
    state: Arc<Mutex<State>>,
    time_source: TimeSource,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                environments: HashMap::new(),
                log: Vec::new(),
                scripts: default_scripts(),
                health: VecDeque::new(),
                last_health: "Green".to_string(),
                failures: HashMap::new(),
                stream_failure: None,
                calls: Vec::new(),
                delivered: 0,
            })),
            time_source: Arc::new(Utc::now),
        }
    }

    /// Stamp events with `time_source` instead of the wall clock.
    pub fn with_time_source(
        mut self,
        time_source: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.time_source = Arc::new(time_source);
        self
    }

    pub fn with_existing_environment(
        self,
        app: impl Into<String>,
        env: impl Into<String>,
        cname_prefix: impl Into<String>,
    ) -> Self {
        self.lock().environments.insert(
            (app.into(), env.into()),
            SimulatedEnvironment {
                cname_prefix: cname_prefix.into(),
                version_label: None,
            },
        );
        self
    }

    /// Replace the messages emitted when `operation` is issued.
    ///
    /// `{env}` in a message is replaced with the environment id.
    pub fn with_script<I, S>(self, operation: Operation, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .scripts
            .insert(operation, messages.into_iter().map(Into::into).collect());
        self
    }

    /// Health states returned by successive health queries. The last one repeats.
    pub fn with_health_sequence<I, S>(self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().health = states.into_iter().map(Into::into).collect();
        self
    }

    /// Make the next call of `kind` fail with `error`.
    pub fn fail_next(&self, kind: CallKind, error: ProviderError) {
        self.lock().failures.insert(kind, error);
    }

    /// Make the next event stream yield `message` as an error before anything else.
    pub fn fail_next_stream(&self, message: impl Into<String>) {
        self.lock().stream_failure = Some(ProviderError::EventStream {
            message: message.into(),
        });
    }

    /// Append an event to an environment's log, stamped now.
    pub fn push_event(&self, app: &str, env: &str, message: impl Into<String>) {
        let timestamp = (self.time_source)();
        self.lock().log.push(LoggedEvent {
            app: app.to_string(),
            env: env.to_string(),
            event: Event::new(timestamp, message),
        });
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    /// Number of events handed out through [`EventPoller::poll`] streams.
    pub fn events_delivered(&self) -> usize {
        self.lock().delivered
    }

    pub fn has_environment(&self, app: &str, env: &str) -> bool {
        self.lock()
            .environments
            .contains_key(&(app.to_string(), env.to_string()))
    }

    pub fn deployed_version(&self, app: &str, env: &str) -> Option<String> {
        self.lock()
            .environments
            .get(&(app.to_string(), env.to_string()))
            .and_then(|environment| environment.version_label.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ProviderCall) -> ProviderResult<()> {
        debug!("simulated provider received {:?}", call);
        let mut state = self.lock();
        let kind = call.kind();
        state.calls.push(call);
        match state.failures.remove(&kind) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn emit_script(&self, app: &str, env: &str, operation: Operation) {
        let messages = self
            .lock()
            .scripts
            .get(&operation)
            .cloned()
            .unwrap_or_default();
        for message in messages {
            self.push_event(app, env, message.replace("{env}", env));
        }
    }

    fn not_found(app: &str, env: &str) -> ProviderError {
        ProviderError::EnvironmentNotFound {
            app: app.to_string(),
            env: env.to_string(),
        }
    }

    fn environment(&self, app: &str, env: &str) -> ProviderResult<SimulatedEnvironment> {
        self.lock()
            .environments
            .get(&(app.to_string(), env.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(app, env))
    }
}

#[async_trait]
impl ProviderDriver for SimulatedProvider {
    async fn environment_exists(&self, app: &str, env: &str) -> ProviderResult<bool> {
        self.record(ProviderCall::EnvironmentExists {
            app: app.to_string(),
            env: env.to_string(),
        })?;
        Ok(self.has_environment(app, env))
    }

    async fn create_environment(
        &self,
        app: &str,
        env: &str,
        solution_stack: &str,
        cname_prefix: Option<&str>,
        version_label: &str,
        settings: &Settings,
    ) -> ProviderResult<()> {
        self.record(ProviderCall::CreateEnvironment {
            app: app.to_string(),
            env: env.to_string(),
            solution_stack: solution_stack.to_string(),
            cname_prefix: cname_prefix.map(str::to_string),
            version_label: version_label.to_string(),
            settings: settings.clone(),
        })?;
        self.lock().environments.insert(
            (app.to_string(), env.to_string()),
            SimulatedEnvironment {
                cname_prefix: cname_prefix.unwrap_or(env).to_string(),
                version_label: Some(version_label.to_string()),
            },
        );
        self.emit_script(app, env, Operation::Create);
        Ok(())
    }

    async fn update_environment(
        &self,
        app: &str,
        env: &str,
        version_label: &str,
        settings: &Settings,
    ) -> ProviderResult<()> {
        self.record(ProviderCall::UpdateEnvironment {
            app: app.to_string(),
            env: env.to_string(),
            version_label: version_label.to_string(),
            settings: settings.clone(),
        })?;
        {
            let mut state = self.lock();
            let environment = state
                .environments
                .get_mut(&(app.to_string(), env.to_string()))
                .ok_or_else(|| Self::not_found(app, env))?;
            environment.version_label = Some(version_label.to_string());
        }
        self.emit_script(app, env, Operation::Update);
        Ok(())
    }

    async fn delete_environment(&self, app: &str, env: &str) -> ProviderResult<()> {
        self.record(ProviderCall::DeleteEnvironment {
            app: app.to_string(),
            env: env.to_string(),
        })?;
        self.lock()
            .environments
            .remove(&(app.to_string(), env.to_string()))
            .ok_or_else(|| Self::not_found(app, env))?;
        self.emit_script(app, env, Operation::Terminate);
        Ok(())
    }

    async fn environment_cname(&self, app: &str, env: &str) -> ProviderResult<String> {
        self.record(ProviderCall::EnvironmentCname {
            app: app.to_string(),
            env: env.to_string(),
        })?;
        let environment = self.environment(app, env)?;
        Ok(format!("{}.{}", environment.cname_prefix, DOMAIN))
    }

    async fn environment_cname_prefix(&self, app: &str, env: &str) -> ProviderResult<String> {
        self.record(ProviderCall::EnvironmentCnamePrefix {
            app: app.to_string(),
            env: env.to_string(),
        })?;
        Ok(self.environment(app, env)?.cname_prefix)
    }

    async fn environment_swap_cname(
        &self,
        app: &str,
        env_a: &str,
        env_b: &str,
    ) -> ProviderResult<()> {
        self.record(ProviderCall::EnvironmentSwapCname {
            app: app.to_string(),
            env_a: env_a.to_string(),
            env_b: env_b.to_string(),
        })?;
        let mut state = self.lock();
        let key_a = (app.to_string(), env_a.to_string());
        let key_b = (app.to_string(), env_b.to_string());
        let prefix_a = state
            .environments
            .get(&key_a)
            .map(|environment| environment.cname_prefix.clone())
            .ok_or_else(|| Self::not_found(app, env_a))?;
        let prefix_b = state
            .environments
            .get(&key_b)
            .map(|environment| environment.cname_prefix.clone())
            .ok_or_else(|| Self::not_found(app, env_b))?;
        if let Some(environment) = state.environments.get_mut(&key_a) {
            environment.cname_prefix = prefix_b;
        }
        if let Some(environment) = state.environments.get_mut(&key_b) {
            environment.cname_prefix = prefix_a;
        }
        Ok(())
    }

    async fn environment_health_state(&self, app: &str, env: &str) -> ProviderResult<String> {
        self.record(ProviderCall::EnvironmentHealthState {
            app: app.to_string(),
            env: env.to_string(),
        })?;
        let mut state = self.lock();
        if let Some(next) = state.health.pop_front() {
            state.last_health = next;
        }
        Ok(state.last_health.clone())
    }

    fn provider_name(&self) -> &'static str {
        "simulated"
    }
}

fn next_event(
    state: &Mutex<State>,
    app: &str,
    env: &str,
    since: DateTime<Utc>,
    cursor: usize,
) -> Option<(ProviderResult<Event>, usize)> {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let (index, event) = state
        .log
        .iter()
        .enumerate()
        .skip(cursor)
        .find(|(_, logged)| logged.app == app && logged.env == env && logged.event.timestamp >= since)
        .map(|(index, logged)| (index, logged.event.clone()))?;
    state.delivered += 1;
    Some((Ok(event), index + 1))
}

impl EventPoller for SimulatedProvider {
    /// Yields matching events one at a time, reading the log on demand. The
    /// stream ends once it reaches the end of the log.
    fn poll(&self, app: &str, env: &str, since: DateTime<Utc>) -> EventStream {
        if let Some(error) = self.lock().stream_failure.take() {
            return stream::once(futures::future::ready(Err(error))).boxed();
        }
        let state = Arc::clone(&self.state);
        let app = app.to_string();
        let env = env.to_string();
        stream::unfold(0, move |cursor| {
            futures::future::ready(next_event(&state, &app, &env, since, cursor))
        })
        .boxed()
    }
}
