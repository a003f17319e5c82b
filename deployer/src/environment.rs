//! The environment orchestrator.
//!
//! An [`Environment`] is bound to one (application, environment id) pair and a
//! provider. [`Environment::deploy`] walks the [`DeployState`] machine:
//!
//! 1. phoenix termination, when configured and the environment exists
//! 2. create when absent, update when present
//! 3. consume the event log until that operation succeeds or fails
//! 4. smoke test, when configured
//! 5. poll health until Green, bounded by the [`HealthPolicy`] ceiling
//!
//! The first error aborts the run and is returned unchanged. Nothing is rolled
//! back: a phoenix termination followed by a failed create leaves the
//! environment deleted.
//!
//! The event-completion wait has no timeout of its own. It ends when the
//! provider reports an outcome or the [`EventPoller`] stream ends; callers
//! that need a hard bound wrap `deploy` in their own timeout or supply a
//! poller that gives up.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, CreationOptions, DeployerConfig, HealthPolicy};
use crate::error::{DeployError, DeployResult};
use crate::naming::{derive_id, EnvironmentId};
use crate::sink::{DeploySink, TracingSink};
use crate::smoke::{HttpSmokeTest, SmokeTest};
use crate::state::DeployState;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use provider::{
    Completion, DeployRequest, EventPoller, HealthStatus, Operation, ProviderDriver,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What a successful deploy did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReport {
    /// Provider operations issued, in order
    pub operations: Vec<Operation>,
    /// Events consumed across all completion waits
    pub events_consumed: usize,
    /// Health queries issued
    pub health_polls: usize,
    /// States entered after `Idle`, in order
    pub states: Vec<DeployState>,
}

impl DeployReport {
    /// The create or update that was applied.
    pub fn applied(&self) -> Option<Operation> {
        self.operations
            .iter()
            .rev()
            .copied()
            .find(|operation| *operation != Operation::Terminate)
    }

    pub fn terminated(&self) -> bool {
        self.operations.contains(&Operation::Terminate)
    }
}

#[derive(Debug, Default)]
struct DeployRun {
    state: DeployState,
    operations: Vec<Operation>,
    events_consumed: usize,
    health_polls: usize,
    states: Vec<DeployState>,
}

impl DeployRun {
    fn into_report(self) -> DeployReport {
        DeployReport {
            operations: self.operations,
            events_consumed: self.events_consumed,
            health_polls: self.health_polls,
            states: self.states,
        }
    }
}

/// Where [`Environment::drive`] is, with whatever the next step needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Terminate,
    Apply,
    Await {
        operation: Operation,
        since: DateTime<Utc>,
    },
    SmokeTest,
    AwaitHealth,
    Done,
}

impl Step {
    fn state(self) -> DeployState {
        match self {
            Step::Start => DeployState::Idle,
            Step::Terminate => DeployState::Terminating,
            Step::Apply => DeployState::Applying,
            Step::Await { .. } => DeployState::AwaitingEvent,
            Step::SmokeTest => DeployState::SmokeTesting,
            Step::AwaitHealth => DeployState::AwaitingHealth,
            Step::Done => DeployState::Succeeded,
        }
    }
}

/// A deploy target on the remote platform.
///
/// Equality and hashing consider only the application and environment id.
pub struct Environment {
    app: String,
    id: EnvironmentId,
    options: CreationOptions,
    health: HealthPolicy,
    driver: Arc<dyn ProviderDriver>,
    poller: Arc<dyn EventPoller>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DeploySink>,
    smoke_test: Option<Arc<dyn SmokeTest>>,
}

impl Environment {
    /// Bind to `env_name` within `app`.
    ///
    /// Fails with [`DeployError::NameTooLong`] when the name exceeds the
    /// provider bound. A smoke test configured in `options` is run over HTTP
    /// unless replaced through [`Environment::with_smoke_test`].
    pub fn new(
        app: impl Into<String>,
        env_name: &str,
        driver: Arc<dyn ProviderDriver>,
        poller: Arc<dyn EventPoller>,
        options: CreationOptions,
    ) -> DeployResult<Self> {
        let app = app.into();
        let id = derive_id(&app, env_name)?;
        options.validate().map_err(ConfigError::from)?;

        let smoke_test = match &options.smoke_test {
            Some(config) => {
                Some(Arc::new(HttpSmokeTest::new(config.clone())?) as Arc<dyn SmokeTest>)
            }
            None => None,
        };

        Ok(Self {
            app,
            id,
            options,
            health: HealthPolicy::default(),
            driver,
            poller,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink::default()),
            smoke_test,
        })
    }

    pub fn from_config(
        config: &DeployerConfig,
        driver: Arc<dyn ProviderDriver>,
        poller: Arc<dyn EventPoller>,
    ) -> DeployResult<Self> {
        config.validate().map_err(ConfigError::from)?;
        Ok(Self::new(
            config.app.clone(),
            &config.environment,
            driver,
            poller,
            config.options.clone(),
        )?
        .with_health_policy(config.health))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DeploySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_smoke_test(mut self, smoke_test: Arc<dyn SmokeTest>) -> Self {
        self.smoke_test = Some(smoke_test);
        self
    }

    pub fn with_health_policy(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn id(&self) -> &EnvironmentId {
        &self.id
    }

    pub fn options(&self) -> &CreationOptions {
        &self.options
    }

    pub fn health_policy(&self) -> &HealthPolicy {
        &self.health
    }

    /// Roll `request` out to this environment.
    #[instrument(skip_all, fields(app = %self.app, env = %self.id, version = %request.version_label))]
    pub async fn deploy(&self, request: &DeployRequest) -> DeployResult<DeployReport> {
        info!("Starting deploy of version {}", request.version_label);
        let mut run = DeployRun::default();

        match self.drive(&mut run, request).await {
            Ok(()) => {
                info!("Deploy of version {} succeeded", request.version_label);
                Ok(run.into_report())
            }
            Err(err) => {
                warn!("Deploy failed while {}: {}", run.state, err);
                if run.state.can_transition_to(DeployState::Failed) {
                    self.enter(&mut run, DeployState::Failed);
                }
                Err(err)
            }
        }
    }

    /// The alias prefix currently routed to this environment.
    pub async fn cname_prefix(&self) -> DeployResult<String> {
        Ok(self
            .driver
            .environment_cname_prefix(&self.app, self.id.as_str())
            .await?)
    }

    /// Exchange routing aliases with `other` in a single provider call.
    pub async fn swap_cname_with(&self, other: &Environment) -> DeployResult<()> {
        info!(
            app = %self.app,
            "Swapping CNAME between {} and {}",
            self.id,
            other.id
        );
        self.driver
            .environment_swap_cname(&self.app, self.id.as_str(), other.id.as_str())
            .await?;
        Ok(())
    }

    async fn drive(&self, run: &mut DeployRun, request: &DeployRequest) -> DeployResult<()> {
        let mut step = Step::Start;

        loop {
            step = match step {
                Step::Start if self.options.phoenix_mode => Step::Terminate,
                Step::Start => Step::Apply,
                Step::Terminate => {
                    if self.exists().await? {
                        info!("Phoenix mode: terminating {}", self.id);
                        let since = self.clock.now();
                        self.driver
                            .delete_environment(&self.app, self.id.as_str())
                            .await?;
                        run.operations.push(Operation::Terminate);
                        Step::Await {
                            operation: Operation::Terminate,
                            since,
                        }
                    } else {
                        debug!("Phoenix mode: {} does not exist, nothing to terminate", self.id);
                        Step::Apply
                    }
                }
                Step::Apply => {
                    let (operation, since) = self.create_or_update(request).await?;
                    run.operations.push(operation);
                    Step::Await { operation, since }
                }
                Step::Await { operation, since } => {
                    self.await_completion(run, operation, since).await?;
                    match operation {
                        Operation::Terminate => Step::Apply,
                        Operation::Create | Operation::Update if self.smoke_test.is_some() => {
                            Step::SmokeTest
                        }
                        Operation::Create | Operation::Update => Step::AwaitHealth,
                    }
                }
                Step::SmokeTest => {
                    if let Some(smoke_test) = &self.smoke_test {
                        self.run_smoke_test(smoke_test.as_ref()).await?;
                    }
                    Step::AwaitHealth
                }
                Step::AwaitHealth => {
                    self.await_health(run).await?;
                    Step::Done
                }
                Step::Done => return Ok(()),
            };
            self.transition_to(run, step.state())?;
        }
    }

    fn transition_to(&self, run: &mut DeployRun, next: DeployState) -> DeployResult<()> {
        if !run.state.can_transition_to(next) {
            return Err(DeployError::InvalidTransition {
                from: run.state,
                to: next,
            });
        }
        self.enter(run, next);
        Ok(())
    }

    fn enter(&self, run: &mut DeployRun, next: DeployState) {
        self.sink.transition(&self.app, &self.id, run.state, next);
        run.state = next;
        run.states.push(next);
    }

    async fn exists(&self) -> DeployResult<bool> {
        Ok(self
            .driver
            .environment_exists(&self.app, self.id.as_str())
            .await?)
    }

    /// Issue exactly one of create or update. Returns the operation and the
    /// instant just before it was issued.
    async fn create_or_update(
        &self,
        request: &DeployRequest,
    ) -> DeployResult<(Operation, DateTime<Utc>)> {
        if self.exists().await? {
            info!("Updating {} to version {}", self.id, request.version_label);
            let since = self.clock.now();
            self.driver
                .update_environment(
                    &self.app,
                    self.id.as_str(),
                    &request.version_label,
                    &request.settings,
                )
                .await?;
            Ok((Operation::Update, since))
        } else {
            info!(
                "Creating {} on {} with version {}",
                self.id, self.options.solution_stack, request.version_label
            );
            let since = self.clock.now();
            self.driver
                .create_environment(
                    &self.app,
                    self.id.as_str(),
                    &self.options.solution_stack,
                    self.options.cname_prefix.as_deref(),
                    &request.version_label,
                    &request.settings,
                )
                .await?;
            Ok((Operation::Create, since))
        }
    }

    /// Consume events from `since` until `operation` succeeds or the provider
    /// reports a fatal failure. Stops reading at the first terminal event.
    async fn await_completion(
        &self,
        run: &mut DeployRun,
        operation: Operation,
        since: DateTime<Utc>,
    ) -> DeployResult<()> {
        let mut events = self.poller.poll(&self.app, self.id.as_str(), since);

        while let Some(event) = events.next().await {
            let event = event?;
            run.events_consumed += 1;
            self.sink.event(&self.app, &self.id, &event);

            match self.driver.classify(operation, &event) {
                Completion::Succeeded => {
                    info!("{} of {} completed", operation, self.id);
                    return Ok(());
                }
                Completion::Failed(message) => {
                    return Err(DeployError::ProviderOperationFailure(message));
                }
                Completion::Pending => {}
            }
        }

        Err(DeployError::EventStreamClosed { operation })
    }

    async fn run_smoke_test(&self, smoke_test: &dyn SmokeTest) -> DeployResult<()> {
        let hostname = self
            .driver
            .environment_cname(&self.app, self.id.as_str())
            .await?;
        info!("Smoke testing {} at {}", self.id, hostname);
        smoke_test.run(&hostname).await?;
        Ok(())
    }

    /// Poll health every interval until Green.
    ///
    /// The ceiling covers the polls themselves: a health query still pending
    /// at the deadline, or answered after it, ends the wait with
    /// [`DeployError::HealthCheckTimeout`]. The first poll always happens.
    async fn await_health(&self, run: &mut DeployRun) -> DeployResult<()> {
        let started = self.clock.now();
        let ceiling = self.health.timeout();
        let mut last_status: Option<HealthStatus> = None;

        loop {
            let remaining = ceiling.saturating_sub(self.elapsed_since(started));
            let raw = tokio::select! {
                biased;
                raw = self.driver.environment_health_state(&self.app, self.id.as_str()) => raw?,
                _ = self.clock.sleep(remaining) => {
                    warn!("Health query for {} still pending at the {}s ceiling", self.id, ceiling.as_secs());
                    return Err(Self::health_timeout(ceiling, last_status.as_ref()));
                }
            };

            let status = HealthStatus::from(raw);
            let at = self.clock.now();
            run.health_polls += 1;
            self.sink.health(&self.app, &self.id, at, &status);

            let elapsed = self.elapsed_since(started);
            if elapsed > ceiling {
                warn!("Health status for {} arrived after the {}s ceiling", self.id, ceiling.as_secs());
                return Err(Self::health_timeout(ceiling, Some(&status)));
            }
            if status.is_healthy() {
                return Ok(());
            }
            if elapsed >= ceiling {
                return Err(Self::health_timeout(ceiling, Some(&status)));
            }

            self.clock
                .sleep(self.health.interval().min(ceiling - elapsed))
                .await;
            last_status = Some(status);
        }
    }

    fn elapsed_since(&self, started: DateTime<Utc>) -> Duration {
        (self.clock.now() - started).to_std().unwrap_or_default()
    }

    fn health_timeout(ceiling: Duration, last_status: Option<&HealthStatus>) -> DeployError {
        DeployError::HealthCheckTimeout {
            elapsed: ceiling,
            last_status: last_status
                .map(ToString::to_string)
                .unwrap_or_else(|| "no response".to_string()),
        }
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.app == other.app && self.id == other.id
    }
}

impl Eq for Environment {}

impl Hash for Environment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.app.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("app", &self.app)
            .field("id", &self.id)
            .field("options", &self.options)
            .field("health", &self.health)
            .field("provider", &self.driver.provider_name())
            .field("smoke_test", &self.smoke_test.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smoke::SmokeTestConfig;
    use provider::SimulatedProvider;
    use std::collections::HashSet;

    fn environment(app: &str, name: &str, options: CreationOptions) -> DeployResult<Environment> {
        let provider = Arc::new(SimulatedProvider::new());
        Environment::new(app, name, provider.clone(), provider, options)
    }

    #[test]
    fn test_new_derives_id() {
        let env = environment("myapp", "prod", CreationOptions::new("X")).unwrap();
        assert_eq!(env.app(), "myapp");
        assert_eq!(env.id().as_str(), "prod-030b220");
        assert_eq!(env.health_policy(), &HealthPolicy::default());
    }

    #[test]
    fn test_new_rejects_long_name() {
        let err = environment("myapp", "this-name-is-too-long", CreationOptions::new("X"))
            .unwrap_err();
        assert!(matches!(err, DeployError::NameTooLong { length: 21, .. }));
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let err = environment("myapp", "prod", CreationOptions::new("")).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_equality_ignores_options_and_provider() {
        let plain = environment("myapp", "prod", CreationOptions::new("X")).unwrap();
        let phoenix = environment(
            "myapp",
            "prod",
            CreationOptions::new("Y").with_phoenix_mode(true),
        )
        .unwrap();
        let other_name = environment("myapp", "staging", CreationOptions::new("X")).unwrap();
        let other_app = environment("otherapp", "prod", CreationOptions::new("X")).unwrap();

        assert_eq!(plain, phoenix);
        assert_ne!(plain, other_name);
        assert_ne!(plain, other_app);

        let set: HashSet<&Environment> = [&plain, &phoenix, &other_name].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_configured_smoke_test_is_installed() {
        let env = environment(
            "myapp",
            "prod",
            CreationOptions::new("X").with_smoke_test(SmokeTestConfig::default()),
        )
        .unwrap();
        assert!(env.smoke_test.is_some());

        let env = environment("myapp", "prod", CreationOptions::new("X")).unwrap();
        assert!(env.smoke_test.is_none());
    }

    #[test]
    fn test_from_config_applies_health_policy() {
        let config = DeployerConfig::new("myapp", "prod", CreationOptions::new("X"))
            .with_health(HealthPolicy::default().with_timeout(Duration::from_secs(60)));
        let provider = Arc::new(SimulatedProvider::new());

        let env = Environment::from_config(&config, provider.clone(), provider).unwrap();
        assert_eq!(env.health_policy().timeout_secs, 60);
        assert_eq!(env.id().as_str(), "prod-030b220");
    }

    #[test]
    fn test_report_helpers() {
        let report = DeployReport {
            operations: vec![Operation::Terminate, Operation::Create],
            events_consumed: 6,
            health_polls: 1,
            states: vec![],
        };
        assert!(report.terminated());
        assert_eq!(report.applied(), Some(Operation::Create));

        let report = DeployReport {
            operations: vec![Operation::Update],
            ..report
        };
        assert!(!report.terminated());
        assert_eq!(report.applied(), Some(Operation::Update));
    }

    #[test]
    fn test_steps_map_onto_deploy_states() {
        let since = Utc::now();
        let steps = [
            (Step::Start, DeployState::Idle),
            (Step::Terminate, DeployState::Terminating),
            (Step::Apply, DeployState::Applying),
            (
                Step::Await {
                    operation: Operation::Terminate,
                    since,
                },
                DeployState::AwaitingEvent,
            ),
            (Step::SmokeTest, DeployState::SmokeTesting),
            (Step::AwaitHealth, DeployState::AwaitingHealth),
            (Step::Done, DeployState::Succeeded),
        ];
        for (step, state) in steps {
            assert_eq!(step.state(), state);
        }
    }

    #[test]
    fn test_report_serializes_for_callers() {
        let report = DeployReport {
            operations: vec![Operation::Update],
            events_consumed: 3,
            health_polls: 2,
            states: vec![DeployState::Applying, DeployState::Succeeded],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operations"], serde_json::json!(["update"]));
        assert_eq!(json["health_polls"], 2);
    }

    #[test]
    fn test_debug_hides_collaborators() {
        let env = environment("myapp", "prod", CreationOptions::new("X")).unwrap();
        let rendered = format!("{:?}", env);
        assert!(rendered.contains("prod-030b220"));
        assert!(rendered.contains("simulated"));
    }
}
