//! Zero-downtime deployment of a single environment on a managed application
//! platform.
//!
//! # Examples
//!
//! ```rust
//! use deployer::{CreationOptions, Environment, ManualClock, RecordingSink};
//! use provider::{DeployRequest, Operation, SimulatedProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = ManualClock::default();
//! let provider = Arc::new(SimulatedProvider::new().with_time_source(clock.ticking_source()));
//!
//! let blue = Environment::new(
//!     "myapp",
//!     "blue",
//!     provider.clone(),
//!     provider.clone(),
//!     CreationOptions::new("64bit Amazon Linux 2023 running Docker").with_cname_prefix("myapp"),
//! )?
//! .with_clock(Arc::new(clock.clone()))
//! .with_sink(Arc::new(RecordingSink::new()));
//!
//! let report = blue.deploy(&DeployRequest::new("v1")).await?;
//! assert_eq!(report.applied(), Some(Operation::Create));
//! assert_eq!(blue.cname_prefix().await?, "myapp");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod environment;
pub mod error;
pub mod naming;
pub mod sink;
pub mod smoke;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CreationOptions, DeployerConfig, HealthPolicy};
pub use environment::{DeployReport, Environment};
pub use error::{DeployError, DeployResult};
pub use naming::{derive_id, EnvironmentId, NameTooLong, MAX_ENV_NAME_LEN};
pub use sink::{init_tracing, DeploySink, RecordingSink, SinkRecord, TracingSink};
pub use smoke::{HttpSmokeTest, Protocol, SmokeTest, SmokeTestConfig, SmokeTestError};
pub use state::DeployState;
