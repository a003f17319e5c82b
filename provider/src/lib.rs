pub mod driver;
pub mod events;
pub mod signal;
pub mod simulated;
pub mod types;

pub use driver::{ProviderDriver, ProviderError, ProviderResult};
pub use events::{EventPoller, EventStream};
pub use simulated::{CallKind, ProviderCall, SimulatedProvider};
pub use types::{Completion, DeployRequest, Event, HealthStatus, Operation, Settings};

pub mod prelude {
    pub use crate::driver::*;
    pub use crate::events::*;
    pub use crate::signal::classify;
    pub use crate::types::*;
}
