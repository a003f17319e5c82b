use crate::driver::ProviderResult;
use crate::types::Event;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Lazily produced, chronologically ordered events of one environment.
pub type EventStream = BoxStream<'static, ProviderResult<Event>>;

/// Source of an environment's event log.
///
/// Implementations must:
/// - only yield events timestamped at or after `since` for the given environment,
/// - yield them in the provider's chronological order,
/// - produce them incrementally, so a consumer that stops early never forces
///   later events to be fetched,
/// - return an independent stream on every call.
pub trait EventPoller: Send + Sync {
    fn poll(&self, app: &str, env: &str, since: DateTime<Utc>) -> EventStream;
}
