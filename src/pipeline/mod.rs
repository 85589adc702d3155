//! Request Pipeline
//!
//! Typed requests, the behaviors wrapped around their handlers, the
//! dispatcher that routes them and the event bus for domain events.

pub mod behavior;
pub mod caching;
pub mod dispatcher;
pub mod logging;
pub mod metrics;
pub mod notification;
pub mod request;
pub mod validation;

pub use behavior::{compose, Behavior, Next};
pub use caching::{CacheSettings, CachingBehavior, INVALIDATION_ALERT_TARGET};
pub use dispatcher::{Dispatcher, DispatcherBuilder, RegistrationError};
pub use logging::LoggingBehavior;
pub use metrics::{HandlerStats, MetricsSnapshot, PipelineMetrics};
pub use notification::{Event, EventBus, NotificationHandler};
pub use request::{Handler, Request, RequestKind};
pub use validation::ValidationBehavior;
