//! Dispatcher
//!
//! Routes a request to the single handler registered for its type through
//! the fixed behavior chain: Logging, Validation, Caching, handler.
//!
//! Registrations are checked once in [`DispatcherBuilder::build`]. A request
//! type with no handler or with more than one handler is a startup error.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::{CacheSerializer, CacheStore, Codec};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::pipeline::behavior::{compose, Behavior, Next};
use crate::pipeline::caching::{CacheSettings, CachingBehavior};
use crate::pipeline::logging::LoggingBehavior;
use crate::pipeline::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::notification::{Event, EventBus, NotificationHandler};
use crate::pipeline::request::{Handler, Request};
use crate::pipeline::validation::ValidationBehavior;

pub const HANDLER_NOT_REGISTERED_CODE: &str = "Dispatcher.HandlerNotRegistered";
pub const HANDLER_PANICKED_CODE: &str = "Request.Panicked";

// == Registration Errors ==
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("no handler registered for {0}")]
    MissingHandler(&'static str),

    #[error("{count} handlers registered for {request}, expected exactly one")]
    DuplicateHandler { request: &'static str, count: usize },
}

struct Registration {
    type_id: TypeId,
    request: &'static str,
    handlers: usize,
}

// == Builder ==
/// Collects handlers and wires the shared behaviors around each of them.
pub struct DispatcherBuilder<C: Codec> {
    logging: Arc<LoggingBehavior>,
    validation: Arc<ValidationBehavior>,
    caching: Arc<CachingBehavior<C>>,
    events: EventBus,
    metrics: Arc<PipelineMetrics>,
    registrations: Vec<Registration>,
    pipelines: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl<C: Codec> DispatcherBuilder<C> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        serializer: CacheSerializer<C>,
        settings: CacheSettings,
        events: EventBus,
    ) -> Self {
        let metrics = Arc::new(PipelineMetrics::new());
        Self {
            logging: Arc::new(LoggingBehavior::new(Arc::clone(&metrics))),
            validation: Arc::new(ValidationBehavior::new()),
            caching: Arc::new(CachingBehavior::new(
                store,
                serializer,
                settings,
                Arc::clone(&metrics),
            )),
            events,
            metrics,
            registrations: Vec::new(),
            pipelines: HashMap::new(),
        }
    }

    fn registration<R: Request>(&mut self) -> &mut Registration {
        let type_id = TypeId::of::<R>();
        let index = match self.registrations.iter().position(|r| r.type_id == type_id) {
            Some(index) => index,
            None => {
                self.registrations.push(Registration {
                    type_id,
                    request: R::NAME,
                    handlers: 0,
                });
                self.registrations.len() - 1
            }
        };
        &mut self.registrations[index]
    }

    /// Registers `handler` as the handler for `R` and composes its pipeline.
    pub fn register<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: Handler<R>,
    {
        let registration = self.registration::<R>();
        registration.handlers += 1;
        if registration.handlers > 1 {
            // Reported by build()
            return self;
        }

        let behaviors = vec![
            self.logging.clone() as Arc<dyn Behavior<R>>,
            self.validation.clone() as Arc<dyn Behavior<R>>,
            self.caching.clone() as Arc<dyn Behavior<R>>,
        ];
        let pipeline: Next<R> = compose(Arc::new(handler), behaviors);
        self.pipelines.insert(TypeId::of::<R>(), Box::new(pipeline));
        self
    }

    /// Declares that `R` will be sent, so a missing handler fails the build.
    pub fn declare<R: Request>(mut self) -> Self {
        self.registration::<R>();
        self
    }

    pub fn subscribe<E, H>(self, handler: H) -> Self
    where
        E: Event,
        H: NotificationHandler<E>,
    {
        self.events.subscribe::<E, H>(handler);
        self
    }

    // == Build ==
    pub fn build(self) -> Result<Dispatcher, RegistrationError> {
        for registration in &self.registrations {
            match registration.handlers {
                0 => return Err(RegistrationError::MissingHandler(registration.request)),
                1 => {}
                count => {
                    return Err(RegistrationError::DuplicateHandler {
                        request: registration.request,
                        count,
                    })
                }
            }
        }

        info!(
            handlers = self.pipelines.len(),
            codec = self.caching.codec_name(),
            "Dispatcher ready"
        );
        Ok(Dispatcher {
            pipelines: self.pipelines,
            events: self.events,
            metrics: self.metrics,
        })
    }
}

// == Dispatcher ==
pub struct Dispatcher {
    pipelines: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    events: EventBus,
    metrics: Arc<PipelineMetrics>,
}

impl Dispatcher {
    pub async fn send<R: Request>(&self, request: R) -> AppResult<R::Response> {
        self.send_with(request, CancellationToken::new()).await
    }

    /// Sends `request` through its pipeline, observing `token`.
    ///
    /// A panic inside the pipeline is caught here and reported as an
    /// `Unexpected` failure. The logging stage never saw an outcome for it,
    /// so it is counted here.
    pub async fn send_with<R: Request>(
        &self,
        request: R,
        token: CancellationToken,
    ) -> AppResult<R::Response> {
        let Some(pipeline) = self
            .pipelines
            .get(&TypeId::of::<R>())
            .and_then(|p| p.downcast_ref::<Next<R>>())
        else {
            error!(request = R::NAME, "No handler registered");
            return Err(AppError::unexpected(
                HANDLER_NOT_REGISTERED_CODE,
                format!("no handler registered for {}", R::NAME),
            ));
        };

        let started = Instant::now();
        match AssertUnwindSafe(pipeline.clone().run(request, token))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(request = R::NAME, panic = %detail, "Handler panicked");
                self.metrics
                    .record_outcome(R::NAME, Some(ErrorKind::Unexpected), started.elapsed());
                Err(AppError::unexpected(
                    HANDLER_PANICKED_CODE,
                    format!("{} failed unexpectedly", R::NAME),
                ))
            }
        }
    }

    /// Broadcasts `event` to its subscribers, returning how many succeeded.
    pub async fn publish<E: Event>(&self, event: E) -> usize {
        self.events.publish(event).await
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
