//! Behavior composition.
//!
//! A pipeline is built once per request type at registration: the handler
//! is wrapped by each behavior from the innermost outwards, producing a
//! single [`Next`] continuation the dispatcher calls.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::pipeline::request::{Handler, Request};

type PipelineFn<R> = dyn Fn(R, CancellationToken) -> BoxFuture<'static, AppResult<<R as Request>::Response>>
    + Send
    + Sync;

// == Behavior ==
/// A cross-cutting stage wrapped around a handler.
///
/// A behavior either calls `next` exactly once or short-circuits with an
/// error without calling it.
#[async_trait]
pub trait Behavior<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: R,
        token: CancellationToken,
        next: Next<R>,
    ) -> AppResult<R::Response>;
}

// == Next ==
/// The remainder of the pipeline below a behavior.
pub struct Next<R: Request> {
    inner: Arc<PipelineFn<R>>,
}

impl<R: Request> Clone for Next<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Request> Next<R> {
    /// Innermost stage: runs the handler, racing it against cancellation.
    pub(crate) fn handler(handler: Arc<dyn Handler<R>>) -> Self {
        let inner: Arc<PipelineFn<R>> = Arc::new(move |request: R, token: CancellationToken| {
            let handler = Arc::clone(&handler);
            async move {
                if token.is_cancelled() {
                    return Err(AppError::cancelled());
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(AppError::cancelled()),
                    result = handler.handle(request, &token) => result,
                }
            }
            .boxed()
        });
        Self { inner }
    }

    /// Wraps this continuation in `behavior`.
    pub(crate) fn wrap(self, behavior: Arc<dyn Behavior<R>>) -> Self {
        let next = self;
        let inner: Arc<PipelineFn<R>> = Arc::new(move |request: R, token: CancellationToken| {
            let behavior = Arc::clone(&behavior);
            let next = next.clone();
            async move { behavior.handle(request, token, next).await }.boxed()
        });
        Self { inner }
    }

    /// Runs the rest of the pipeline.
    pub async fn run(self, request: R, token: CancellationToken) -> AppResult<R::Response> {
        (self.inner)(request, token).await
    }
}

// == Compose ==
/// Builds the pipeline. `behaviors` are listed outermost first.
pub fn compose<R: Request>(
    handler: Arc<dyn Handler<R>>,
    behaviors: Vec<Arc<dyn Behavior<R>>>,
) -> Next<R> {
    behaviors
        .into_iter()
        .rev()
        .fold(Next::handler(handler), |next, behavior| next.wrap(behavior))
}
