//! Logging Behavior
//!
//! Outermost stage. Opens the per-request span the inner stages record into
//! and reports the final outcome with its latency.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{AppResult, ErrorKind};
use crate::pipeline::behavior::{Behavior, Next};
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::request::Request;

pub struct LoggingBehavior {
    metrics: Arc<PipelineMetrics>,
}

impl LoggingBehavior {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for LoggingBehavior {
    async fn handle(
        &self,
        request: R,
        token: CancellationToken,
        next: Next<R>,
    ) -> AppResult<R::Response> {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            request = R::NAME,
            kind = R::KIND.as_str(),
            cache = field::Empty,
            compressed = field::Empty,
            outcome = field::Empty,
        );
        debug!(parent: &span, "Handling request");

        let started = Instant::now();
        let result = next.run(request, token).instrument(span.clone()).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match &result {
            Ok(_) => {
                span.record("outcome", "success");
                info!(parent: &span, elapsed_ms, "Request succeeded");
            }
            Err(err) => {
                span.record("outcome", err.kind.as_str());
                match err.kind {
                    ErrorKind::Unexpected => error!(
                        parent: &span,
                        elapsed_ms,
                        code = %err.code,
                        error = %err.message,
                        "Request failed"
                    ),
                    ErrorKind::Cancelled => info!(parent: &span, elapsed_ms, "Request cancelled"),
                    kind => warn!(
                        parent: &span,
                        elapsed_ms,
                        code = %err.code,
                        kind = kind.as_str(),
                        "Request failed"
                    ),
                }
            }
        }

        self.metrics.record_outcome(
            R::NAME,
            result.as_ref().err().map(|err| err.kind),
            elapsed,
        );
        result
    }
}
