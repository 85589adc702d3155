//! Request and handler contracts.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use validator::ValidationErrors;

use crate::cache::{CacheInvalidation, CachePolicy};
use crate::error::AppResult;

// == Request Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Mutates state, optionally returning a value
    Command,
    /// Reads state and returns a value
    Query,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Command => "command",
            RequestKind::Query => "query",
        }
    }
}

// == Request ==
/// A typed command or query routed by the dispatcher.
///
/// The cache hooks default to "no cache impact". A query opts into
/// read-through caching by returning a [`CachePolicy`]; a command declares
/// what it may have changed by returning a [`CacheInvalidation`]. When both
/// are present the request is treated as a write.
pub trait Request: Send + Sync + 'static {
    /// Cached responses must round-trip through serde.
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name used for spans, metrics and registration errors.
    const NAME: &'static str;

    const KIND: RequestKind;

    /// Declarative input rules, usually `validator::Validate::validate(self)`.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }

    fn cache_policy(&self) -> Option<CachePolicy> {
        None
    }

    fn invalidation(&self) -> Option<CacheInvalidation> {
        None
    }
}

// == Handler ==
/// Performs the work for exactly one request type.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, request: R, token: &CancellationToken) -> AppResult<R::Response>;
}
