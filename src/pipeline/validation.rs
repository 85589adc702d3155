//! Validation Behavior
//!
//! Runs the request's declarative rules before anything touches the cache or
//! the handler.
//!
//! Every rule is evaluated. The returned failure carries the first violation
//! as its code (fields in name order, rules in declaration order) and lists
//! all violated codes, in the same order, as its args.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use validator::ValidationErrors;

use crate::error::{AppError, AppResult};
use crate::pipeline::behavior::{Behavior, Next};
use crate::pipeline::request::Request;

/// Code used when the rules failed without any field-level detail.
pub const INVALID_REQUEST_CODE: &str = "Request.Invalid";

#[derive(Debug, Default)]
pub struct ValidationBehavior;

impl ValidationBehavior {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for ValidationBehavior {
    async fn handle(
        &self,
        request: R,
        token: CancellationToken,
        next: Next<R>,
    ) -> AppResult<R::Response> {
        if token.is_cancelled() {
            return Err(AppError::cancelled());
        }

        if let Err(errors) = request.validate() {
            let failure = to_failure(R::NAME, &errors);
            debug!(request = R::NAME, code = %failure.code, violations = ?failure.args, "Validation failed");
            return Err(failure);
        }

        next.run(request, token).await
    }
}

// == Error Mapping ==
/// Folds validator output into a single `Validation` failure.
pub fn to_failure(request: &str, errors: &ValidationErrors) -> AppError {
    let mut fields: Vec<(String, Vec<(String, String)>)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let field = field.to_string();
            let violations = errs
                .iter()
                .map(|err| {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("'{}' is invalid", field));
                    (err.code.to_string(), message)
                })
                .collect();
            (field, violations)
        })
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let codes: Vec<String> = fields
        .iter()
        .flat_map(|(_, violations)| violations.iter().map(|(code, _)| code.clone()))
        .collect();

    match fields
        .into_iter()
        .find_map(|(_, violations)| violations.into_iter().next())
    {
        Some((code, message)) => AppError::validation(code, message).with_args(codes),
        None => AppError::validation(
            INVALID_REQUEST_CODE,
            format!("{} failed validation", request),
        ),
    }
}
