//! Error types for the request pipeline
//!
//! Every handler and behavior returns an [`AppResult`]. Expected failures are
//! values of [`AppError`], classified by [`ErrorKind`].

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

// == Error Kind ==
/// Classification of a failed request outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, correctable by the caller
    Validation,
    /// Referenced record is absent
    NotFound,
    /// State precondition violated (e.g. completing a completed record)
    Conflict,
    /// Caller is not allowed to perform the request
    Unauthorized,
    /// The request was cancelled before it could finish
    Cancelled,
    /// Infrastructure failure or a panic escaping a handler
    Unexpected,
}

impl ErrorKind {
    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

// == App Error ==
/// Failure outcome of a request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct AppError {
    /// Stable machine-readable code, e.g. `Todo.NotFound`
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Values interpolated into the message, or related codes
    pub args: Vec<String>,
    pub kind: ErrorKind,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            args: Vec::new(),
            kind,
        }
    }

    /// Attaches message arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, code, message)
    }

    pub fn unexpected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, code, message)
    }

    /// The failure every stage returns once the cancellation token fires.
    pub fn cancelled() -> Self {
        Self::new(
            ErrorKind::Cancelled,
            "Request.Cancelled",
            "The request was cancelled",
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

// == Success Type ==
/// Discriminator for requests that succeed without a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuccessType {
    Ok,
    Created,
    NoContent,
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            // Client closed request
            ErrorKind::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
            ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "code": self.code,
            "message": self.message,
            "args": self.args,
            "kind": self.kind,
        }));

        (status, body).into_response()
    }
}

// == Extractor Rejections ==
// Malformed HTTP input is reported with the same JSON body as any other
// validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("Request.MalformedBody", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("Request.MalformedQuery", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation("Request.MalformedPath", rejection.body_text())
    }
}

// == Result Type Aliases ==
/// Outcome of a request that returns a value.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Outcome of a request that returns no body.
pub type Outcome = AppResult<SuccessType>;
