//! HTTP error envelope with the service's tagged error taxonomy.
//!
//! Every user-visible failure carries exactly one machine-readable kind plus
//! a human message; non-operational errors never leak internals onto the
//! wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Gone,
    PoolExhausted,
    InvariantViolation,
    PersistenceUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Gone => StatusCode::GONE,
            Self::PoolExhausted => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PersistenceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal | Self::InvariantViolation)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    detail: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gone, message)
    }

    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PoolExhausted, message)
    }

    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvariantViolation, message)
    }

    pub fn persistence_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PersistenceUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach machine-readable context, e.g. the committed response echoed
    /// back on a duplicate submission.
    pub fn with_detail(mut self, detail: impl Serialize) -> Self {
        self.detail = serde_json::to_value(detail).ok();
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.kind.is_operational() {
            tracing::error!(kind = ?self.kind, message = %self.message, "internal error");
        }
        let message = if self.kind.is_operational() {
            self.message
        } else {
            "internal server error".to_string()
        };
        let body = ErrorBody {
            success: false,
            error: self.kind,
            message,
            detail: self.detail,
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

impl From<crate::db::StoreError> for AppError {
    fn from(err: crate::db::StoreError) -> Self {
        AppError::persistence_unavailable(format!("persistence unavailable: {err}"))
    }
}
