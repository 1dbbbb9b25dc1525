use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid data")]
    Validation(ValidationErrors),

    /// Carries the kind of record that was missing, e.g. `"Film"`.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Authentication credentials were not provided.")]
    Unauthorized,

    #[error("Too many login attempts, try again later.")]
    TooManyRequests,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

/// Reports a UNIQUE constraint failure on a write as a `unique` field error.
/// `field` picks the field name and message from the database's description
/// of the violated constraint. Any other error stays internal.
pub fn unique_violation<F>(err: DbErr, field: F) -> AppError
where
    F: FnOnce(&str) -> (&'static str, &'static str),
{
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            let (name, message) = field(&detail);
            ValidationErrors::single(name, "unique", message).into()
        },
        _ => err.into(),
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "Invalid data", "errors": errors }),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "status": self.to_string() })),
            AppError::InvalidPage => (StatusCode::NOT_FOUND, json!({ "detail": self.to_string() })),
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "detail": self.to_string() }))
            },
            AppError::TooManyRequests => {
                (StatusCode::TOO_MANY_REQUESTS, json!({ "detail": self.to_string() }))
            },
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "detail": "Internal server error" }))
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: &'static str,
    pub message: String,
}

/// Field-level validation failures, keyed by request field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<FieldError>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, code: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(FieldError { code, message: message.into() });
    }

    pub fn single(field: &'static str, code: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, code, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.is_empty() { Ok(()) } else { Err(AppError::Validation(self)) }
    }
}
