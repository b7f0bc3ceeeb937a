use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::credentials::CredentialError;
use crate::datastore::StoreError;
use crate::validation::Errors;

/// Failures of model operations that are not validation outcomes.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("{kind} {id} no longer exists")]
    Missing { kind: &'static str, id: i64 },

    #[error("{kind} has not been saved yet")]
    Unsaved { kind: &'static str },

    #[error("write of {kind} {id} was not applied")]
    NotApplied { kind: &'static str, id: i64 },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation failed")]
    Invalid(Errors),

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Gone(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::Model(ModelError::Missing { .. }) => StatusCode::NOT_FOUND,
            AppError::Model(ModelError::Store(StoreError::Aborted)) => StatusCode::CONFLICT,
            AppError::Model(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match self {
            AppError::Invalid(errors) => json!({ "errors": errors }),
            other => {
                if status.is_server_error() {
                    error!(error = %other, "request failed");
                }
                json!({ "error": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
