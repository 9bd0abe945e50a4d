//! API error type and its HTTP rendering.
//!
//! Every failure a handler can produce maps onto one [`ApiError`] variant.
//! Unhandled errors render a generic message; the raw error chain is attached
//! to the response as an [`InternalErrorDetail`] extension so that
//! [`expose_internal_errors`] can surface it outside production.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// A validation failure attributed to one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Vec<FieldError>> for ApiError {
    fn from(errors: Vec<FieldError>) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Raw error text of a 500 response, carried as a response extension.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => (
                status,
                Json(json!({
                    "success": false,
                    "error": "Validation failed",
                    "errors": errors,
                })),
            )
                .into_response(),
            ApiError::BadRequest(message) | ApiError::Conflict(message) => (
                status,
                Json(json!({ "success": false, "error": message })),
            )
                .into_response(),
            ApiError::NotFound(entity) => (
                status,
                Json(json!({ "success": false, "error": format!("{entity} not found") })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                let detail = format!("{err:#}");
                error!(error = %detail, "Unhandled error");
                let mut response = (
                    status,
                    Json(json!({ "success": false, "error": "Internal server error" })),
                )
                    .into_response();
                response
                    .extensions_mut()
                    .insert(InternalErrorDetail(detail));
                response
            }
        }
    }
}

/// Response mapper that replaces the generic 500 body with the raw error.
///
/// Only layered onto the router outside production.
pub async fn expose_internal_errors(response: Response) -> Response {
    let detail = response
        .extensions()
        .get::<InternalErrorDetail>()
        .map(|InternalErrorDetail(detail)| detail.clone());

    match detail {
        Some(detail) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": detail })),
        )
            .into_response(),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation(vec![]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("Contact").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message_names_entity() {
        assert_eq!(ApiError::NotFound("Group").to_string(), "Group not found");
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail_until_exposed() {
        let response = ApiError::Internal(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<InternalErrorDetail>().is_some());

        let exposed = expose_internal_errors(response).await;
        assert_eq!(exposed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(exposed.extensions().get::<InternalErrorDetail>().is_none());
    }
}
