//! Error to HTTP response mapping
//!
//! Client errors carry their message. Server errors are logged and replaced
//! with a generic message; the real one rides along as a response extension
//! that [`expose_error_details`] swaps back in when development mode is on.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::core::error::{Error, StoreError};

/// Error body: `{ "ok": false, "error": "..." }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub ok: bool,
    /// Error message
    pub error: String,
}

impl ErrorResponse {
    /// Build an error body
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Unsanitised message of a 5xx response
#[derive(Debug, Clone)]
struct ErrorDetail(String);

/// Request-boundary wrapper around [`Error`]
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self(Error::from(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if error.is_server_error() {
            tracing::error!("Request failed: {}", error);
            let mut response =
                (status, Json(ErrorResponse::new("Internal server error"))).into_response();
            response
                .extensions_mut()
                .insert(ErrorDetail(error.to_string()));
            return response;
        }

        let mut response = (status, Json(ErrorResponse::new(error.to_string()))).into_response();
        if let Error::RateLimited { retry_after_secs } = error {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Response mapper installed when `server.expose_errors` is set
pub async fn expose_error_details(mut response: Response) -> Response {
    match response.extensions_mut().remove::<ErrorDetail>() {
        Some(ErrorDetail(detail)) => {
            (response.status(), Json(ErrorResponse::new(detail))).into_response()
        }
        None => response,
    }
}
