//! JSON responses and the API error type.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue, LOCATION};
use hyper::{Response, StatusCode};
use roundup_shared::RoundupError;
use serde::Serialize;

pub type ApiResponse = Response<Full<Bytes>>;

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> ApiResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, "application/json", Bytes::from(body)),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            ApiError::internal("failed to serialize response").into_response()
        }
    }
}

pub fn ok<T: Serialize>(value: &T) -> ApiResponse {
    json(StatusCode::OK, value)
}

pub fn redirect(location: &'static str) -> ApiResponse {
    let mut response = with_body(StatusCode::TEMPORARY_REDIRECT, "text/plain", Bytes::new());
    response
        .headers_mut()
        .insert(LOCATION, HeaderValue::from_static(location));
    response
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> ApiResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// An error rendered as `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {limit} bytes"),
        )
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    pub fn into_response(self) -> ApiResponse {
        json(self.status, &ErrorBody {
            detail: &self.detail,
        })
    }
}

impl From<RoundupError> for ApiError {
    fn from(err: RoundupError) -> Self {
        match &err {
            RoundupError::NotFound(_) => Self::not_found(err.to_string()),
            _ if err.is_client_error() => Self::unprocessable(err.to_string()),
            _ => {
                tracing::error!(error = %err, "request failed");
                Self::internal(err.to_string())
            }
        }
    }
}
