//! Shared API types: the structured error envelope and pagination helpers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::error::DataError;
use crate::data::types::{Page, PaginatedResponse};

pub const DEFAULT_PAGE: u32 = crate::core::constants::DEFAULT_PAGE;
pub const DEFAULT_PAGE_SIZE: u32 = crate::core::constants::DEFAULT_PAGE_SIZE;
pub const MAX_PAGE_SIZE: u32 = crate::core::constants::MAX_PAGE_SIZE;

/// Standard API error response, mapped to the taxonomy in the error handling
/// design: configuration/storage failures surface as 500s, validation as
/// 400s, missing rows as 404s, name collisions as 409s.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Unavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<DataError> for ApiError {
    fn from(e: DataError) -> Self {
        match e {
            DataError::NotFound => ApiError::not_found("NOT_FOUND", "resource not found"),
            DataError::Conflict(msg) => ApiError::conflict("CONFLICT", msg),
            other => {
                tracing::error!(error = %other, "data layer error");
                ApiError::internal("database operation failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, "conflict", code, message),
            Self::Unavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "SHUTTING_DOWN".to_string(),
                message,
            ),
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

/// Raw `page`/`page_size` query parameters, validated and clamped into a [`Page`].
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn resolve(&self) -> Result<Page, ApiError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        // An explicit 0 is treated the same as "unset": fall back to the default
        // rather than reject, since forms often submit an empty number field as 0.
        let page_size = match self.page_size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n,
        };
        if page < 1 {
            return Err(ApiError::bad_request("INVALID_PAGE", "page must be >= 1"));
        }
        if page_size > MAX_PAGE_SIZE {
            return Err(ApiError::bad_request(
                "INVALID_PAGE_SIZE",
                format!("page_size must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        Ok(Page { page, page_size })
    }
}

pub fn paginated<T: Serialize>(data: Vec<T>, page: Page, total_count: i64) -> PaginatedResponse<T> {
    PaginatedResponse {
        data,
        meta: crate::data::types::PaginationMeta::new(page, total_count),
    }
}
