/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - proof / consent / port / cache の各エラーを境界で一つの分類に揃える
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::access_jwt::AccessJwtError;
use crate::services::auth::dpop::DpopError;
use crate::services::cache::CacheError;
use crate::services::consent::ConsentDenial;
use crate::services::open_finance::PortError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::Forbidden(_) => "Forbidden",
            AppError::ResourceNotFound(_) => "ResourceNotFound",
            AppError::Unavailable(_) => "Unavailable",
            AppError::Internal => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            AppError::InvalidRequest(m)
            | AppError::Forbidden(m)
            | AppError::ResourceNotFound(m)
            | AppError::Unavailable(m) => m,
            AppError::Internal => "internal server error".into(),
        };

        (status, Json(ErrorBody { code, message })).into_response()
    }
}

impl From<DpopError> for AppError {
    fn from(e: DpopError) -> Self {
        match e {
            // Structural problems are the client's request, everything else is a security denial.
            DpopError::InvalidProof(_) => AppError::invalid_request("invalid DPoP proof"),
            DpopError::ReplayUnavailable(_) => AppError::forbidden("DPoP proof rejected"),
            other => AppError::forbidden(format!("DPoP proof rejected: {other}")),
        }
    }
}

impl From<AccessJwtError> for AppError {
    fn from(_: AccessJwtError) -> Self {
        AppError::forbidden("access token rejected")
    }
}

impl From<ConsentDenial> for AppError {
    fn from(denial: ConsentDenial) -> Self {
        AppError::Forbidden(denial.to_string())
    }
}

impl From<PortError> for AppError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Timeout | PortError::Backend(_) => {
                AppError::Unavailable("upstream data source unavailable".into())
            }
        }
    }
}

// Only reachable when a fresh value cannot be tagged; store failures never get here.
impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        tracing::error!(error = ?e, "entity tag computation failed");
        AppError::Internal
    }
}
