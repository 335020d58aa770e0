use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::cookie::CookieError;
use crate::database::DbError;
use crate::session::SessionError;
use crate::utils::error_codes;
use crate::view::ViewError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("csrf token mismatch")]
    CsrfMismatch,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Cookie(#[from] CookieError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    View(#[from] ViewError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    error_message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::CsrfMismatch => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Cookie(_) => StatusCode::BAD_REQUEST,
            AppError::Session(_)
            | AppError::Database(_)
            | AppError::View(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, error_message) = match &self {
            AppError::CsrfMismatch => (error_codes::CSRF_MISMATCH, "CSRF 令牌无效".to_string()),
            AppError::NotFound(what) => (error_codes::NOT_FOUND, format!("未找到: {}", what)),
            AppError::BadRequest(msg) => (error_codes::VALIDATION_ERROR, msg.clone()),
            AppError::Cookie(e) => (error_codes::VALIDATION_ERROR, e.to_string()),
            AppError::Session(_) => (error_codes::SESSION_ERROR, "会话错误".to_string()),
            AppError::Database(_) | AppError::View(_) | AppError::Internal(_) => {
                (error_codes::INTERNAL_ERROR, "内部服务器错误".to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(ErrorResponse {
            code,
            error_message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::CsrfMismatch.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Session(SessionError::NotStarted).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = AppError::BadRequest("未知语言".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
        assert_eq!(body["error_message"], "未知语言");
    }
}
