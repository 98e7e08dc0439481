//! 核心错误处理模块

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use validator::ValidationErrors;

use crate::app::student::service::RecordError;
use crate::infrastructure::store::StoreError;

/// 核心错误类型
#[derive(Debug)]
pub enum CoreError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    /// 后端（Firestore / Supabase）调用失败
    BadGateway(String),
    InternalServerError(String),
}

/// 错误响应结构
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    pub timestamp: String,
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid", field),
                })
            })
            .collect();
        messages.sort();
        CoreError::BadRequest(messages.join("; "))
    }
}

impl From<JsonRejection> for CoreError {
    fn from(rejection: JsonRejection) -> Self {
        CoreError::BadRequest(rejection.body_text())
    }
}

impl From<RecordError> for CoreError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Write(StoreError::NotFound(id)) => {
                CoreError::NotFound(format!("student {} not found", id))
            }
            other => {
                // 后端细节只进日志，不返回给调用方
                error!("后端操作失败: {}", other);
                let message = match other {
                    RecordError::Write(_) => "backend write failed",
                    RecordError::Read(_) => "backend read failed",
                };
                CoreError::BadGateway(message.to_string())
            }
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_message, user_message) = match self {
            CoreError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            CoreError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "authentication required".to_string(),
            ),
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            CoreError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg),
            CoreError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                msg,
            ),
        };

        let error_response = ErrorResponse {
            error: error_message.to_string(),
            message: user_message,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::student::model::StudentFields;
    use validator::Validate;

    #[test]
    fn test_validation_errors_become_bad_request() {
        let err = StudentFields::default().validate().unwrap_err();
        match CoreError::from(err) {
            CoreError::BadRequest(msg) => {
                assert!(msg.contains("name: Name is required"));
                assert!(msg.contains("gender: Select a gender"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err = RecordError::Write(StoreError::NotFound("x".to_string()));
        let resp = CoreError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_backend_failure_hides_detail() {
        let err = RecordError::Write(StoreError::Backend {
            status: 500,
            message: "secret internals".to_string(),
        });
        match CoreError::from(err) {
            CoreError::BadGateway(msg) => assert_eq!(msg, "backend write failed"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
