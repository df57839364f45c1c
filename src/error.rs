//! 统一的 API 错误类型与转换。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;
use std::io::ErrorKind;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    Unauthorized,
    Conflict(String),
    UploadAborted {
        status: StatusCode,
        message: String,
        files: Vec<String>,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<&'a [String]>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message,
            files: None,
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
            ApiError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, &msg),
            ApiError::Internal(msg) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &msg),
            // 与页面路由保持一致：未登录一律跳转登录页。
            ApiError::Unauthorized => Redirect::to("/login").into_response(),
            ApiError::Conflict(msg) => error_response(StatusCode::CONFLICT, &msg),
            ApiError::UploadAborted {
                status,
                message,
                files,
            } => (
                status,
                Json(ErrorBody {
                    error: &message,
                    files: Some(files.as_slice()),
                }),
            )
                .into_response(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName => ApiError::BadRequest("invalid filename".into()),
            StorageError::Root(err) => ApiError::Internal(err.to_string()),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound("File not found".into()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use std::io;

    #[test]
    fn storage_not_found_maps_to_404() {
        let err: ApiError = StorageError::Io(io::Error::from(ErrorKind::NotFound)).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_permission_denied_maps_to_500() {
        let err: ApiError = StorageError::Io(io::Error::from(ErrorKind::PermissionDenied)).into();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_storage_root_maps_to_500() {
        let err: ApiError = StorageError::Root(io::Error::from(ErrorKind::NotFound)).into();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_redirects_to_login() {
        let response = ApiError::Unauthorized.into_response();
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers().get(header::LOCATION).map(|v| v.as_bytes()),
            Some(&b"/login"[..])
        );
    }
}
