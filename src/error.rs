//! 统一的 API 错误类型与转换。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::io::ErrorKind;
use tracing::error;

use crate::copy::CopyError;
use crate::filename::SafetyError;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    PayloadTooLarge(String),
    PreconditionFailed,
    RangeNotSatisfiable(u64),
    /// 详细信息只写入日志，客户端只看到通用提示。
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg).into_response(),
            ApiError::PreconditionFailed => {
                (StatusCode::PRECONDITION_FAILED, "precondition failed").into_response()
            }
            ApiError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    "range not satisfiable",
                )
                    .into_response()
            }
            ApiError::Internal(detail) => {
                error!(detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl From<SafetyError> for ApiError {
    fn from(error: SafetyError) -> Self {
        match error {
            SafetyError::InvalidFilename => ApiError::BadRequest("invalid filename".into()),
            SafetyError::PathEscape => ApiError::Forbidden("access denied".into()),
            SafetyError::UnsupportedType => ApiError::BadRequest("invalid file type".into()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Unsafe(err) => err.into(),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound("file not found".into()),
                _ => ApiError::Internal(err.to_string()),
            },
        }
    }
}

impl From<CopyError> for ApiError {
    fn from(error: CopyError) -> Self {
        match error {
            CopyError::Io(err) if err.kind() == ErrorKind::FileTooLarge => {
                ApiError::PayloadTooLarge("request body too large".into())
            }
            CopyError::Io(err) if err.kind() == ErrorKind::InvalidData => {
                ApiError::BadRequest("invalid multipart form".into())
            }
            other => ApiError::Internal(format!("error saving file: {other}")),
        }
    }
}
