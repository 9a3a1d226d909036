//! 图片上传处理器：大小限制、分片暂存、内容嗅探与带超时的落盘。

use axum::extract::multipart::MultipartError;
use axum::extract::{Extension, Json, Multipart};
use axum::http::{HeaderMap, StatusCode, header};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::io;
use std::pin::pin;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{IMAGE_ROUTE_PREFIX, MAX_MEMORY_PART_SIZE, MAX_UPLOAD_SIZE, UPLOAD_TIMEOUT};
use crate::error::ApiError;
use crate::filename::{detect_and_validate_content_type, generate_safe_filename};
use crate::spool::SpooledPart;
use crate::storage::ImageStore;

#[derive(Serialize, Debug)]
pub struct UploadResponse {
    message: &'static str,
    filename: String,
    description: String,
}

/// 接收 multipart 表单中的 `file` 与可选的 `description` 字段并保存图片。
pub async fn upload_image(
    Extension(store): Extension<Arc<ImageStore>>,
    Extension(shutdown): Extension<CancellationToken>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|length| length > MAX_UPLOAD_SIZE as u64) {
        return Err(ApiError::PayloadTooLarge("request body too large".into()));
    }

    let cancel = shutdown.child_token();
    let deadline = Instant::now() + UPLOAD_TIMEOUT;
    let mut upload: Option<(String, SpooledPart)> = None;
    let mut description = String::new();

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if upload.is_none() => {
                // A plain form value named `file` is not a file upload.
                let Some(original) = field.file_name().map(str::to_string) else {
                    debug!("file field without filename ignored");
                    continue;
                };
                let mut reader = pin!(StreamReader::new(field.map_err(body_read_error)));
                let part =
                    SpooledPart::receive(&mut reader, MAX_MEMORY_PART_SIZE, &cancel, deadline)
                        .await?;
                debug!(original, on_disk = part.is_on_disk(), "upload part received");
                upload = Some((original, part));
            }
            "description" => {
                description = field.text().await.map_err(form_error)?;
            }
            _ => {}
        }
    }

    let Some((original, mut part)) = upload else {
        return Err(ApiError::BadRequest("error retrieving file".into()));
    };

    let image_type = detect_and_validate_content_type(&mut part)
        .await
        .inspect_err(|_| warn!(original, "rejected upload with disallowed content"))?;

    let safe_name = generate_safe_filename(&original);
    store
        .ensure_root()
        .await
        .map_err(|err| ApiError::Internal(format!("create upload directory: {err}")))?;
    let written = store
        .write_new(&safe_name, &mut part, &cancel, deadline)
        .await?;

    info!(
        filename = safe_name,
        mime = image_type.mime(),
        bytes = written,
        "image uploaded"
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded",
            filename: format!("{IMAGE_ROUTE_PREFIX}/{safe_name}"),
            description,
        }),
    ))
}

fn form_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("request body too large".into())
    } else {
        ApiError::BadRequest("invalid multipart form".into())
    }
}

// Keeps the 413 signal intact through the io::Error boundary of StreamReader.
fn body_read_error(err: MultipartError) -> io::Error {
    let kind = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        io::ErrorKind::FileTooLarge
    } else {
        io::ErrorKind::InvalidData
    };
    io::Error::new(kind, err.body_text())
}
