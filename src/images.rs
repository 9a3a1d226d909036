//! 图片读取处理器：文件名校验、目录约束、条件请求与 Range 支持。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::{ErrorKind, SeekFrom};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::{CACHE_MAX_AGE_SECS, MAX_SERVE_SIZE};
use crate::error::ApiError;
use crate::etag::{Precondition, etag_from_metadata, evaluate_preconditions, if_range_matches};
use crate::filename::sanitize_requested_filename;
use crate::storage::ImageStore;

const DISPOSITION_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// 按文件名返回图片内容。
pub async fn get_image(
    Path(filename): Path<String>,
    request_headers: HeaderMap,
    Extension(store): Extension<Arc<ImageStore>>,
) -> Result<Response, ApiError> {
    if filename.is_empty() {
        return Err(ApiError::BadRequest("filename is required".into()));
    }
    let clean = sanitize_requested_filename(&filename).inspect_err(|err| {
        warn!(filename, error = %err, "rejected requested filename");
    })?;
    let target = store.resolve_checked(clean).await.inspect_err(|err| {
        warn!(filename = clean, error = %err, "requested file resolved outside upload directory");
    })?;

    let metadata = match fs::metadata(&target).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound("file not found".into()));
        }
        Err(err) => return Err(ApiError::Internal(format!("stat {clean}: {err}"))),
    };
    if metadata.is_dir() {
        warn!(filename = clean, "requested filename is a directory");
        return Err(ApiError::BadRequest("invalid file".into()));
    }
    let file_size = metadata.len();
    if file_size > MAX_SERVE_SIZE {
        return Err(ApiError::PayloadTooLarge("file too large".into()));
    }

    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);
    let mut response_headers = build_headers(clean, &etag, modified)?;

    match evaluate_preconditions(&request_headers, &etag, modified) {
        Precondition::Proceed => {}
        Precondition::NotModified => {
            debug!(filename = clean, "not modified");
            return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
        }
        Precondition::Failed => return Err(ApiError::PreconditionFailed),
    }

    let range = if if_range_matches(&request_headers, &etag, modified) {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(format!("open {clean}: {err}")))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(filename = clean, start, end, length, "range request accepted");
        let mut file = file;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(format!("seek {clean}: {err}")))?;
        response_headers.insert(
            header::CONTENT_RANGE,
            header_value(&format!("bytes {start}-{end}/{file_size}"))?,
        );
        response_headers.insert(header::CONTENT_LENGTH, header_value(&length.to_string())?);
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    response_headers.insert(header::CONTENT_LENGTH, header_value(&file_size.to_string())?);
    info!(filename = clean, size = file_size, "serving image");
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn build_headers(
    filename: &str,
    etag: &str,
    modified: Option<std::time::SystemTime>,
) -> Result<HeaderMap, ApiError> {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    let encoded = utf8_percent_encode(filename, DISPOSITION_SET);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime.essence_str())?);
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("inline; filename=\"{encoded}\""))?,
    );
    headers.insert(
        header::CACHE_CONTROL,
        header_value(&format!("public, max-age={CACHE_MAX_AGE_SECS}"))?,
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::ETAG, header_value(etag)?);
    if let Some(modified) = modified {
        headers.insert(header::LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Internal(format!("invalid header value {value:?}")))
}

/// 解析单段 Range 头；格式错误或多段请求被忽略，按完整内容返回。
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(range) = value
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if range.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = range.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            match end_part.parse::<u64>() {
                Ok(end) if end >= start => end.min(file_size.saturating_sub(1)),
                Ok(_) => return Ok(None),
                Err(_) => return Ok(None),
            }
        };
        (start, end)
    };

    if start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end)))
}
