//! ETag 计算与条件请求判定。

use axum::http::{HeaderMap, header};
use httpdate::parse_http_date;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// 条件请求的判定结果。
#[derive(Debug, PartialEq, Eq)]
pub enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

/// 根据文件大小与修改时间生成强 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    match metadata.modified().ok().and_then(unix_duration) {
        Some(duration) => format!(
            "\"{:x}-{:x}-{:x}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        ),
        None => format!("\"{size:x}\""),
    }
}

/// 按 RFC 9110 的顺序评估 If-Match、If-Unmodified-Since、If-None-Match、If-Modified-Since。
pub fn evaluate_preconditions(
    headers: &HeaderMap,
    etag: &str,
    modified: Option<SystemTime>,
) -> Precondition {
    if let Some(value) = header_str(headers, header::IF_MATCH) {
        if !etag_list_matches(value, etag, false) {
            return Precondition::Failed;
        }
    } else if let Some(since) = header_date(headers, header::IF_UNMODIFIED_SINCE)
        && let Some(modified) = modified
        && seconds(modified) > seconds(since)
    {
        return Precondition::Failed;
    }

    if let Some(value) = header_str(headers, header::IF_NONE_MATCH) {
        if etag_list_matches(value, etag, true) {
            return Precondition::NotModified;
        }
    } else if let Some(since) = header_date(headers, header::IF_MODIFIED_SINCE)
        && let Some(modified) = modified
        && seconds(modified) <= seconds(since)
    {
        return Precondition::NotModified;
    }

    Precondition::Proceed
}

/// If-Range 校验：ETag 使用强比较，日期须与修改时间完全一致。
pub fn if_range_matches(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    let Some(value) = header_str(headers, header::IF_RANGE) else {
        return true;
    };
    let value = value.trim();
    if value.starts_with('"') || value.starts_with("W/") {
        return !value.starts_with("W/") && value == etag;
    }
    match (parse_http_date(value), modified) {
        (Ok(date), Some(modified)) => seconds(modified) == seconds(date),
        _ => false,
    }
}

fn etag_list_matches(header_value: &str, current: &str, weak: bool) -> bool {
    if header_value.trim() == "*" {
        return true;
    }
    header_value.split(',').map(str::trim).any(|candidate| {
        if weak {
            strip_weak(candidate) == strip_weak(current)
        } else {
            !candidate.starts_with("W/") && candidate == current
        }
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_date(headers: &HeaderMap, name: header::HeaderName) -> Option<SystemTime> {
    header_str(headers, name).and_then(|value| parse_http_date(value).ok())
}

fn unix_duration(time: SystemTime) -> Option<std::time::Duration> {
    time.duration_since(UNIX_EPOCH).ok()
}

// HTTP dates carry whole seconds only.
fn seconds(time: SystemTime) -> u64 {
    unix_duration(time).map(|d| d.as_secs()).unwrap_or(0)
}
