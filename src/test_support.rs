//! 测试辅助：临时上传目录、路由构建与 multipart 请求体。

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::app::build_router;
use crate::config::AppConfig;
use crate::storage::ImageStore;

const BOUNDARY: &str = "imgvault-test-boundary";

pub fn test_config(root: &Path) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 8080,
        app_env: "test".to_string(),
        upload_dir: root.join("uploads"),
        cors_origins: None,
    })
}

/// 返回临时目录（含已创建的 `uploads/`）与对应路由。
pub fn test_app() -> (TempDir, Router) {
    let (temp, _, app) = test_app_with_shutdown();
    (temp, app)
}

pub fn test_app_with_shutdown() -> (TempDir, CancellationToken, Router) {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path());
    std::fs::create_dir_all(&config.upload_dir).expect("create upload dir");
    let store = Arc::new(ImageStore::new(config.upload_dir.clone()));
    let shutdown = CancellationToken::new();
    let app = build_router(config, store, shutdown.clone());
    (temp, shutdown, app)
}

fn with_signature(signature: &[u8], len: usize) -> Vec<u8> {
    let mut data = signature.to_vec();
    data.extend((0..len.saturating_sub(signature.len())).map(|i| (i % 251) as u8));
    data
}

pub fn png_bytes(len: usize) -> Vec<u8> {
    with_signature(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], len)
}

pub fn gif_bytes(len: usize) -> Vec<u8> {
    with_signature(b"GIF89a", len)
}

/// `ftyp` box with the `avif` major brand, followed by zero padding.
pub fn avif_bytes(len: usize) -> Vec<u8> {
    let mut data = b"\x00\x00\x00\x1Cftypavif\x00\x00\x00\x00avifmif1miaf".to_vec();
    data.resize(len.max(data.len()), 0);
    data
}

/// 构建上传请求；`file` 为 `(文件名, 内容)`。
pub fn multipart_request(file: Option<(&str, &[u8])>, description: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(description) = description {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\n{description}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/v1/images/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}
