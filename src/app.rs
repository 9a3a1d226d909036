//! 路由装配：处理器、请求体限制、追踪与共享只读状态。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::{AppConfig, MAX_UPLOAD_SIZE};
use crate::http::{add_security_headers, build_cors_layer, resolve_client_ip};
use crate::storage::ImageStore;
use crate::{images, status, upload};

/// 构建应用路由；`shutdown` 被取消时进行中的上传会中止。
pub fn build_router(
    config: Arc<AppConfig>,
    store: Arc<ImageStore>,
    shutdown: CancellationToken,
) -> Router {
    let cors_layer = build_cors_layer(config.cors_origins.as_deref());

    let mut app = Router::new()
        .route("/health", get(status::health_check))
        .route("/api/version", get(status::get_version_info))
        .route(
            "/api/v1/images/upload",
            post(upload::upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/api/v1/images/{filename}", get(images::get_image))
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(Extension(config))
        .layer(Extension(store))
        .layer(Extension(shutdown));

    if let Some(cors_layer) = cors_layer {
        app = app.layer(cors_layer);
    }
    app
}
