//! 健康检查与版本信息处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    message: &'static str,
    environment: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    version: &'static str,
    build_time: &'static str,
    build_env: String,
}

/// 存活检查。
pub async fn health_check(
    Extension(config): Extension<Arc<AppConfig>>,
) -> JsonResponse<HealthStatus> {
    JsonResponse(HealthStatus {
        status: "ok",
        message: "server is running",
        environment: config.app_env.clone(),
    })
}

/// 返回当前版本信息。
pub async fn get_version_info() -> Result<JsonResponse<VersionInfo>, ApiError> {
    let version_info = VersionInfo {
        version: crate::build::PKG_VERSION,
        build_time: crate::build::BUILD_TIME,
        build_env: format!(
            "{},{}",
            crate::build::RUST_VERSION,
            crate::build::RUST_CHANNEL
        ),
    };
    Ok(JsonResponse(version_info))
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_app;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_environment() {
        let (_temp, app) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["message"], "server is running");
        assert_eq!(json["environment"], "test");
    }

    #[tokio::test]
    async fn version_lists_package_version() {
        let (_temp, app) = test_app();
        let response = app
            .oneshot(Request::get("/api/version").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
