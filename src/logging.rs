//! 日志初始化：`RUST_LOG` 优先，否则按部署环境选择默认级别。

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

/// 初始化 tracing 日志订阅；开发环境默认 debug，其余环境默认 info。
pub fn init_logging(config: &AppConfig) {
    let default_level = default_level(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(config.is_development()))
        .init();
}

fn default_level(config: &AppConfig) -> &'static str {
    if config.is_development() {
        "debug"
    } else {
        "info"
    }
}
