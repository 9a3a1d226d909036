//! 命令行参数、环境变量与服务端固定限制。

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use shadow_rs::formatcp;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::build;
use crate::filename::normalize_lexically;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const IMAGE_ROUTE_PREFIX: &str = "/api/v1/images";
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_BIND: &str = "0.0.0.0";

pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;
pub const MAX_MEMORY_PART_SIZE: usize = 5 * 1024 * 1024;
pub const MAX_SERVE_SIZE: u64 = 100 * 1024 * 1024;
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const COPY_CHUNK_SIZE: usize = 32 * 1024;
pub const SNIFF_LEN: usize = 512;
pub const MAX_EXTENSION_LEN: usize = 10;
pub const CACHE_MAX_AGE_SECS: u64 = 24 * 60 * 60;
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 服务端命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "imgvault", version = VERSION_INFO, about = "Image upload and delivery server")]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        short = 'e',
        long,
        env = "APP_ENV",
        value_parser = NonEmptyStringValueParser::new(),
        help = "Deployment environment (development, qa, production)"
    )]
    pub app_env: String,
    #[arg(
        short = 'd',
        long,
        env = "IMAGE_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Directory where uploaded images are stored"
    )]
    pub image_upload_dir: PathBuf,
    #[arg(
        short = 'b',
        long,
        env = "BIND",
        default_value = DEFAULT_BIND,
        help = "Bind address"
    )]
    pub host: String,
    #[arg(long, env = "CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}

/// 进程启动时构建一次的只读配置。
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub app_env: String,
    pub upload_dir: PathBuf,
    pub cors_origins: Option<String>,
}

/// 加载工作目录（或其上级目录）中的 `.env`，不覆盖已存在的环境变量。
///
/// 必须在解析 [`Args`] 之前调用，clap 的 `env` 回退才能读到其中的值。
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

impl AppConfig {
    /// 校验参数并将上传目录转换为绝对路径。
    pub fn from_args(args: Args) -> io::Result<Self> {
        let host = args
            .host
            .parse::<IpAddr>()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
        let upload_dir = normalize_lexically(&std::path::absolute(&args.image_upload_dir)?);

        Ok(Self {
            host,
            port: args.port,
            app_env: args.app_env,
            upload_dir,
            cors_origins: args.cors_origins,
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["imgvault"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn rejects_zero_port() {
        let result = parse(&["--port", "0", "--app-env", "qa"]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_app_env() {
        let result = parse(&["--port", "8080", "--app-env", ""]);
        assert!(result.is_err());
    }

    #[test]
    fn upload_dir_becomes_absolute_and_normalized() {
        let args = parse(&[
            "--port",
            "8080",
            "--app-env",
            "production",
            "--image-upload-dir",
            "./data/../uploads",
            "--host",
            "127.0.0.1",
        ])
        .expect("parse args");
        let config = AppConfig::from_args(args).expect("build config");

        assert!(config.upload_dir.is_absolute());
        assert!(config.upload_dir.ends_with("uploads"));
        assert!(
            config
                .upload_dir
                .components()
                .all(|c| !matches!(c, std::path::Component::ParentDir))
        );
        assert!(!config.is_development());
    }

    #[test]
    fn env_file_supplies_required_settings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".env");
        std::fs::write(&path, "PORT=9191\nAPP_ENV=staging\n").expect("write env file");
        dotenvy::from_path_override(&path).expect("load env file");

        let args = parse(&[]).expect("settings from env file");

        assert_eq!(args.port, 9191);
        assert_eq!(args.app_env, "staging");
    }

    #[test]
    fn invalid_host_is_rejected() {
        let args = parse(&[
            "--port",
            "8080",
            "--app-env",
            "development",
            "--host",
            "not-an-ip",
        ])
        .expect("parse args");
        assert!(AppConfig::from_args(args).is_err());
    }
}
