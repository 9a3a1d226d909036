//! 文件名安全：请求文件名清洗、基目录约束、内容嗅探与安全文件名生成。

use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tracing::debug;
use uuid::Uuid;

use crate::config::{MAX_EXTENSION_LEN, SNIFF_LEN};

const FALLBACK_EXTENSION: &str = ".bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyError {
    InvalidFilename,
    PathEscape,
    UnsupportedType,
}

impl fmt::Display for SafetyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyError::InvalidFilename => f.write_str("invalid filename"),
            SafetyError::PathEscape => f.write_str("path escapes upload directory"),
            SafetyError::UnsupportedType => f.write_str("unsupported file type"),
        }
    }
}

impl std::error::Error for SafetyError {}

/// 允许上传的图片类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Jpeg,
    Png,
    Gif,
    Avif,
    Webp,
}

impl ImageType {
    pub const ALLOWED: [ImageType; 5] = [
        ImageType::Jpeg,
        ImageType::Png,
        ImageType::Gif,
        ImageType::Avif,
        ImageType::Webp,
    ];

    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Gif => "image/gif",
            ImageType::Avif => "image/avif",
            ImageType::Webp => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALLOWED.into_iter().find(|kind| kind.mime() == mime)
    }
}

/// 清洗客户端请求的文件名，只接受单个普通路径段。
pub fn sanitize_requested_filename(raw: &str) -> Result<&str, SafetyError> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.len() != raw.len() {
        debug!(raw, "filename carries directory components");
        return Err(SafetyError::InvalidFilename);
    }
    if name.is_empty() || name == "." || name == ".." {
        return Err(SafetyError::InvalidFilename);
    }
    if name.starts_with('.') || name.contains('\0') {
        return Err(SafetyError::InvalidFilename);
    }
    Ok(name)
}

/// 将文件名拼接到基目录并确认结果严格位于基目录之内。
pub fn resolve_within_base(base: &Path, clean: &str) -> Result<PathBuf, SafetyError> {
    let base = std::path::absolute(base)
        .map(|path| normalize_lexically(&path))
        .map_err(|_| SafetyError::PathEscape)?;
    let target = std::path::absolute(base.join(clean))
        .map(|path| normalize_lexically(&path))
        .map_err(|_| SafetyError::PathEscape)?;

    // Path::starts_with compares whole components, so "/uploads-evil" is not under "/uploads".
    if target == base || !target.starts_with(&base) {
        return Err(SafetyError::PathEscape);
    }
    Ok(target)
}

/// 词法规范化路径：移除 `.` 并折叠 `..`，不访问文件系统。
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// 读取前 512 字节嗅探真实类型，随后把读取位置恢复到开头。
pub async fn detect_and_validate_content_type<R>(source: &mut R) -> Result<ImageType, SafetyError>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let mut sample = Vec::with_capacity(SNIFF_LEN);
    let read = (&mut *source)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut sample)
        .await;
    let rewound = source.rewind().await;
    if read.is_err() || rewound.is_err() || sample.is_empty() {
        return Err(SafetyError::UnsupportedType);
    }

    let Some(kind) = infer::get(&sample) else {
        debug!(sampled = sample.len(), "content type not recognized");
        return Err(SafetyError::UnsupportedType);
    };
    debug!(mime = kind.mime_type(), "content type sniffed");
    ImageType::from_mime(kind.mime_type()).ok_or(SafetyError::UnsupportedType)
}

/// 生成 `<uuid>.<ext>` 形式的存储文件名，原始文件名只贡献扩展名。
pub fn generate_safe_filename(original: &str) -> String {
    format!("{}{}", Uuid::new_v4(), normalized_extension(original))
}

fn normalized_extension(original: &str) -> String {
    let name = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let Some(dot) = name.rfind('.') else {
        return FALLBACK_EXTENSION.to_string();
    };
    let extension = name[dot..].to_lowercase();
    let stem = &extension[1..];
    if stem.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !stem.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return FALLBACK_EXTENSION.to_string();
    }
    extension
}
