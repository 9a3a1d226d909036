//! 带截止时间与取消信号的分块拷贝。

use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::COPY_CHUNK_SIZE;

#[derive(Debug)]
pub enum CopyError {
    Canceled,
    DeadlineExceeded,
    ShortWrite,
    Io(io::Error),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyError::Canceled => f.write_str("copy canceled"),
            CopyError::DeadlineExceeded => f.write_str("copy deadline exceeded"),
            CopyError::ShortWrite => f.write_str("short write"),
            CopyError::Io(err) => write!(f, "copy failed: {err}"),
        }
    }
}

impl std::error::Error for CopyError {}

impl From<io::Error> for CopyError {
    fn from(err: io::Error) -> Self {
        CopyError::Io(err)
    }
}

/// 以 32 KiB 为单位拷贝，每次读取前检查取消信号与截止时间。
///
/// 读取本身也与取消/超时竞争，停滞的数据源不会占住任务。
/// 到达 EOF 时刷新目标并返回已拷贝字节数。
pub async fn copy_with_cancel<R, W>(
    cancel: &CancellationToken,
    deadline: Instant,
    source: &mut R,
    destination: &mut W,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Canceled);
        }
        if Instant::now() >= deadline {
            return Err(CopyError::DeadlineExceeded);
        }

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CopyError::Canceled),
            _ = time::sleep_until(deadline) => return Err(CopyError::DeadlineExceeded),
            read = source.read(&mut buf) => read?,
        };
        if read == 0 {
            destination.flush().await?;
            return Ok(copied);
        }

        let written = destination.write(&buf[..read]).await?;
        if written != read {
            return Err(CopyError::ShortWrite);
        }
        copied += read as u64;
    }
}
