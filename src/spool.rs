//! 上传分片的暂存：小文件留在内存，超过阈值落到匿名临时文件。

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt, ReadBuf};
use tokio::task;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::copy::{CopyError, copy_with_cancel};

/// 可回绕读取的上传内容。
///
/// 磁盘形态使用 `tempfile::tempfile()`：文件在创建后即不可见，句柄关闭时由系统回收，
/// 因此无论处理器从哪条路径返回都不会残留临时文件。
#[derive(Debug)]
pub enum SpooledPart {
    Memory(Cursor<Vec<u8>>),
    Disk(File),
}

impl SpooledPart {
    /// 从数据源接收完整内容，内存中最多保留 `threshold` 字节。
    pub async fn receive<R>(
        source: &mut R,
        threshold: usize,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<Self, CopyError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = Vec::new();
        let mut head = (&mut *source).take(threshold as u64 + 1);
        copy_with_cancel(cancel, deadline, &mut head, &mut buffer).await?;
        if buffer.len() <= threshold {
            return Ok(SpooledPart::Memory(Cursor::new(buffer)));
        }

        let spill = task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(io::Error::other)??;
        let mut file = File::from_std(spill);
        file.write_all(&buffer).await?;
        drop(buffer);
        let rest = copy_with_cancel(cancel, deadline, source, &mut file).await?;
        file.rewind().await?;
        debug!(bytes = threshold as u64 + 1 + rest, "upload part spilled to disk");
        Ok(SpooledPart::Disk(file))
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self, SpooledPart::Disk(_))
    }
}

impl AsyncRead for SpooledPart {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SpooledPart::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            SpooledPart::Disk(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for SpooledPart {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match self.get_mut() {
            SpooledPart::Memory(cursor) => Pin::new(cursor).start_seek(position),
            SpooledPart::Disk(file) => Pin::new(file).start_seek(position),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match self.get_mut() {
            SpooledPart::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            SpooledPart::Disk(file) => Pin::new(file).poll_complete(cx),
        }
    }
}
