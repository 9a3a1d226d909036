//! 独占创建的目标文件：持久化之前的任何退出路径都会删除它。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

/// 正在写入的新文件。
///
/// 未调用 [`PendingFile::persist`] 就被丢弃（包括请求 future 被取消）时，文件会被删除。
#[derive(Debug)]
pub struct PendingFile {
    // Field order matters: the handle must close before the guard removes the path.
    file: File,
    guard: RemoveOnDrop,
}

#[derive(Debug)]
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl PendingFile {
    /// 以 `create_new` 打开目标，已存在时返回 `AlreadyExists`。
    pub async fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            guard: RemoveOnDrop {
                path: path.to_path_buf(),
                armed: true,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.guard.path
    }

    /// 返回可写句柄。
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 关闭句柄并删除文件。
    pub async fn discard(self) {
        let PendingFile { file, mut guard } = self;
        drop(file);
        guard.armed = false;
        let _ = fs::remove_file(&guard.path).await;
    }

    /// 落盘并保留文件。
    pub async fn persist(self) -> io::Result<()> {
        let PendingFile { file, mut guard } = self;
        file.sync_all().await?;
        drop(file);
        guard.armed = false;
        Ok(())
    }
}
