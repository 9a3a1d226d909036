use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, ErrorKind};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::copy::{CopyError, copy_with_cancel};
use crate::filename::{SafetyError, resolve_within_base};
use crate::pending::PendingFile;

/// 上传目录：扁平存放 `<uuid>.<ext>` 文件，磁盘上的存在即唯一事实来源。
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Resolves an already-sanitized name and refuses symlinked leaves.
    pub async fn resolve_checked(&self, clean: &str) -> Result<PathBuf, StorageError> {
        let target = resolve_within_base(&self.root, clean)?;
        match fs::symlink_metadata(&target).await {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                Err(StorageError::Unsafe(SafetyError::PathEscape))
            }
            Ok(_) => Ok(target),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(target),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// 独占创建 `name` 并在截止时间内写入全部内容；失败时不留下文件。
    pub async fn write_new<R>(
        &self,
        name: &str,
        source: &mut R,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<u64, CopyError>
    where
        R: AsyncRead + Unpin,
    {
        let target = resolve_within_base(&self.root, name).map_err(|err| {
            CopyError::Io(io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))
        })?;
        let mut pending = PendingFile::create(&target).await?;
        match copy_with_cancel(cancel, deadline, source, pending.file_mut()).await {
            Ok(written) => {
                pending.persist().await?;
                Ok(written)
            }
            Err(err) => {
                warn!(path = ?pending.path(), error = %err, "discarding partial upload");
                pending.discard().await;
                Err(err)
            }
        }
    }
}

#[derive(Debug)]
pub enum StorageError {
    Unsafe(SafetyError),
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unsafe(err) => err.fmt(f),
            StorageError::Io(err) => err.fmt(f),
        }
    }
}

impl From<SafetyError> for StorageError {
    fn from(err: SafetyError) -> Self {
        StorageError::Unsafe(err)
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::tempdir;

    fn make_store() -> (tempfile::TempDir, ImageStore) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create upload root");
        (temp, ImageStore::new(root))
    }

    fn entries(store: &ImageStore) -> usize {
        std::fs::read_dir(store.root_path())
            .expect("read upload dir")
            .count()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink() {
        use std::os::unix::fs::symlink;

        let (temp, store) = make_store();
        let outside = temp.path().join("outside.png");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, store.root_path().join("link.png")).expect("symlink");

        let result = store.resolve_checked("link.png").await;
        assert!(matches!(
            result,
            Err(StorageError::Unsafe(SafetyError::PathEscape))
        ));
    }

    #[tokio::test]
    async fn resolve_allows_missing_files() {
        let (_temp, store) = make_store();
        let target = store.resolve_checked("missing.png").await.expect("resolve");
        assert!(target.starts_with(store.root_path()));
    }

    #[tokio::test]
    async fn write_new_stores_content() {
        let (_temp, store) = make_store();
        let mut source = Cursor::new(b"pixels".to_vec());
        let written = store
            .write_new(
                "a.png",
                &mut source,
                &CancellationToken::new(),
                Instant::now() + Duration::from_secs(5),
            )
            .await
            .expect("write");

        assert_eq!(written, 6);
        let stored = std::fs::read(store.root_path().join("a.png")).expect("read");
        assert_eq!(stored, b"pixels");
    }

    #[tokio::test]
    async fn canceled_write_leaves_nothing() {
        let (_temp, store) = make_store();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = Cursor::new(vec![0u8; 4096]);

        let result = store
            .write_new(
                "b.png",
                &mut source,
                &cancel,
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(CopyError::Canceled)));
        assert_eq!(entries(&store), 0);
    }

    #[tokio::test]
    async fn aborted_write_task_leaves_nothing() {
        use tokio::io::AsyncWriteExt;

        let (_temp, store) = make_store();
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        writer.write_all(&[1u8; 512]).await.expect("feed");

        let task_store = store.clone();
        let handle = tokio::spawn(async move {
            task_store
                .write_new(
                    "c.png",
                    &mut reader,
                    &CancellationToken::new(),
                    Instant::now() + Duration::from_secs(30),
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(entries(&store), 0);
        drop(writer);
    }

    #[tokio::test]
    async fn write_new_refuses_escaping_names() {
        let (_temp, store) = make_store();
        let mut source = Cursor::new(b"x".to_vec());
        let result = store
            .write_new(
                "../escape.png",
                &mut source,
                &CancellationToken::new(),
                Instant::now() + Duration::from_secs(5),
            )
            .await;

        assert!(result.is_err());
        assert!(!store.root_path().parent().expect("parent").join("escape.png").exists());
    }
}
