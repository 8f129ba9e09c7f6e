//! Storage operations
//!
//! Disk-backed [`FileSystem`] rooted at the configured server root. Uploads are
//! spooled into a hidden temporary file next to their target and only moved
//! into place once the data connection has delivered everything.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::background::{BackgroundTransfer, ProgressReporter};
use crate::error::{FileSystemError, TransferError};
use crate::storage::filesystem::{FileEntry, FileReader, FileSystem};
use crate::storage::validation::{parent_of, virtual_to_real_path};

const TEMP_PREFIX: &str = ".rax-upload-";
const COMMIT_CHUNK_SIZE: usize = 64 * 1024;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct DiskFileSystem {
    root: PathBuf,
    deferred_commit: bool,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            deferred_commit: false,
        }
    }

    /// Completes uploads on the background worker instead of inline.
    pub fn with_deferred_commit(mut self, deferred: bool) -> Self {
        self.deferred_commit = deferred;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn real(&self, path: &str) -> PathBuf {
        virtual_to_real_path(&self.root, path)
    }

    async fn existing_dir(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        let real = self.real(path);
        let meta = fs::metadata(&real).await.map_err(|e| map_io(path, e))?;
        if !meta.is_dir() {
            return Err(FileSystemError::NotADirectory(path.to_string()));
        }
        Ok(real)
    }

    async fn existing_file(&self, path: &str) -> Result<PathBuf, FileSystemError> {
        let real = self.real(path);
        let meta = fs::metadata(&real).await.map_err(|e| map_io(path, e))?;
        if !meta.is_file() {
            return Err(FileSystemError::NotAFile(path.to_string()));
        }
        Ok(real)
    }
}

fn map_io(path: &str, e: io::Error) -> FileSystemError {
    match e.kind() {
        ErrorKind::NotFound => FileSystemError::NotFound(path.to_string()),
        ErrorKind::PermissionDenied | ErrorKind::DirectoryNotEmpty => {
            FileSystemError::PermissionDenied(path.to_string())
        }
        ErrorKind::AlreadyExists => FileSystemError::AlreadyExists(path.to_string()),
        ErrorKind::StorageFull => FileSystemError::InsufficientStorage,
        _ => FileSystemError::Io(e),
    }
}

fn entry_name(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "/".to_string(),
    }
}

#[async_trait]
impl FileSystem for DiskFileSystem {
    async fn metadata(&self, path: &str) -> Result<FileEntry, FileSystemError> {
        let meta = fs::metadata(self.real(path))
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(FileEntry {
            name: entry_name(path),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, FileSystemError> {
        let real = self.existing_dir(path).await?;
        let mut dir = fs::read_dir(&real).await.map_err(|e| map_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            match entry.metadata().await {
                Ok(meta) => entries.push(FileEntry {
                    name,
                    is_dir: meta.is_dir(),
                    size: if meta.is_dir() { 0 } else { meta.len() },
                    modified: meta.modified().ok(),
                }),
                Err(e) => debug!("Skipping {} in {}: {}", name, path, e),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} ({} entries)", path, entries.len());
        Ok(entries)
    }

    async fn open_read(&self, path: &str) -> Result<FileReader, FileSystemError> {
        let real = self.existing_file(path).await?;
        let file = fs::File::open(&real).await.map_err(|e| map_io(path, e))?;
        Ok(Box::new(file))
    }

    async fn store(
        &self,
        path: &str,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Option<Box<dyn BackgroundTransfer>>, FileSystemError> {
        let parent = self.existing_dir(&parent_of(path)).await?;
        let target = self.real(path);
        if fs::metadata(&target).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(FileSystemError::NotAFile(path.to_string()));
        }

        let temp = TempUpload::new(parent.join(format!(
            "{}{}-{}",
            TEMP_PREFIX,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        )));
        let mut file = fs::File::create(temp.path())
            .await
            .map_err(|e| map_io(path, e))?;
        let received = tokio::io::copy(data, &mut file)
            .await
            .map_err(|e| map_io(path, e))?;
        file.flush().await.map_err(|e| map_io(path, e))?;
        drop(file);

        info!("Received {} bytes for {}", received, path);

        if self.deferred_commit {
            return Ok(Some(Box::new(CommitTransfer {
                id: path.to_string(),
                temp,
                target,
            })));
        }

        temp.persist(&target).await.map_err(|e| map_io(path, e))?;
        Ok(None)
    }

    async fn delete(&self, path: &str) -> Result<(), FileSystemError> {
        let real = self.existing_file(path).await?;
        fs::remove_file(&real).await.map_err(|e| map_io(path, e))?;
        info!("Deleted {}", path);
        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<(), FileSystemError> {
        fs::create_dir(self.real(path))
            .await
            .map_err(|e| map_io(path, e))?;
        info!("Created directory {}", path);
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<(), FileSystemError> {
        if path == "/" {
            return Err(FileSystemError::PermissionDenied(path.to_string()));
        }
        let real = self.existing_dir(path).await?;
        fs::remove_dir(&real).await.map_err(|e| map_io(path, e))?;
        info!("Removed directory {}", path);
        Ok(())
    }
}

/// A spooled upload. The file is removed on drop unless it was persisted.
struct TempUpload {
    path: Option<PathBuf>,
}

impl TempUpload {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    async fn persist(mut self, target: &Path) -> io::Result<()> {
        if let Some(path) = &self.path {
            fs::rename(path, target).await?;
        }
        self.path = None;
        Ok(())
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!("Failed to remove spooled upload {}: {}", path.display(), e);
            }
            _ => {}
        }
    }
}

/// Copies a spooled upload into its final location.
struct CommitTransfer {
    id: String,
    temp: TempUpload,
    target: PathBuf,
}

#[async_trait]
impl BackgroundTransfer for CommitTransfer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(
        &mut self,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let mut source = fs::File::open(self.temp.path()).await?;
        let mut dest = fs::File::create(&self.target).await?;
        let mut buf = vec![0u8; COMMIT_CHUNK_SIZE];
        let mut copied = 0u64;

        loop {
            if cancel.is_cancelled() {
                drop(dest);
                let _ = fs::remove_file(&self.target).await;
                return Err(TransferError::Cancelled);
            }
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n]).await?;
            copied += n as u64;
            progress.report(copied);
        }
        dest.flush().await?;

        info!("Committed {} ({} bytes)", self.id, copied);
        Ok(())
    }
}
