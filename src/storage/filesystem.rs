//! File system abstraction
//!
//! Command handlers only see virtual paths and this trait; the backing store
//! decides where bytes actually live.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local};
use std::time::SystemTime;
use tokio::io::AsyncRead;

use crate::background::BackgroundTransfer;
use crate::error::FileSystemError;

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// One directory entry as shown by LIST and NLST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileEntry {
    /// Formats the entry as an `ls -l` style line.
    pub fn to_list_line(&self) -> String {
        let kind = if self.is_dir { 'd' } else { '-' };
        let perms = if self.is_dir { "rwxr-xr-x" } else { "rw-r--r--" };
        format!(
            "{}{} 1 ftp ftp {:>12} {} {}",
            kind,
            perms,
            self.size,
            format_modified(self.modified),
            self.name
        )
    }
}

/// `Mon dd HH:MM` for this year, `Mon dd  YYYY` otherwise.
fn format_modified(modified: Option<SystemTime>) -> String {
    let time: DateTime<Local> = modified.unwrap_or(SystemTime::UNIX_EPOCH).into();
    if time.year() == Local::now().year() {
        time.format("%b %d %H:%M").to_string()
    } else {
        time.format("%b %d  %Y").to_string()
    }
}

/// Storage backend used by the file commands.
///
/// Every path is a normalized virtual path produced by
/// [`resolve_virtual_path`](crate::storage::resolve_virtual_path).
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn metadata(&self, path: &str) -> Result<FileEntry, FileSystemError>;

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, FileSystemError>;

    async fn open_read(&self, path: &str) -> Result<FileReader, FileSystemError>;

    /// Consumes `data` into `path`. A backend may defer the final step of the
    /// store, in which case the returned transfer completes it.
    async fn store(
        &self,
        path: &str,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<Option<Box<dyn BackgroundTransfer>>, FileSystemError>;

    async fn delete(&self, path: &str) -> Result<(), FileSystemError>;

    async fn create_dir(&self, path: &str) -> Result<(), FileSystemError>;

    async fn remove_dir(&self, path: &str) -> Result<(), FileSystemError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_line_layout() {
        let entry = FileEntry {
            name: "notes.txt".into(),
            is_dir: false,
            size: 1234,
            modified: Some(SystemTime::now()),
        };
        let line = entry.to_list_line();
        assert!(line.starts_with("-rw-r--r-- 1 ftp ftp         1234 "));
        assert!(line.ends_with(" notes.txt"));
    }

    #[test]
    fn test_directories_are_marked() {
        let entry = FileEntry {
            name: "pub".into(),
            is_dir: true,
            size: 0,
            modified: None,
        };
        assert!(entry.to_list_line().starts_with("drwxr-xr-x"));
    }
}
