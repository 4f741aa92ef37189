//! Real-directory adapter.
//!
//! Roots virtual paths in a real directory, read-only. This is the usual
//! base of an overlay stack outside of tests.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::paths;

use super::traits::{File, FileInfo, Filesystem, SeekFrom};

/// Read-only filesystem over a real directory.
///
/// A virtual path like `/src/main.rs` on a `DirFs` rooted at
/// `/home/amy/project` resolves to `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Create a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let cleaned = paths::clean(path);
        let mut real = self.root.clone();
        for segment in cleaned.split('/').filter(|s| !s.is_empty()) {
            real.push(segment);
        }
        real
    }
}

#[async_trait]
impl Filesystem for DirFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let real = self.resolve(path);
        let metadata = fs::metadata(&real).await?;
        let name = paths::base(path);

        if metadata.is_dir() {
            let mut entries = Vec::new();
            let mut dir = fs::read_dir(&real).await?;
            while let Some(entry) = dir.next_entry().await? {
                let entry_meta = entry.metadata().await?;
                entries.push(entry_info(
                    &entry.file_name().to_string_lossy(),
                    &entry_meta,
                ));
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(Box::new(LocalFile {
                name: name.clone(),
                info: entry_info(&name, &metadata),
                file: None,
                entries,
                dir_cursor: 0,
                is_closed: false,
            }))
        } else {
            let file = fs::File::open(&real).await?;
            Ok(Box::new(LocalFile {
                name: name.clone(),
                info: entry_info(&name, &metadata),
                file: Some(file),
                entries: Vec::new(),
                dir_cursor: 0,
                is_closed: false,
            }))
        }
    }
}

fn entry_info(name: &str, metadata: &std::fs::Metadata) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        mode: permission_mode(metadata),
        modified: metadata.modified().ok(),
        is_dir: metadata.is_dir(),
    }
}

#[cfg(unix)]
fn permission_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_mode(_metadata: &std::fs::Metadata) -> u32 {
    0
}

struct LocalFile {
    name: String,
    info: FileInfo,
    file: Option<fs::File>,
    entries: Vec<FileInfo>,
    dir_cursor: usize,
    is_closed: bool,
}

impl LocalFile {
    fn closed_err(&self) -> io::Error {
        io::Error::other(format!("{}: bad file descriptor", self.name))
    }
}

#[async_trait]
impl File for LocalFile {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_closed {
            return Err(self.closed_err());
        }
        match &mut self.file {
            Some(file) => file.read(buf).await,
            None => Ok(0),
        }
    }

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.is_closed {
            return Err(self.closed_err());
        }
        match &mut self.file {
            Some(file) => file.seek(pos).await,
            None => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", self.name),
            )),
        }
    }

    async fn readdir(&mut self, count: usize) -> io::Result<Vec<FileInfo>> {
        if self.is_closed {
            return Err(self.closed_err());
        }
        if self.file.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", self.name),
            ));
        }

        let rest = &self.entries[self.dir_cursor.min(self.entries.len())..];
        if count == 0 {
            self.dir_cursor = self.entries.len();
            return Ok(rest.to_vec());
        }
        if rest.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "end of directory stream",
            ));
        }
        let n = count.min(rest.len());
        self.dir_cursor += n;
        Ok(rest[..n].to_vec())
    }

    async fn stat(&self) -> io::Result<FileInfo> {
        if self.is_closed {
            return Err(self.closed_err());
        }
        Ok(self.info.clone())
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.is_closed {
            return Err(self.closed_err());
        }
        self.is_closed = true;
        self.file = None;
        Ok(())
    }
}
