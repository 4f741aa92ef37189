//! Source handles: the inputs a recipe reads from.
//!
//! A source is resolved during rule matching and captures the metadata seen
//! at discovery time; the file itself is opened lazily when the owning task
//! starts, and closed when the task finishes.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use crate::vfs::{File, FileInfo, Filesystem};

/// One resolved source of a task.
pub struct Source {
    path: String,
    fs: Arc<dyn Filesystem>,
    stat: FileInfo,
    file: Option<Box<dyn File>>,
}

impl Source {
    pub(crate) fn new(path: String, fs: Arc<dyn Filesystem>, stat: FileInfo) -> Self {
        Self {
            path,
            fs,
            stat,
            file: None,
        }
    }

    /// Open the source against its parent filesystem. Opening twice is a
    /// lifecycle error.
    pub(crate) async fn open(&mut self) -> io::Result<()> {
        if self.file.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("source already open: {}", self.path),
            ));
        }
        self.file = Some(self.fs.open(&self.path).await?);
        Ok(())
    }

    /// Close the source. Closing before opening is a lifecycle error.
    pub(crate) async fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => file.close().await,
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("source not open: {}", self.path),
            )),
        }
    }

    /// Read from the opened source file.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.read(buf).await,
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("source not open: {}", self.path),
            )),
        }
    }

    /// Read the rest of the source into `out`, returning the byte count.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        let mut total = 0;
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// The resolved source path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The modification time captured at discovery.
    pub fn modified(&self) -> Option<SystemTime> {
        self.stat.modified
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish()
    }
}
