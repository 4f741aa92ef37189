//! Target files: the synthesized outputs a consumer opens.
//!
//! A target file is a [`File`] adapter over a task's broadcast buffer. The
//! first read (or a stat, which needs the size) starts the task; the bytes
//! then stream to this handle as the recipe produces them.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use crate::broadcast::BroadcastClient;
use crate::paths;
use crate::task::Task;
use crate::vfs::{File, FileInfo, SeekFrom};

/// An open handle on a rule target.
pub struct TargetFile {
    task: Arc<Task>,
    path: String,
    client: Option<BroadcastClient>,
}

impl TargetFile {
    pub(crate) fn new(task: Arc<Task>, path: String) -> Self {
        Self {
            task,
            path,
            client: None,
        }
    }
}

#[async_trait]
impl File for TargetFile {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let task = &self.task;
        let client = self.client.get_or_insert_with(|| task.start_and_attach());
        client.read(buf).await
    }

    async fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        // The byte stream is append-only and may not exist yet.
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("seek on synthesized target: {}", self.path),
        ))
    }

    async fn readdir(&mut self, _count: usize) -> io::Result<Vec<FileInfo>> {
        Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            format!("target file is not a directory: {}", self.path),
        ))
    }

    /// Synthesize metadata for the target.
    ///
    /// Targets are not timestamped, so the mod-time is the current wall
    /// clock. The size is determined by starting the task and draining a
    /// fresh broadcast client to its end, so calling `stat` forces recipe
    /// execution; a recipe failure surfaces as this call's error.
    async fn stat(&self) -> io::Result<FileInfo> {
        let mut client = self.task.start_and_attach();
        let size = client.drain().await?;
        Ok(FileInfo {
            name: paths::base(&self.path),
            size,
            mode: 0,
            modified: Some(SystemTime::now()),
            is_dir: false,
        })
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for TargetFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetFile").field("path", &self.path).finish()
    }
}
