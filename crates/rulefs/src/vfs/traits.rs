//! Core filesystem traits.
//!
//! Every layer in the stack (base filesystems, rule overlays, thin filters)
//! consumes and exposes the same narrow interface: `open` a path, get back a
//! [`File`]. Overlays compose because both sides of the contract are
//! identical.

use async_trait::async_trait;
use std::io;

pub use std::io::SeekFrom;

pub use rulefs_types::FileInfo;

/// Abstract read-only filesystem interface.
///
/// Paths are absolute and `/`-separated on every platform. Implementations
/// classify a missing path as `io::ErrorKind::NotFound`; overlays rely on
/// that distinction to fall through to their parent.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Open the file or directory at `path`.
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>>;
}

/// An open file or directory handle.
///
/// Each open returns an independent cursor: two concurrent opens of the same
/// path never share read or readdir state. The directory stream is
/// restartable only by re-opening.
#[async_trait]
pub trait File: Send + Sync {
    /// Read up to `buf.len()` bytes. Returns `Ok(0)` at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reposition the read cursor. A resulting offset below zero is
    /// `io::ErrorKind::InvalidInput`.
    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Read directory entries.
    ///
    /// `count == 0` returns all remaining entries. A positive `count`
    /// returns at most `count` entries and fails with
    /// `io::ErrorKind::UnexpectedEof` once the stream is drained.
    async fn readdir(&mut self, count: usize) -> io::Result<Vec<FileInfo>>;

    /// Get metadata for this handle.
    async fn stat(&self) -> io::Result<FileInfo>;

    /// Close the handle. Implementations may reject double closes.
    async fn close(&mut self) -> io::Result<()>;

    /// Read the remaining stream into `out`, returning the byte count.
    async fn read_to_end(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
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
}
