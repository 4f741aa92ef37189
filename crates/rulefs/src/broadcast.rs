//! Single-writer, many-reader byte stream that caches everything it carries.
//!
//! A recipe writes target bytes exactly once; any number of readers attach
//! before, during, or after the write and each sees the full stream from
//! offset zero.
//!
//! ```text
//!   BroadcastWriter ──▶ [Vec<u8> cache, append-only] ──▶ BroadcastClient*
//!                        ├── reader blocks when it has drained the cache
//!                        ├── close(Ok)  → readers reach clean end of stream
//!                        └── close(Err) → readers get the error after the
//!                            cached bytes
//! ```
//!
//! The cache is never evicted, so a client attached after close still
//! replays the whole stream. There is one logical producer; writes become
//! visible to every reader in write order.

use std::io;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

struct BroadcastState {
    cache: Vec<u8>,
    closed: bool,
    /// Terminal error, stored as kind + message so it can be re-materialized
    /// for every reader. `None` after a clean close.
    close_err: Option<(io::ErrorKind, String)>,
}

/// Shared broadcast buffer. Construct with [`Broadcast::new`], hand out
/// cursors with [`Broadcast::client`] and the writer with
/// [`Broadcast::writer`].
pub struct Broadcast {
    state: Mutex<BroadcastState>,
    update: Notify,
}

impl Broadcast {
    /// Create a new open, empty broadcast buffer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BroadcastState {
                cache: Vec::new(),
                closed: false,
                close_err: None,
            }),
            update: Notify::new(),
        })
    }

    /// Append bytes to the cache and wake all waiting readers.
    ///
    /// Fails with `io::ErrorKind::BrokenPipe` once the broadcast is closed.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "write on closed broadcast",
                ));
            }
            state.cache.extend_from_slice(buf);
        }
        self.update.notify_waiters();
        Ok(buf.len())
    }

    /// Close the broadcast, setting the terminal state and waking all
    /// readers. `Ok(())` closes cleanly (readers reach end of stream);
    /// `Err(e)` delivers `e` to every reader after the cached bytes.
    ///
    /// Only the first close sets the terminal state; later calls are no-ops.
    pub async fn close(&self, result: io::Result<()>) {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.close_err = result.err().map(|e| (e.kind(), e.to_string()));
        }
        self.update.notify_waiters();
    }

    /// Copy cached bytes at `offset` into `buf`, waiting for a write or
    /// close while `offset` is at the end of an open stream.
    async fn read_at(&self, buf: &mut [u8], offset: usize) -> io::Result<usize> {
        loop {
            let notified = self.update.notified();
            tokio::pin!(notified);
            {
                let state = self.state.lock().await;
                if offset < state.cache.len() {
                    let n = (state.cache.len() - offset).min(buf.len());
                    buf[..n].copy_from_slice(&state.cache[offset..offset + n]);
                    return Ok(n);
                }
                if state.closed {
                    return match &state.close_err {
                        None => Ok(0),
                        Some((kind, msg)) => Err(io::Error::new(*kind, msg.clone())),
                    };
                }
                // Register for the next notification while still holding the
                // lock, so a write between unlock and await cannot be missed.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Hand out an independent reader cursor starting at offset zero.
    pub fn client(self: &Arc<Self>) -> BroadcastClient {
        BroadcastClient {
            broadcast: self.clone(),
            offset: 0,
        }
    }

    /// Hand out the writer side.
    pub fn writer(self: &Arc<Self>) -> BroadcastWriter {
        BroadcastWriter {
            broadcast: self.clone(),
        }
    }
}

impl std::fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").finish()
    }
}

/// Reader cursor over a [`Broadcast`]. Cursors are mutually independent.
pub struct BroadcastClient {
    broadcast: Arc<Broadcast>,
    offset: usize,
}

impl BroadcastClient {
    /// Read the next bytes of the stream, blocking while the writer is
    /// still producing. Returns `Ok(0)` at a clean end of stream and the
    /// terminal error otherwise.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.broadcast.read_at(buf, self.offset).await?;
        self.offset += n;
        Ok(n)
    }

    /// Read the rest of the stream into `out`, returning the byte count.
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

    /// Discard the rest of the stream, returning how many bytes it held.
    pub async fn drain(&mut self) -> io::Result<u64> {
        let mut total = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}

/// Writer handle over a [`Broadcast`], cheap to clone.
#[derive(Clone)]
pub struct BroadcastWriter {
    broadcast: Arc<Broadcast>,
}

impl BroadcastWriter {
    /// Append bytes to the stream. See [`Broadcast::write`].
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.broadcast.write(buf).await
    }

    /// Append all of `buf` to the stream.
    pub async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.broadcast.write(buf).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_write_read() {
        let broadcast = Broadcast::new();
        broadcast.write(b"hello").await.unwrap();
        broadcast.close(Ok(())).await;

        let mut client = broadcast.client();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let broadcast = Broadcast::new();
        broadcast.close(Ok(())).await;

        let err = broadcast.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_late_attach_sees_full_stream() {
        let broadcast = Broadcast::new();
        broadcast.write(b"one ").await.unwrap();
        broadcast.write(b"two").await.unwrap();
        broadcast.close(Ok(())).await;

        // Attached after close, still replays from offset zero.
        let mut client = broadcast.client();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"one two");
    }

    #[tokio::test]
    async fn test_terminal_error_after_cached_bytes() {
        let broadcast = Broadcast::new();
        broadcast.write(b"partial").await.unwrap();
        broadcast
            .close(Err(io::Error::other("recipe exploded")))
            .await;

        let mut client = broadcast.client();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"partial");

        let err = client.read(&mut buf).await.unwrap_err();
        assert_eq!(err.to_string(), "recipe exploded");

        // The terminal error is delivered on every subsequent read.
        assert!(client.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let broadcast = Broadcast::new();
        broadcast.close(Ok(())).await;
        broadcast.close(Err(io::Error::other("too late"))).await;

        let mut client = broadcast.client();
        let mut buf = [0u8; 8];
        // First close wins: clean end of stream.
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reader_blocks_until_write() {
        let broadcast = Broadcast::new();
        let mut client = broadcast.client();

        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            client.read_to_end(&mut out).await.unwrap();
            out
        });

        // Give the reader a chance to park on the empty buffer.
        tokio::task::yield_now().await;
        broadcast.write(b"delayed").await.unwrap();
        broadcast.close(Ok(())).await;

        assert_eq!(reader.await.unwrap(), b"delayed");
    }

    #[tokio::test]
    async fn test_concurrent_clients_see_identical_streams() {
        let broadcast = Broadcast::new();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let mut client = broadcast.client();
            readers.push(tokio::spawn(async move {
                let mut out = Vec::new();
                client.read_to_end(&mut out).await.unwrap();
                out
            }));
        }

        for chunk in 0..32u8 {
            broadcast.write(&[chunk; 100]).await.unwrap();
        }
        broadcast.close(Ok(())).await;

        let expected: Vec<u8> = (0..32u8).flat_map(|c| vec![c; 100]).collect();
        for reader in readers {
            assert_eq!(reader.await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_monotonic_contiguous_reads() {
        let broadcast = Broadcast::new();
        broadcast.write(b"abcdefgh").await.unwrap();
        broadcast.close(Ok(())).await;

        let mut client = broadcast.client();
        let mut buf = [0u8; 3];
        let mut seen = Vec::new();
        loop {
            let n = client.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        assert_eq!(seen, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_drain_counts_bytes() {
        let broadcast = Broadcast::new();
        broadcast.write(&[0u8; 1234]).await.unwrap();
        broadcast.close(Ok(())).await;

        let mut client = broadcast.client();
        assert_eq!(client.drain().await.unwrap(), 1234);
    }
}
