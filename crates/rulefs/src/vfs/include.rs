//! Include overlay: admit only whitelisted path prefixes.
//!
//! Paths under a listed prefix pass through to the base. Ancestor
//! directories of a prefix are admitted too, so the whitelisted subtrees
//! stay reachable from the root; their listings are filtered by the same
//! predicate, so nothing outside the whitelist is enumerated.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;

use crate::paths;

use super::traits::{File, FileInfo, Filesystem, SeekFrom};

/// A filesystem that only exposes the configured prefixes of its base.
pub struct IncludeFs {
    base: Arc<dyn Filesystem>,
    includes: Vec<String>,
}

impl IncludeFs {
    /// Restrict `base` to the given absolute prefixes.
    pub fn new(base: Arc<dyn Filesystem>, includes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            base,
            includes: includes
                .into_iter()
                .map(|p| paths::clean(&p.into()))
                .collect(),
        }
    }

    /// A path is admitted when it is a listed prefix, lives under one, or
    /// is an ancestor directory of one.
    fn admits(&self, path: &str) -> bool {
        self.includes.iter().any(|include| {
            path == include
                || paths::is_ancestor(include, path)
                || paths::is_ancestor(path, include)
        })
    }
}

#[async_trait]
impl Filesystem for IncludeFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let cleaned = paths::clean(path);
        if !self.admits(&cleaned) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not found: {}", path),
            ));
        }
        let file = self.base.open(&cleaned).await?;
        Ok(Box::new(FilteredFile {
            inner: file,
            path: cleaned,
            includes: self.includes.clone(),
        }))
    }
}

impl std::fmt::Debug for IncludeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeFs")
            .field("includes", &self.includes)
            .finish()
    }
}

/// Wrapper that filters directory listings by the admit predicate.
struct FilteredFile {
    inner: Box<dyn File>,
    path: String,
    includes: Vec<String>,
}

impl FilteredFile {
    fn admits(&self, entry_path: &str) -> bool {
        self.includes.iter().any(|include| {
            entry_path == include
                || paths::is_ancestor(include, entry_path)
                || paths::is_ancestor(entry_path, include)
        })
    }
}

#[async_trait]
impl File for FilteredFile {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos).await
    }

    async fn readdir(&mut self, count: usize) -> io::Result<Vec<FileInfo>> {
        let entries = self.inner.readdir(count).await?;
        Ok(entries
            .into_iter()
            .filter(|info| self.admits(&paths::join(&self.path, &info.name)))
            .collect())
    }

    async fn stat(&self) -> io::Result<FileInfo> {
        self.inner.stat().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}
