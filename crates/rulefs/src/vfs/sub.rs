//! Subtree overlay: re-roots a filesystem at a subpath.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;

use crate::paths;

use super::traits::{File, Filesystem};

/// A filesystem rooted at a subpath of its base. Opening `/x` on a `SubFs`
/// rooted at `/sub` opens `/sub/x` on the base.
pub struct SubFs {
    base: Arc<dyn Filesystem>,
    root: String,
}

impl SubFs {
    /// Root `base` at `root`.
    pub fn new(base: Arc<dyn Filesystem>, root: &str) -> Self {
        Self {
            base,
            root: paths::clean(root),
        }
    }
}

#[async_trait]
impl Filesystem for SubFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let sub_path = paths::join(&self.root, path);
        if sub_path != self.root && !paths::is_ancestor(&self.root, &sub_path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("path escapes subtree root: {}", path),
            ));
        }
        self.base.open(&sub_path).await
    }
}

impl std::fmt::Debug for SubFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubFs").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    async fn fixture() -> SubFs {
        let fs = MemoryFs::new();
        fs.write_file("/a.txt", "top\n").await.unwrap();
        fs.write_file("/sub/a.txt", "inner\n").await.unwrap();
        SubFs::new(Arc::new(fs), "/sub")
    }

    #[tokio::test]
    async fn test_opens_relative_to_new_root() {
        let sub = fixture().await;
        let mut file = sub.open("/a.txt").await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"inner\n");
    }

    #[tokio::test]
    async fn test_missing_inside_subtree() {
        let sub = fixture().await;
        let err = match sub.open("/b.txt").await {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let sub = fixture().await;
        let err = match sub.open("/../a.txt").await {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let mut file = sub.open("/").await.unwrap();
        assert!(file.stat().await.unwrap().is_dir);
        let entries = file.readdir(0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
    }
}
