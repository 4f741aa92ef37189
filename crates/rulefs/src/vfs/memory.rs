//! In-memory tree filesystem.
//!
//! Serves two roles: a general-purpose base filesystem for tests and
//! embedded trees, and the stand-in node type for synthetic directories in
//! listing merges. All data is ephemeral.
//!
//! Every `open` returns an independent cursor over a snapshot of the node,
//! so concurrent opens of the same path never share read or readdir state.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::time::SystemTime;

use tokio::sync::RwLock;

use super::traits::{File, FileInfo, Filesystem, SeekFrom};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Vec<u8>,
        modified: SystemTime,
    },
    Dir {
        children: BTreeMap<String, Node>,
        modified: SystemTime,
    },
}

impl Node {
    fn dir() -> Self {
        Node::Dir {
            children: BTreeMap::new(),
            modified: SystemTime::now(),
        }
    }

    fn info(&self, name: &str) -> FileInfo {
        match self {
            Node::File { data, modified } => FileInfo {
                name: name.to_string(),
                size: data.len() as u64,
                mode: 0o444,
                modified: Some(*modified),
                is_dir: false,
            },
            Node::Dir { modified, .. } => FileInfo {
                name: name.to_string(),
                size: 0,
                mode: 0o444 | 0o111,
                modified: Some(*modified),
                is_dir: true,
            },
        }
    }
}

/// In-memory filesystem. Thread-safe via an internal `RwLock`.
///
/// The [`Filesystem`] impl is read-only like every other layer in the
/// stack; content is placed with the inherent [`write_file`](Self::write_file),
/// [`mkdir`](Self::mkdir), [`touch`](Self::touch) and
/// [`set_modified`](Self::set_modified) methods.
#[derive(Debug)]
pub struct MemoryFs {
    root: RwLock<Node>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new filesystem containing only the root directory.
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::dir()),
        }
    }

    /// Write a file, creating parent directories as needed.
    pub async fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> io::Result<()> {
        let segments = split_segments(path)?;
        let (dirs, name) = match segments.split_last() {
            Some((name, dirs)) => (dirs, name.clone()),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot write to the root directory",
                ))
            }
        };

        let mut root = self.root.write().await;
        let parent = ensure_dirs(&mut root, dirs)?;
        if let Some(Node::Dir { .. }) = parent.get(&name) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path),
            ));
        }
        parent.insert(
            name,
            Node::File {
                data: data.into(),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Create a directory (and parents). Creating an existing directory is
    /// not an error.
    pub async fn mkdir(&self, path: &str) -> io::Result<()> {
        let segments = split_segments(path)?;
        let mut root = self.root.write().await;
        ensure_dirs(&mut root, &segments)?;
        Ok(())
    }

    /// Bump a file's modification time to now, leaving contents unchanged.
    pub async fn touch(&self, path: &str) -> io::Result<()> {
        self.set_modified(path, SystemTime::now()).await
    }

    /// Set a file's modification time explicitly.
    pub async fn set_modified(&self, path: &str, time: SystemTime) -> io::Result<()> {
        let segments = split_segments(path)?;
        let mut root = self.root.write().await;
        let node = lookup_mut(&mut root, &segments).ok_or_else(|| not_found(path))?;
        match node {
            Node::File { modified, .. } | Node::Dir { modified, .. } => *modified = time,
        }
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        // A trailing slash only matches directories.
        let want_dir = path.len() > 1 && path.ends_with('/');
        let segments = split_segments(path)?;

        let root = self.root.read().await;
        let node = lookup(&root, &segments).ok_or_else(|| not_found(path))?;

        let name = segments.last().cloned().unwrap_or_else(|| "/".to_string());
        match node {
            Node::File { data, .. } => {
                if want_dir {
                    return Err(not_found(path));
                }
                Ok(Box::new(MemoryFile::file(name, node.info(""), data.clone())))
            }
            Node::Dir { children, .. } => {
                let entries = children
                    .iter()
                    .map(|(child_name, child)| child.info(child_name))
                    .collect();
                Ok(Box::new(MemoryFile::dir(name, node.info(""), entries)))
            }
        }
    }
}

/// Split a slash-separated path into case-sensitive lookup segments.
fn split_segments(path: &str) -> io::Result<Vec<String>> {
    if !path.starts_with('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path is not absolute: {}", path),
        ));
    }
    Ok(path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| s.to_string())
        .collect())
}

fn lookup<'a>(root: &'a Node, segments: &[String]) -> Option<&'a Node> {
    let mut node = root;
    for segment in segments {
        match node {
            Node::Dir { children, .. } => node = children.get(segment)?,
            Node::File { .. } => return None,
        }
    }
    Some(node)
}

fn lookup_mut<'a>(root: &'a mut Node, segments: &[String]) -> Option<&'a mut Node> {
    let mut node = root;
    for segment in segments {
        match node {
            Node::Dir { children, .. } => node = children.get_mut(segment)?,
            Node::File { .. } => return None,
        }
    }
    Some(node)
}

fn ensure_dirs<'a>(
    root: &'a mut Node,
    segments: &[String],
) -> io::Result<&'a mut BTreeMap<String, Node>> {
    let mut node = root;
    for segment in segments {
        let children = match node {
            Node::Dir { children, .. } => children,
            Node::File { .. } => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", segment),
                ))
            }
        };
        node = children.entry(segment.clone()).or_insert_with(Node::dir);
    }
    match node {
        Node::Dir { children, .. } => Ok(children),
        Node::File { .. } => Err(io::Error::new(
            io::ErrorKind::NotADirectory,
            "not a directory",
        )),
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {}", path))
}

fn closed(name: &str) -> io::Error {
    io::Error::other(format!("{}: bad file descriptor", name))
}

/// An open cursor over a snapshot of one node.
struct MemoryFile {
    name: String,
    info: FileInfo,
    data: Vec<u8>,
    entries: Option<Vec<FileInfo>>,
    offset: u64,
    dir_cursor: usize,
    is_closed: bool,
}

impl MemoryFile {
    fn file(name: String, mut info: FileInfo, data: Vec<u8>) -> Self {
        info.name = name.clone();
        Self {
            name,
            info,
            data,
            entries: None,
            offset: 0,
            dir_cursor: 0,
            is_closed: false,
        }
    }

    fn dir(name: String, mut info: FileInfo, entries: Vec<FileInfo>) -> Self {
        info.name = name.clone();
        Self {
            name,
            info,
            data: Vec::new(),
            entries: Some(entries),
            offset: 0,
            dir_cursor: 0,
            is_closed: false,
        }
    }
}

#[async_trait]
impl File for MemoryFile {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_closed {
            return Err(closed(&self.name));
        }
        if self.offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = self.offset as usize;
        let n = (self.data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.offset += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if self.is_closed {
            return Err(closed(&self.name));
        }
        if self.entries.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", self.name),
            ));
        }

        let (start, delta) = match pos {
            SeekFrom::Start(offset) => (0i128, offset as i128),
            SeekFrom::Current(offset) => (self.offset as i128, offset as i128),
            SeekFrom::End(offset) => (self.data.len() as i128, offset as i128),
        };
        let result = start + delta;
        if result < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("negative seek offset on: {}", self.name),
            ));
        }
        self.offset = result as u64;
        Ok(self.offset)
    }

    async fn readdir(&mut self, count: usize) -> io::Result<Vec<FileInfo>> {
        if self.is_closed {
            return Err(closed(&self.name));
        }
        let entries = self.entries.as_ref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", self.name),
            )
        })?;

        let rest = &entries[self.dir_cursor.min(entries.len())..];
        if count == 0 {
            self.dir_cursor = entries.len();
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
            return Err(closed(&self.name));
        }
        Ok(self.info.clone())
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.is_closed {
            return Err(closed(&self.name));
        }
        self.is_closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write_file("/test.txt", "hello world").await.unwrap();

        let mut file = fs.open("/test.txt").await.unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MemoryFs::new();
        let err = match fs.open("/nonexistent.txt").await {
            Err(err) => err,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_nested_directories_created() {
        let fs = MemoryFs::new();
        fs.write_file("/a/b/c/file.txt", "nested").await.unwrap();

        for dir in ["/a", "/a/b", "/a/b/c"] {
            let file = fs.open(dir).await.unwrap();
            assert!(file.stat().await.unwrap().is_dir, "{dir}");
        }
    }

    #[tokio::test]
    async fn test_list_directory() {
        let fs = MemoryFs::new();
        fs.write_file("/a.txt", "a").await.unwrap();
        fs.write_file("/b.txt", "b").await.unwrap();
        fs.mkdir("/subdir").await.unwrap();

        let mut root = fs.open("/").await.unwrap();
        let entries = root.readdir(0).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);
    }

    #[tokio::test]
    async fn test_readdir_in_batches() {
        let fs = MemoryFs::new();
        for name in ["a", "b", "c"] {
            fs.write_file(&format!("/{name}"), name).await.unwrap();
        }

        let mut root = fs.open("/").await.unwrap();
        let first = root.readdir(2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = root.readdir(2).await.unwrap();
        assert_eq!(second.len(), 1);

        let err = root.readdir(2).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_readdir_restarts_on_reopen() {
        let fs = MemoryFs::new();
        fs.write_file("/x", "x").await.unwrap();

        let mut first = fs.open("/").await.unwrap();
        assert_eq!(first.readdir(0).await.unwrap().len(), 1);
        assert!(first.readdir(0).await.unwrap().is_empty());

        let mut again = fs.open("/").await.unwrap();
        assert_eq!(again.readdir(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_independent_cursors() {
        let fs = MemoryFs::new();
        fs.write_file("/shared.txt", "abcdef").await.unwrap();

        let mut one = fs.open("/shared.txt").await.unwrap();
        let mut two = fs.open("/shared.txt").await.unwrap();

        let mut buf = [0u8; 3];
        one.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");

        // The second handle still starts at offset zero.
        two.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn test_seek_whences() {
        let fs = MemoryFs::new();
        fs.write_file("/s.txt", "0123456789").await.unwrap();
        let mut file = fs.open("/s.txt").await.unwrap();

        assert_eq!(file.seek(SeekFrom::Start(4)).await.unwrap(), 4);
        let mut buf = [0u8; 2];
        file.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"45");

        assert_eq!(file.seek(SeekFrom::Current(-2)).await.unwrap(), 4);
        assert_eq!(file.seek(SeekFrom::End(-1)).await.unwrap(), 9);

        let err = file.seek(SeekFrom::Start(0)).await;
        assert!(err.is_ok());
        let err = file.seek(SeekFrom::Current(-5)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_seek_on_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir("/d").await.unwrap();
        let mut dir = fs.open("/d").await.unwrap();
        let err = dir.seek(SeekFrom::Start(0)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }

    #[tokio::test]
    async fn test_double_close_and_read_after_close() {
        let fs = MemoryFs::new();
        fs.write_file("/c.txt", "x").await.unwrap();
        let mut file = fs.open("/c.txt").await.unwrap();

        file.close().await.unwrap();
        assert!(file.close().await.is_err());

        let mut buf = [0u8; 1];
        assert!(file.read(&mut buf).await.is_err());
        assert!(file.stat().await.is_err());
    }

    #[tokio::test]
    async fn test_trailing_slash_only_matches_directories() {
        let fs = MemoryFs::new();
        fs.write_file("/f.txt", "x").await.unwrap();
        fs.mkdir("/d").await.unwrap();

        assert!(fs.open("/f.txt/").await.is_err());
        assert!(fs.open("/d/").await.is_ok());
        assert!(fs.open("/d").await.is_ok());
    }

    #[tokio::test]
    async fn test_stat_modes() {
        let fs = MemoryFs::new();
        fs.write_file("/f.txt", "data").await.unwrap();
        fs.mkdir("/d").await.unwrap();

        let file = fs.open("/f.txt").await.unwrap();
        let info = file.stat().await.unwrap();
        assert_eq!(info.mode, 0o444);
        assert_eq!(info.size, 4);

        let dir = fs.open("/d").await.unwrap();
        let info = dir.stat().await.unwrap();
        assert_eq!(info.mode, 0o555);
        assert!(info.is_dir);
    }

    #[tokio::test]
    async fn test_touch_changes_modified() {
        let fs = MemoryFs::new();
        fs.write_file("/t.txt", "same").await.unwrap();

        let before = fs.open("/t.txt").await.unwrap().stat().await.unwrap();
        fs.set_modified("/t.txt", SystemTime::UNIX_EPOCH).await.unwrap();
        let after = fs.open("/t.txt").await.unwrap().stat().await.unwrap();

        assert_ne!(before.modified, after.modified);
        assert_eq!(after.modified, Some(SystemTime::UNIX_EPOCH));
    }

    #[tokio::test]
    async fn test_overwrite_directory_fails() {
        let fs = MemoryFs::new();
        fs.mkdir("/d").await.unwrap();
        let err = fs.write_file("/d", "nope").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }

    #[tokio::test]
    async fn test_case_sensitive_lookup() {
        let fs = MemoryFs::new();
        fs.write_file("/File.txt", "x").await.unwrap();
        assert!(fs.open("/file.txt").await.is_err());
        assert!(fs.open("/File.txt").await.is_ok());
    }
}
