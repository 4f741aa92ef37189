//! The rule overlay filesystem.
//!
//! `RuleFs` layers one rule over a parent filesystem. Opening a path either
//! synthesizes a target (backed by a cached task), passes through to the
//! parent with directory listings hijacked so virtual targets appear as
//! regular entries, or manufactures a synthetic intermediate directory when
//! a target lives below a directory the parent does not have.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::paths;
use crate::rule::Rule;
use crate::source::Source;
use crate::target::TargetFile;
use crate::task::Task;
use crate::vfs::{File, FileInfo, Filesystem, SeekFrom};

/// A filesystem overlay applying one rule on top of a parent filesystem.
pub struct RuleFs {
    shared: Arc<Shared>,
}

struct Shared {
    parent: Arc<dyn Filesystem>,
    rule: Rule,
    /// Most recently synthesized task per target path. Entries are replaced
    /// when a new resolution sees different sources or mod-times; cache hits
    /// share one recipe execution.
    tasks: Mutex<HashMap<String, Arc<Task>>>,
}

impl RuleFs {
    /// Overlay `rule` on top of `parent`.
    pub fn new(parent: Arc<dyn Filesystem>, rule: Rule) -> Self {
        Self {
            shared: Arc::new(Shared {
                parent,
                rule,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl Filesystem for RuleFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        Shared::open(&self.shared, &paths::clean(path)).await
    }
}

impl std::fmt::Debug for RuleFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFs")
            .field("rule", &self.shared.rule)
            .finish()
    }
}

impl Shared {
    async fn open(this: &Arc<Shared>, path: &str) -> io::Result<Box<dyn File>> {
        // Task synthesis comes first so targets shadow same-named parent
        // files (a rule may consume its own target's path).
        if let Some(sources) = this.rule.find_sources(path, &this.parent).await? {
            let task = this.cached_task(path, sources).await;
            return Ok(Box::new(TargetFile::new(task, path.to_string())));
        }

        match this.parent.open(path).await {
            Ok(file) => Ok(Box::new(ListingProxy {
                inner: file,
                shared: this.clone(),
                path: path.to_string(),
                listed: false,
            })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // The parent has nothing here, but a discoverable target
                // deeper down makes this a synthetic intermediate directory.
                let targets = this.rule.find_target_paths(&this.parent).await?;
                if targets.iter().any(|t| paths::is_ancestor(path, t)) {
                    Ok(Box::new(ListingProxy {
                        inner: Box::new(SyntheticDir::new(path)),
                        shared: this.clone(),
                        path: path.to_string(),
                        listed: false,
                    }))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Look up or replace the cached task for `path`. All cache mutation
    /// happens under the overlay mutex; the mutex is never held while a
    /// recipe runs.
    async fn cached_task(&self, path: &str, sources: Vec<Source>) -> Arc<Task> {
        let candidate = Task::new(path.to_string(), sources, self.rule.recipe());

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(path) {
            if existing.same_inputs(&candidate) {
                tracing::debug!("task cache hit for {}", path);
                return existing.clone();
            }
            tracing::debug!("sources changed, rebuilding task for {}", path);
        }
        tasks.insert(path.to_string(), candidate.clone());
        candidate
    }

    /// The listing merge: parent entries plus synthesized target entries
    /// plus synthetic child directories, deduplicated by path and sorted by
    /// name.
    async fn merge_readdir(
        this: &Arc<Shared>,
        inner: &mut Box<dyn File>,
        dir_path: &str,
    ) -> io::Result<Vec<FileInfo>> {
        let parent_entries = match inner.readdir(0).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Vec::new(),
            Err(err) => return Err(err),
        };

        let mut seen = BTreeSet::new();
        let mut results = Vec::new();

        for target in this.rule.find_target_paths(&this.parent).await? {
            if paths::dir(&target) == dir_path {
                let mut file = Shared::open(this, &target).await?;
                let info = file.stat().await?;
                let _ = file.close().await;
                if seen.insert(target) {
                    results.push(info);
                }
            } else if paths::is_ancestor(dir_path, &target) {
                let child = paths::first_segment_below(dir_path, &target);
                let child_path = paths::join(dir_path, &child);
                if seen.insert(child_path) {
                    results.push(
                        FileInfo::directory(child).with_modified(SystemTime::now()),
                    );
                }
            }
        }

        for info in parent_entries {
            let path = paths::join(dir_path, &info.name);
            if seen.insert(path) {
                results.push(info);
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }
}

/// Passthrough file wrapper that preserves all operations but routes
/// `readdir` through the overlay's listing merge.
struct ListingProxy {
    inner: Box<dyn File>,
    shared: Arc<Shared>,
    path: String,
    /// The merged listing is built in one pass; a drained stream stays
    /// drained until the path is re-opened.
    listed: bool,
}

#[async_trait]
impl File for ListingProxy {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos).await
    }

    async fn readdir(&mut self, count: usize) -> io::Result<Vec<FileInfo>> {
        if count > 0 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "partial directory listings are not supported by rule overlays",
            ));
        }
        if self.listed {
            return Ok(Vec::new());
        }
        let entries = Shared::merge_readdir(&self.shared, &mut self.inner, &self.path).await?;
        self.listed = true;
        Ok(entries)
    }

    async fn stat(&self) -> io::Result<FileInfo> {
        self.inner.stat().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}

/// Stand-in directory node for intermediate directories that exist only
/// because a rule target lives beneath them. Its own listing is empty; the
/// wrapping proxy contributes the synthesized entries.
struct SyntheticDir {
    name: String,
}

impl SyntheticDir {
    fn new(path: &str) -> Self {
        Self {
            name: paths::base(path),
        }
    }
}

#[async_trait]
impl File for SyntheticDir {
    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("is a directory: {}", self.name),
        ))
    }

    async fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            format!("is a directory: {}", self.name),
        ))
    }

    async fn readdir(&mut self, _count: usize) -> io::Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }

    async fn stat(&self) -> io::Result<FileInfo> {
        Ok(FileInfo::directory(self.name.clone())
            .with_mode(0o444 | 0o111)
            .with_modified(SystemTime::now()))
    }

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
