//! One scheduled recipe execution for a (target, sources) tuple.
//!
//! A task guarantees at-most-once execution: the first consumer to need the
//! target's bytes triggers a detached worker; every later consumer attaches
//! a broadcast client to the same run. The worker opens all sources in
//! order, invokes the recipe, closes the target with the recipe's result,
//! and closes the sources.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::broadcast::{Broadcast, BroadcastClient};
use crate::recipe::{Recipe, TaskIo};
use crate::source::Source;

/// The deferred work of a task: taken exactly once by the first starter.
struct Work {
    sources: Vec<Source>,
    recipe: Arc<dyn Recipe>,
}

/// A single recipe execution bound to one target path.
pub struct Task {
    target_path: String,
    broadcast: Arc<Broadcast>,
    /// (path, modified-at-discovery) per source, in rule order. Kept
    /// separate from `work` so freshness checks remain possible after the
    /// worker has consumed the sources.
    inputs: Vec<(String, Option<SystemTime>)>,
    work: Mutex<Option<Work>>,
    started: AtomicBool,
}

impl Task {
    pub(crate) fn new(
        target_path: String,
        sources: Vec<Source>,
        recipe: Arc<dyn Recipe>,
    ) -> Arc<Self> {
        let inputs = sources
            .iter()
            .map(|s| (s.path().to_string(), s.modified()))
            .collect();
        Arc::new(Self {
            target_path,
            broadcast: Broadcast::new(),
            inputs,
            work: Mutex::new(Some(Work { sources, recipe })),
            started: AtomicBool::new(false),
        })
    }

    /// The target path this task produces.
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Returns true if `other` would consume the same inputs: equal target
    /// path, equal source count, and per-index equal source paths and
    /// discovery-time modification times. This is the cache-freshness check.
    pub(crate) fn same_inputs(&self, other: &Task) -> bool {
        self.target_path == other.target_path && self.inputs == other.inputs
    }

    /// Start the recipe worker unless it has already been started, in which
    /// case the call is a no-op.
    pub(crate) fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let work = self
            .work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(work) = work else { return };

        let broadcast = self.broadcast.clone();
        let target_path = self.target_path.clone();
        tokio::spawn(run(target_path, broadcast, work));
    }

    /// Start the task (if needed) and attach a new reader at offset zero.
    pub(crate) fn start_and_attach(&self) -> BroadcastClient {
        self.start();
        self.broadcast.client()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("target_path", &self.target_path)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

/// The detached worker driving one recipe execution.
async fn run(target_path: String, broadcast: Arc<Broadcast>, work: Work) {
    let Work { mut sources, recipe } = work;

    tracing::debug!("starting recipe for {}", target_path);

    // Open every source in order; the first failure terminates the target.
    for i in 0..sources.len() {
        if let Err(err) = sources[i].open().await {
            tracing::warn!("failed to open source {}: {}", sources[i].path(), err);
            broadcast.close(Err(err)).await;
            for opened in &mut sources[..i] {
                let _ = opened.close().await;
            }
            return;
        }
    }

    let mut task_io = TaskIo::new(broadcast.writer(), sources);
    let result = recipe.cook(&mut task_io).await;
    if let Err(ref err) = result {
        tracing::warn!("recipe for {} failed: {}", target_path, err);
    }
    broadcast.close(result).await;

    for source in &mut task_io.into_sources() {
        let _ = source.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{FileInfo, Filesystem, MemoryFs};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingCat {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Recipe for CountingCat {
        async fn cook(&self, task: &mut TaskIo) -> io::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let target = task.target();
            for source in task.sources() {
                let mut out = Vec::new();
                source.read_to_end(&mut out).await?;
                target.write_all(&out).await?;
            }
            Ok(())
        }
    }

    struct FailingRecipe;

    #[async_trait]
    impl Recipe for FailingRecipe {
        async fn cook(&self, _task: &mut TaskIo) -> io::Result<()> {
            Err(io::Error::other("burnt"))
        }
    }

    async fn fixture_task(runs: Arc<AtomicUsize>) -> Arc<Task> {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/in.txt", "bytes\n").await.unwrap();
        // Pin the mod-time so two fixture snapshots compare equal.
        fs.set_modified("/in.txt", SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000))
            .await
            .unwrap();
        let stat = fs.open("/in.txt").await.unwrap().stat().await.unwrap();
        let fs: Arc<dyn Filesystem> = fs;
        let source = Source::new("/in.txt".to_string(), fs, stat);
        Task::new(
            "/out.txt".to_string(),
            vec![source],
            Arc::new(CountingCat { runs }),
        )
    }

    #[tokio::test]
    async fn test_runs_recipe_and_streams_output() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = fixture_task(runs.clone()).await;

        let mut client = task.start_and_attach();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"bytes\n");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_at_most_once_start() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = fixture_task(runs.clone()).await;

        let mut readers = Vec::new();
        for _ in 0..8 {
            let mut client = task.start_and_attach();
            readers.push(tokio::spawn(async move {
                let mut out = Vec::new();
                client.read_to_end(&mut out).await.unwrap();
                out
            }));
        }
        for reader in readers {
            assert_eq!(reader.await.unwrap(), b"bytes\n");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recipe_error_reaches_readers() {
        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/in.txt", "x").await.unwrap();
        let stat = fs.open("/in.txt").await.unwrap().stat().await.unwrap();
        let fs: Arc<dyn Filesystem> = fs;
        let source = Source::new("/in.txt".to_string(), fs, stat);
        let task = Task::new("/out.txt".to_string(), vec![source], Arc::new(FailingRecipe));

        let mut client = task.start_and_attach();
        let mut buf = [0u8; 8];
        let err = client.read(&mut buf).await.unwrap_err();
        assert_eq!(err.to_string(), "burnt");
    }

    #[tokio::test]
    async fn test_missing_source_terminates_target() {
        let fs: Arc<dyn Filesystem> = Arc::new(MemoryFs::new());
        let source = Source::new(
            "/gone.txt".to_string(),
            fs,
            FileInfo::file("gone.txt", 0),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let task = Task::new(
            "/out.txt".to_string(),
            vec![source],
            Arc::new(CountingCat { runs: runs.clone() }),
        );

        let mut client = task.start_and_attach();
        let mut buf = [0u8; 8];
        let err = client.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        // The recipe never ran.
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_inputs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let a = fixture_task(runs.clone()).await;
        let b = fixture_task(runs.clone()).await;
        // Same path, same snapshot of the same file.
        assert!(a.same_inputs(&b));

        let fs = Arc::new(MemoryFs::new());
        fs.write_file("/in.txt", "bytes\n").await.unwrap();
        fs.set_modified("/in.txt", SystemTime::UNIX_EPOCH)
            .await
            .unwrap();
        let stat = fs.open("/in.txt").await.unwrap().stat().await.unwrap();
        let fs: Arc<dyn Filesystem> = fs;
        let source = Source::new("/in.txt".to_string(), fs, stat);
        let stale = Task::new(
            "/out.txt".to_string(),
            vec![source],
            Arc::new(CountingCat { runs }),
        );
        assert!(!a.same_inputs(&stale));
    }
}
