//! Recipes: user-supplied transformations from source bytes to target bytes.
//!
//! A recipe receives a [`TaskIo`] view exposing the target as a writer and
//! the opened sources as readers. Whatever error it returns becomes the
//! terminal read error every attached reader of the target observes.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::broadcast::BroadcastWriter;
use crate::source::Source;

/// A transformation from opened sources to a produced target byte stream.
#[async_trait]
pub trait Recipe: Send + Sync {
    /// Produce the target. Writes go to `task.target()`; reads come from
    /// `task.source()` / `task.sources()`.
    async fn cook(&self, task: &mut TaskIo) -> io::Result<()>;
}

/// The view of a running task handed to its recipe.
pub struct TaskIo {
    target: BroadcastWriter,
    sources: Vec<Source>,
}

impl TaskIo {
    pub(crate) fn new(target: BroadcastWriter, sources: Vec<Source>) -> Self {
        Self { target, sources }
    }

    pub(crate) fn into_sources(self) -> Vec<Source> {
        self.sources
    }

    /// The target writer. Cheap to clone out of the view.
    pub fn target(&self) -> BroadcastWriter {
        self.target.clone()
    }

    /// The first source. Rules guarantee at least one source, so this never
    /// fails for a task built through the overlay.
    pub fn source(&mut self) -> &mut Source {
        &mut self.sources[0]
    }

    /// All sources, in rule order.
    pub fn sources(&mut self) -> &mut [Source] {
        &mut self.sources
    }
}

/// A recipe that runs an external command: the first source is streamed to
/// stdin, and stdout and stderr are both streamed to the target.
pub struct ExecRecipe {
    command: String,
    args: Vec<String>,
}

impl ExecRecipe {
    /// Create a recipe running `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument, builder-style.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl Recipe for ExecRecipe {
    async fn cook(&self, task: &mut TaskIo) -> io::Result<()> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout unavailable"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr unavailable"))?;

        let mut input = Vec::new();
        task.source().read_to_end(&mut input).await?;

        // Feed stdin from its own task so a child that writes before
        // draining its input cannot deadlock the copy loops below.
        let feeder = tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
            // Dropping stdin closes the pipe and signals EOF.
        });

        let out_target = task.target();
        let err_target = task.target();
        let (out_result, err_result) = tokio::join!(
            async move {
                let mut buf = [0u8; 8192];
                loop {
                    let n = stdout.read(&mut buf).await?;
                    if n == 0 {
                        return io::Result::Ok(());
                    }
                    out_target.write_all(&buf[..n]).await?;
                }
            },
            async move {
                let mut buf = [0u8; 8192];
                loop {
                    let n = stderr.read(&mut buf).await?;
                    if n == 0 {
                        return io::Result::Ok(());
                    }
                    err_target.write_all(&buf[..n]).await?;
                }
            }
        );
        out_result?;
        err_result?;

        let _ = feeder.await;

        let status = child.wait().await?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "{}: exited with {}",
                self.command, status
            )));
        }
        Ok(())
    }
}
