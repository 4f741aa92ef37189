//! rulefs: a virtual filesystem overlay that synthesizes derived files on
//! demand from make-style rules.
//!
//! A rule pairs a target pattern with source patterns and a recipe, in the
//! spirit of GNU Make's pattern rules. Mounting rules over a read-only base
//! filesystem produces an overlay where opening a target path runs the
//! recipe and streams its output to the reader, while everything else
//! passes through untouched. Directory listings are synthesized so virtual
//! targets appear as regular entries.
//!
//! ```no_run
//! use std::io;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rulefs::{FsStack, MemoryFs, Recipe, TaskIo};
//!
//! struct Concat;
//!
//! #[async_trait]
//! impl Recipe for Concat {
//!     async fn cook(&self, task: &mut TaskIo) -> io::Result<()> {
//!         let target = task.target();
//!         for source in task.sources() {
//!             let mut data = Vec::new();
//!             source.read_to_end(&mut data).await?;
//!             target.write_all(&data).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> io::Result<()> {
//! let base = MemoryFs::new();
//! base.write_file("/index.less", "body { color: red }\n").await?;
//!
//! let mut stack = FsStack::new(Arc::new(base));
//! stack.make("%.css", &["%.less"], Arc::new(Concat)).map_err(io::Error::other)?;
//!
//! use rulefs::Filesystem;
//! let mut file = stack.open("/index.css").await?;
//! let mut out = Vec::new();
//! file.read_to_end(&mut out).await?;
//! # Ok(())
//! # }
//! ```
//!
//! This crate provides:
//!
//! - **vfs**: the narrow `Filesystem`/`File` traits plus in-memory,
//!   real-directory, subtree and include-filter filesystems
//! - **pattern / glob**: `%`-stem matching and `*` expansion
//! - **broadcast**: the single-writer many-reader stream behind each target
//! - **rule / task / recipe**: resolution and at-most-once recipe execution
//! - **overlay / stack**: the rule overlay filesystem and its composition

pub mod broadcast;
pub mod error;
pub mod glob;
pub mod overlay;
pub mod paths;
pub mod pattern;
pub mod recipe;
pub mod rule;
pub mod source;
pub mod stack;
pub mod target;
pub mod task;
pub mod vfs;

pub use error::RuleError;
pub use overlay::RuleFs;
pub use recipe::{ExecRecipe, Recipe, TaskIo};
pub use rule::Rule;
pub use source::Source;
pub use stack::FsStack;
pub use vfs::{DirFs, File, FileInfo, Filesystem, IncludeFs, MemoryFs, SeekFrom, SubFs};
