//! The overlay stack: ordered composition of rule overlays over a base.
//!
//! Registering a rule stores the current top of the stack as the new
//! overlay's parent and replaces the top. A consumer opens paths on the
//! stack itself; each overlay either handles the path or delegates down.

use async_trait::async_trait;
use std::io;
use std::sync::Arc;

use crate::error::RuleError;
use crate::overlay::RuleFs;
use crate::recipe::{ExecRecipe, Recipe};
use crate::rule::Rule;
use crate::vfs::{File, Filesystem, IncludeFs, SubFs};

/// An overlay stack rooted at a base filesystem.
pub struct FsStack {
    head: Arc<dyn Filesystem>,
}

impl FsStack {
    /// Create a stack with `base` as the outermost parent.
    pub fn new(base: Arc<dyn Filesystem>) -> Self {
        Self { head: base }
    }

    /// Register a rule: `target` is produced from `sources` by `recipe`.
    ///
    /// Each registration pushes a new overlay; later rules see earlier
    /// rules' targets through their parent.
    pub fn make(
        &mut self,
        target: &str,
        sources: &[&str],
        recipe: Arc<dyn Recipe>,
    ) -> Result<(), RuleError> {
        let rule = Rule::new(
            target,
            sources.iter().map(|s| s.to_string()).collect(),
            recipe,
        )?;
        self.push_rule(rule);
        Ok(())
    }

    /// Register a rule whose recipe runs an external command with the first
    /// source on stdin and stdout/stderr as the target.
    pub fn make_exec(
        &mut self,
        target: &str,
        source: &str,
        command: &str,
        args: &[&str],
    ) -> Result<(), RuleError> {
        let mut recipe = ExecRecipe::new(command);
        for arg in args {
            recipe = recipe.arg(*arg);
        }
        self.make(target, &[source], Arc::new(recipe))
    }

    /// Push an already-built rule overlay.
    pub fn push_rule(&mut self, rule: Rule) {
        self.head = Arc::new(RuleFs::new(self.head.clone(), rule));
    }

    /// View the current stack rooted at `root`.
    pub fn subtree(&self, root: &str) -> SubFs {
        SubFs::new(self.head.clone(), root)
    }

    /// View the current stack restricted to the given prefixes.
    pub fn include(&self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> IncludeFs {
        IncludeFs::new(self.head.clone(), prefixes)
    }

    /// The current top of the stack.
    pub fn head(&self) -> Arc<dyn Filesystem> {
        self.head.clone()
    }
}

#[async_trait]
impl Filesystem for FsStack {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        self.head.open(path).await
    }
}
