//! Rules: target pattern + source patterns + recipe.
//!
//! A rule resolves in both directions. Forward: given a requested target
//! path, find the concrete source files the recipe needs. Reverse: given a
//! concrete file, find the target path it would produce. The reverse
//! direction powers directory-listing synthesis.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use crate::error::RuleError;
use crate::glob;
use crate::paths;
use crate::pattern::{find_stem, insert_stem, is_pattern};
use crate::recipe::Recipe;
use crate::source::Source;
use crate::vfs::Filesystem;

/// An immutable build rule.
///
/// The target is either absolute or a `%`-pattern (never a glob); sources
/// may be absolute, patterns, or globs. Structural problems are rejected at
/// construction.
pub struct Rule {
    target: String,
    sources: Vec<String>,
    recipe: Arc<dyn Recipe>,
}

impl Rule {
    /// Build and validate a rule.
    pub fn new(
        target: impl Into<String>,
        sources: Vec<String>,
        recipe: Arc<dyn Recipe>,
    ) -> Result<Self, RuleError> {
        let target = target.into();
        if target.is_empty() {
            return Err(RuleError::EmptyTarget);
        }
        if glob::is_glob(&target) {
            return Err(RuleError::GlobTarget(target));
        }
        if sources.is_empty() {
            return Err(RuleError::NoSources);
        }
        Ok(Self {
            target,
            sources,
            recipe,
        })
    }

    /// The rule's target pattern or absolute target path.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub(crate) fn recipe(&self) -> Arc<dyn Recipe> {
        self.recipe.clone()
    }

    /// Resolve the sources needed to build `target_path`.
    ///
    /// Returns `None` when the rule does not apply: the target does not
    /// match, or any source pattern expands to nothing. A `Some` result
    /// holds at least one source, each pattern's matches in lexicographic
    /// order, patterns in rule order.
    pub(crate) async fn find_sources(
        &self,
        target_path: &str,
        fs: &Arc<dyn Filesystem>,
    ) -> io::Result<Option<Vec<Source>>> {
        let (stem, dir) = if is_pattern(&self.target) {
            match find_stem(target_path, &self.target) {
                Some(found) => found,
                None => return Ok(None),
            }
        } else if target_path == self.target {
            (String::new(), String::new())
        } else {
            return Ok(None);
        };

        let mut sources = Vec::new();
        for source_pattern in &self.sources {
            let source_path = paths::join(&dir, &insert_stem(source_pattern, &stem));
            let matches = glob::glob(&source_path, fs.as_ref()).await?;
            if matches.is_empty() {
                return Ok(None);
            }
            for (path, info) in matches {
                sources.push(Source::new(path, fs.clone(), info));
            }
        }

        if sources.is_empty() {
            return Ok(None);
        }
        Ok(Some(sources))
    }

    /// Resolve the target path that `source_path` would produce, or `None`
    /// if this rule does not consume it. The result is only returned when
    /// all of the rule's sources for that target currently exist.
    pub(crate) async fn find_target_path(
        &self,
        source_path: &str,
        fs: &Arc<dyn Filesystem>,
    ) -> io::Result<Option<String>> {
        let target_path = if is_pattern(&self.target) {
            let mut found = None;
            for source in &self.sources {
                if is_pattern(source) {
                    if let Some((stem, dir)) = find_stem(source_path, source) {
                        found = Some((stem, dir));
                        break;
                    }
                }
            }
            let Some((stem, dir)) = found else {
                return Ok(None);
            };
            paths::join(&dir, &insert_stem(&self.target, &stem))
        } else {
            let consumed = self.sources.iter().any(|source| {
                if is_pattern(source) {
                    find_stem(source_path, source).is_some()
                } else if glob::is_glob(source) {
                    glob::match_path(source, source_path)
                } else {
                    source == source_path
                }
            });
            if !consumed {
                return Ok(None);
            }
            self.target.clone()
        };

        match self.find_sources(&target_path, fs).await? {
            Some(_) => Ok(Some(target_path)),
            None => Ok(None),
        }
    }

    /// Discover every target path this rule can currently produce, by
    /// walking the filesystem breadth-first and reverse-matching each leaf.
    pub(crate) async fn find_target_paths(
        &self,
        fs: &Arc<dyn Filesystem>,
    ) -> io::Result<Vec<String>> {
        let mut dirs = std::collections::VecDeque::from(["/".to_string()]);
        let mut results = BTreeSet::new();

        while let Some(dir) = dirs.pop_front() {
            let mut file = fs.open(&dir).await?;
            let entries = file.readdir(0).await?;
            let _ = file.close().await;

            for info in entries {
                let path = paths::join(&dir, &info.name);
                if info.is_dir {
                    dirs.push_back(path);
                } else if let Some(target) = self.find_target_path(&path, fs).await? {
                    results.insert(target);
                }
            }
        }

        Ok(results.into_iter().collect())
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("target", &self.target)
            .field("sources", &self.sources)
            .finish()
    }
}
