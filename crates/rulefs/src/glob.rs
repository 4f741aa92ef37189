//! Glob expansion over a virtual filesystem.
//!
//! A glob contains one or more `*` wildcards. Within one `/`-separated
//! segment a `*` matches any non-empty run of characters; a `**` matches
//! any run including separators, which turns expansion into a whole-tree
//! walk. Expansion yields the set of concrete paths with their metadata.
//!
//! There is no escape mechanism: `\*` is not a wildcard, but it is matched
//! as the literal two characters `\*`.

use std::collections::BTreeMap;
use std::io;

use regex::Regex;

use crate::paths;
use crate::vfs::{File, FileInfo, Filesystem};

/// Returns true if `s` is a glob (contains a `*` wildcard).
pub fn is_glob(s: &str) -> bool {
    s.contains('*')
}

/// Expand `pattern` against `fs`, returning matching paths and their
/// metadata, keyed (and therefore ordered) by path.
///
/// `pattern` must be absolute. Segments without wildcards are compared as
/// plain strings; intermediate matches must be directories, terminal
/// matches may be either.
pub async fn glob(
    pattern: &str,
    fs: &dyn Filesystem,
) -> io::Result<BTreeMap<String, FileInfo>> {
    if pattern.contains("**") {
        return glob_tree(pattern, fs).await;
    }

    let segments: Vec<Segment> = pattern
        .trim_start_matches('/')
        .split('/')
        .map(Segment::compile)
        .collect();

    let mut results = BTreeMap::new();
    let mut bases = vec!["/".to_string()];

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let mut next_bases = Vec::new();

        for base in &bases {
            let entries = match read_dir(fs, base).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };

            for info in entries {
                if !segment.matches(&info.name) {
                    continue;
                }
                let path = paths::join(base, &info.name);
                if last {
                    results.insert(path, info);
                } else if info.is_dir {
                    next_bases.push(path);
                }
            }
        }

        bases = next_bases;
    }

    Ok(results)
}

/// Match a concrete path against a glob without touching a filesystem.
pub fn match_path(pattern: &str, path: &str) -> bool {
    full_path_regex(pattern).is_match(path)
}

/// Whole-tree expansion for patterns containing `**`: walk every directory
/// under the root and match full paths against one compiled regex.
async fn glob_tree(
    pattern: &str,
    fs: &dyn Filesystem,
) -> io::Result<BTreeMap<String, FileInfo>> {
    let matcher = full_path_regex(pattern);
    let mut results = BTreeMap::new();
    let mut dirs = vec!["/".to_string()];

    while let Some(dir) = dirs.pop() {
        let entries = match read_dir(fs, &dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };

        for info in entries {
            let path = paths::join(&dir, &info.name);
            if info.is_dir {
                dirs.push(path.clone());
            }
            if matcher.is_match(&path) {
                results.insert(path, info);
            }
        }
    }

    Ok(results)
}

async fn read_dir(fs: &dyn Filesystem, path: &str) -> io::Result<Vec<FileInfo>> {
    let mut dir = fs.open(path).await?;
    let entries = dir.readdir(0).await;
    let _ = dir.close().await;
    entries
}

/// One `/`-separated element of a glob pattern.
enum Segment {
    Static(String),
    Wild(Regex),
}

impl Segment {
    /// Compile a segment. Each unescaped `*` becomes `.+`; everything else
    /// is literal. A `*` preceded by `\` is not a wildcard (and the `\`
    /// stays literal).
    fn compile(part: &str) -> Self {
        let stars = star_offsets(part);
        if stars.is_empty() {
            return Segment::Static(part.to_string());
        }

        let mut pattern = String::from("^");
        let mut start = 0;
        for (i, &offset) in stars.iter().enumerate() {
            pattern.push_str(&regex::escape(&part[start..offset]));
            pattern.push_str(".+");
            start = offset + 1;
            if i + 1 == stars.len() {
                pattern.push_str(&regex::escape(&part[start..]));
                pattern.push('$');
            }
        }

        // Everything but the inserted `.+` runs is escaped, so the pattern
        // is always a valid regex.
        Segment::Wild(Regex::new(&pattern).expect("segment compiles to valid regex"))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Static(s) => s == name,
            Segment::Wild(re) => re.is_match(name),
        }
    }
}

/// Offsets of unescaped `*` bytes in `part`.
fn star_offsets(part: &str) -> Vec<usize> {
    let mut stars = Vec::new();
    let mut prev = 0u8;
    for (i, &b) in part.as_bytes().iter().enumerate() {
        if b == b'*' && prev != b'\\' {
            stars.push(i);
        }
        prev = b;
    }
    stars
}

/// Compile a whole pattern into a single regex over full paths:
/// `**` becomes `.+`, a single `*` becomes `[^/]+`, everything else is
/// literal.
fn full_path_regex(pattern: &str) -> Regex {
    let bytes = pattern.as_bytes();
    let mut out = String::from("^");
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            out.push_str(&regex::escape("\\*"));
            i += 2;
        } else if bytes[i] == b'*' {
            let mut run = 1;
            while i + run < bytes.len() && bytes[i + run] == b'*' {
                run += 1;
            }
            out.push_str(if run >= 2 { ".+" } else { "[^/]+" });
            i += run;
        } else {
            let ch = pattern[i..].chars().next().unwrap_or('\0');
            out.push_str(&regex::escape(&ch.to_string()));
            i += ch.len_utf8();
        }
    }
    out.push('$');
    Regex::new(&out).expect("glob compiles to valid regex")
}
