//! `%`-pattern matching and stem substitution.
//!
//! A pattern contains exactly one `%`, which captures the *stem* of a
//! matching path. Patterns anchor at the base-name level: a pattern with a
//! directory part only matches paths whose directory ends with it, and the
//! `%` only ever captures within the base name.

use regex::Regex;

use crate::paths;

/// Returns true if `s` is a pattern (contains a `%` marker).
pub fn is_pattern(s: &str) -> bool {
    s.contains('%')
}

/// Match `path` against `pattern` and extract the stem.
///
/// On success returns `(stem, dir)` where `dir` is the path's directory;
/// substituting the stem back into the pattern and joining with `dir`
/// reconstructs `path`. An empty stem never matches.
pub fn find_stem(path: &str, pattern: &str) -> Option<(String, String)> {
    let pattern_dir = paths::dir(pattern);
    let pattern_base = paths::base(pattern);
    let path_dir = paths::dir(path);
    let path_base = paths::base(path);

    if pattern_dir != "." {
        let anchored = if pattern_dir.starts_with('/') {
            path_dir == pattern_dir
        } else {
            path_dir == pattern_dir || path_dir.ends_with(&format!("/{}", pattern_dir))
        };
        if !anchored {
            return None;
        }
    }

    let percent = pattern_base.find('%')?;
    let prefix = regex::escape(&pattern_base[..percent]);
    let suffix = regex::escape(&pattern_base[percent + 1..]);
    let matcher = Regex::new(&format!("^{}(.+){}$", prefix, suffix)).ok()?;

    let captures = matcher.captures(&path_base)?;
    Some((captures[1].to_string(), path_dir))
}

/// Replace every `%` in `pattern` with `stem`.
pub fn insert_stem(pattern: &str, stem: &str) -> String {
    pattern.replace('%', stem)
}
