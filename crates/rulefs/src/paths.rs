//! Helpers for absolute, slash-separated virtual paths.
//!
//! Every filesystem in the stack speaks these paths, on every platform. They
//! are cleaned internally: no `.` or `..` segments, no repeated or trailing
//! separators.

/// Clean a path by resolving `.` and `..` segments and collapsing repeated
/// separators. Rooted paths stay rooted; `..` cannot escape the root. An
/// empty path cleans to `.`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');

    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                match out.last() {
                    Some(&"..") | None => {
                        if !rooted {
                            out.push("..");
                        }
                    }
                    Some(_) => {
                        out.pop();
                    }
                }
            }
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Join two path fragments and clean the result. Empty fragments are
/// ignored; joining two empty fragments yields the empty string.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() && name.is_empty() {
        return String::new();
    }
    if dir.is_empty() {
        return clean(name);
    }
    if name.is_empty() {
        return clean(dir);
    }
    clean(&format!("{}/{}", dir, name))
}

/// Return everything but the last path segment, cleaned. Paths without a
/// separator yield `.`; the root yields `/`.
pub fn dir(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        None => ".".to_string(),
        Some(0) => "/".to_string(),
        Some(i) => cleaned[..i].to_string(),
    }
}

/// Return the last path segment, cleaned. An empty path yields `.`; the
/// root yields `/`.
pub fn base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let cleaned = clean(path);
    if cleaned == "/" {
        return "/".to_string();
    }
    match cleaned.rfind('/') {
        None => cleaned,
        Some(i) => cleaned[i + 1..].to_string(),
    }
}

/// Returns true if `ancestor` is a proper ancestor directory of `path`.
/// Both arguments must already be cleaned absolute paths.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == path {
        return false;
    }
    if ancestor == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/')
}

/// Returns the first path segment of `path` below `ancestor`.
///
/// Only meaningful when `is_ancestor(ancestor, path)` holds.
pub fn first_segment_below(ancestor: &str, path: &str) -> String {
    let rest = path[ancestor.len()..].trim_start_matches('/');
    match rest.find('/') {
        None => rest.to_string(),
        Some(i) => rest[..i].to_string(),
    }
}
