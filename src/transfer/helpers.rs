/// Normalize a path-like string for remote use:
/// - converts backslashes to forward slashes
/// - collapses repeated slashes
/// - optionally preserves a trailing slash (directory spelling)
pub fn normalize_path(p: &str, preserve_trailing_slash: bool) -> String {
    if p.is_empty() {
        return String::new();
    }
    let mut s = p.replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    if !preserve_trailing_slash {
        // keep root "/"
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
    }
    s
}

/// Fold `.` and `..` segments of an absolute path lexically. `None` when a
/// `..` would climb above `/`. A trailing `/` is kept.
pub fn fold_dot_segments(p: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for seg in p.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    let mut out = format!("/{}", parts.join("/"));
    let trailing = p.ends_with('/') || p.ends_with("/.") || p.ends_with("/..");
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    Some(out)
}

/// Argument normalization for queued operations: trim, remote separators,
/// collapse repeated separators and drop the leading one, so `"/a//b"` and
/// `"a/b"` name the same job.
pub fn normalize_remote_arg(p: &str) -> String {
    let s = normalize_path(p.trim(), false);
    match s.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => s,
    }
}

/// Identity spelling for local paths: trimmed, forward slashes, no repeated
/// or trailing separators.
pub fn normalize_local_key(p: &str) -> String {
    normalize_path(p.trim(), false)
}

/// Ensure a directory spelling ends with exactly one `/`.
pub fn with_trailing_slash(p: &str) -> String {
    let mut s = normalize_path(p, false);
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

/// Parent directory of a remote path, `None` for root or bare names.
pub fn remote_parent(p: &str) -> Option<&str> {
    let trimmed = p.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 { Some("/") } else { Some(&trimmed[..idx]) }
}
