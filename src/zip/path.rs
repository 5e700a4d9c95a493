//! Archive path normalization and rewrite rules.
//!
//! Every name is reduced before it is stored in an archive or used to build
//! an extraction destination: `.` segments and repeated slashes disappear,
//! `..` cancels the segment before it, and any `..` left over is kept at the
//! front so a path that escapes its base still says so.

/// Reduce `.`, `..` and empty segments of a `/`-separated path.
///
/// A trailing slash is dropped; a leading slash is kept, and `..` cannot
/// climb above it.
///
/// ```
/// use rezip::zip::reduce;
///
/// assert_eq!(reduce("a/b/../c"), "a/c");
/// assert_eq!(reduce("../a"), "../a");
/// assert_eq!(reduce("./a/./b"), "a/b");
/// ```
pub fn reduce(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut kept = Vec::new();
    let mut skip = 0usize;

    for segment in path.split('/').rev() {
        match segment {
            "" | "." => {}
            ".." => skip += 1,
            _ if skip > 0 => skip -= 1,
            _ => kept.push(segment),
        }
    }
    kept.reverse();

    if absolute {
        return format!("/{}", kept.join("/"));
    }

    let mut parts = Vec::with_capacity(skip + kept.len());
    parts.extend(std::iter::repeat_n("..", skip));
    parts.extend(kept);
    parts.join("/")
}

/// True when a reduced relative path would land outside its base directory.
pub fn escapes_base(path: &str) -> bool {
    path.starts_with('/')
        || path == ".."
        || path.starts_with("../")
        || path.as_bytes().get(1) == Some(&b':')
}

/// Remove `prefix` from the front of `path` when `path` lies under it.
fn strip_dir_prefix(path: &str, prefix: &str) -> String {
    let prefix = reduce(prefix);
    if prefix.is_empty() {
        return path.to_string();
    }
    if path == prefix {
        return String::new();
    }
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => path.to_string(),
    }
}

/// Rules that rewrite a name between the filesystem and the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRules {
    /// Prefix prepended to every name.
    pub add_path: Option<String>,
    /// Leading directory removed from names that lie under it.
    pub remove_path: Option<String>,
    /// Keep only the last path segment.
    pub remove_all_path: bool,
}

impl PathRules {
    /// Rewrite a name: `remove_all_path` wins over `remove_path`, then
    /// `add_path` is prepended. Returns an empty string when nothing is left.
    pub fn apply(&self, name: &str) -> String {
        let mut result = reduce(name);

        if self.remove_all_path {
            result = result.rsplit('/').next().unwrap_or_default().to_string();
        } else if let Some(prefix) = self.remove_path.as_deref() {
            result = strip_dir_prefix(&result, prefix);
        }

        if result.is_empty() {
            return result;
        }
        match self.add_path.as_deref().map(reduce) {
            Some(prefix) if !prefix.is_empty() => reduce(&format!("{prefix}/{result}")),
            _ => result,
        }
    }

    /// The name recorded inside an archive for `filename`.
    ///
    /// Stored names never start with `/`; folders end with one.
    pub fn stored_name(&self, filename: &str, is_dir: bool) -> String {
        let mut name = self.apply(filename).trim_start_matches('/').to_string();
        if is_dir && !name.is_empty() {
            name.push('/');
        }
        name
    }
}
