//! Per-call configuration for archive operations.
//!
//! An [`OptionSet`] is built with chained setters and validated once at the
//! start of each operation, before any file is touched.

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::error::{ArchiveError, Result};

use super::entry::Entry;
use super::path::PathRules;

/// Default size above which payloads are spooled instead of held in memory.
pub const DEFAULT_TEMP_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Inclusive range of central directory indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(index: usize) -> Self {
        Self::new(index, index)
    }

    /// From `start` to the last entry.
    pub fn open(start: usize) -> Self {
        Self::new(start, usize::MAX)
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// Parse a comma-separated list such as `0-2,5,7-`.
    pub fn parse_list(text: &str) -> Result<Vec<IndexRange>> {
        let mut ranges = text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<IndexRange>>>()?;
        if ranges.is_empty() {
            return Err(ArchiveError::option(format!("empty index list '{text}'")));
        }
        ranges.sort_by_key(|r| r.start);
        Ok(ranges)
    }
}

impl FromStr for IndexRange {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        let number = |n: &str| {
            n.trim()
                .parse::<usize>()
                .map_err(|_| ArchiveError::option(format!("invalid index range '{s}'")))
        };
        let range = match s.split_once('-') {
            None => IndexRange::single(number(s)?),
            Some((start, "")) => IndexRange::open(number(start)?),
            Some((start, end)) => IndexRange::new(number(start)?, number(end)?),
        };
        if range.start > range.end {
            return Err(ArchiveError::option(format!("index range '{s}' is reversed")));
        }
        Ok(range)
    }
}

/// Which entries an extract or delete applies to.
#[derive(Debug, Clone, Default)]
pub enum SelectionFilter {
    #[default]
    All,
    /// Exact stored names; a name ending in `/` selects a whole directory.
    Names(Vec<String>),
    /// Stored names matching a regular expression.
    Regex(Regex),
    /// Central directory indices.
    Indices(Vec<IndexRange>),
}

impl SelectionFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, SelectionFilter::All)
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            SelectionFilter::All => true,
            SelectionFilter::Names(names) => names
                .iter()
                .any(|name| name_matches(name, &entry.stored_filename)),
            SelectionFilter::Regex(re) => re.is_match(&entry.stored_filename),
            SelectionFilter::Indices(ranges) => ranges.iter().any(|r| r.contains(entry.index)),
        }
    }
}

fn name_matches(name: &str, stored: &str) -> bool {
    if name == stored {
        return true;
    }
    if name.ends_with('/') {
        return stored.starts_with(name);
    }
    stored.strip_suffix('/') == Some(name)
}

/// What to do with an entry, as decided by a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Skip,
    Abort,
}

/// Lifecycle hook invoked around each entry.
///
/// Pre-callbacks may rename the entry by changing `filename` (extract) or
/// `stored_filename` (add).
pub type Callback = Box<dyn Fn(&mut Entry) -> CallbackAction>;

/// Policy for destination files that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    /// Replace unless the existing file is newer than the entry.
    #[default]
    IfNotNewer,
    /// Always replace.
    Always,
    /// Never replace; the entry is skipped.
    Never,
}

/// When payloads go through a temporary spool file while being added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempFileMode {
    /// Spool payloads larger than this many bytes.
    Threshold(u64),
    Always,
    Never,
}

/// How the archive comment changes on create or add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentRule {
    Set(String),
    Append(String),
    Prepend(String),
}

impl CommentRule {
    pub(crate) fn apply(&self, existing: &[u8]) -> Vec<u8> {
        match self {
            CommentRule::Set(text) => text.as_bytes().to_vec(),
            CommentRule::Append(text) => [existing, text.as_bytes()].concat(),
            CommentRule::Prepend(text) => [text.as_bytes(), existing].concat(),
        }
    }
}

/// Configuration consumed by one archive operation.
#[derive(Default)]
pub struct OptionSet {
    pub selection: SelectionFilter,
    pub paths: PathRules,
    pub temp_file: Option<TempFileMode>,
    pub store_only: bool,
    pub overwrite: Overwrite,
    pub allow_escape: bool,
    pub strict: bool,
    pub comment: Option<CommentRule>,
    pub pre: Option<Callback>,
    pub post: Option<Callback>,
    conflicts: Vec<&'static str>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(mut self, filter: SelectionFilter) -> Self {
        if !self.selection.is_all() {
            self.conflicts.push("only one selection filter may be given");
        }
        self.selection = filter;
        self
    }

    /// Select entries by stored name.
    pub fn by_name<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select(SelectionFilter::Names(names.into_iter().map(Into::into).collect()))
    }

    /// Select entries whose stored name matches `regex`.
    pub fn by_regex(self, regex: Regex) -> Self {
        self.select(SelectionFilter::Regex(regex))
    }

    /// Select entries by index.
    pub fn by_index(self, ranges: impl Into<Vec<IndexRange>>) -> Self {
        self.select(SelectionFilter::Indices(ranges.into()))
    }

    pub fn add_path(mut self, path: impl Into<String>) -> Self {
        self.paths.add_path = Some(path.into());
        self
    }

    pub fn remove_path(mut self, path: impl Into<String>) -> Self {
        self.paths.remove_path = Some(path.into());
        self
    }

    pub fn remove_all_path(mut self, enabled: bool) -> Self {
        self.paths.remove_all_path = enabled;
        self
    }

    pub fn temp_file(mut self, mode: TempFileMode) -> Self {
        self.temp_file = Some(mode);
        self
    }

    /// Store payloads without compression.
    pub fn store_only(mut self, enabled: bool) -> Self {
        self.store_only = enabled;
        self
    }

    pub fn overwrite(mut self, policy: Overwrite) -> Self {
        self.overwrite = policy;
        self
    }

    /// Allow extraction to write outside the destination directory.
    pub fn allow_escape(mut self, enabled: bool) -> Self {
        self.allow_escape = enabled;
        self
    }

    /// Turn the first failing entry into an error for the whole call.
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    pub fn comment(mut self, rule: CommentRule) -> Self {
        self.comment = Some(rule);
        self
    }

    pub fn pre_callback(mut self, callback: impl Fn(&mut Entry) -> CallbackAction + 'static) -> Self {
        self.pre = Some(Box::new(callback));
        self
    }

    pub fn post_callback(mut self, callback: impl Fn(&mut Entry) -> CallbackAction + 'static) -> Self {
        self.post = Some(Box::new(callback));
        self
    }

    /// Check the set for conflicts. Called once per operation before any I/O.
    pub fn validate(&self) -> Result<()> {
        if let Some(conflict) = self.conflicts.first() {
            return Err(ArchiveError::option(*conflict));
        }
        if self.store_only && self.temp_file.is_some() {
            return Err(ArchiveError::option(
                "store_only cannot be combined with a temp-file mode",
            ));
        }
        if let SelectionFilter::Indices(ranges) = &self.selection {
            if ranges.is_empty() {
                return Err(ArchiveError::option("empty index selection"));
            }
            if let Some(r) = ranges.iter().find(|r| r.start > r.end) {
                return Err(ArchiveError::option(format!(
                    "index range {}-{} is reversed",
                    r.start, r.end
                )));
            }
        }
        if let SelectionFilter::Names(names) = &self.selection {
            if names.is_empty() {
                return Err(ArchiveError::option("empty name selection"));
            }
        }
        Ok(())
    }

    /// Whether a payload of `size` bytes should be spooled to a temp file.
    pub fn spools(&self, size: u64) -> bool {
        match self.temp_file.unwrap_or(TempFileMode::Threshold(DEFAULT_TEMP_FILE_THRESHOLD)) {
            TempFileMode::Threshold(limit) => size > limit,
            TempFileMode::Always => true,
            TempFileMode::Never => false,
        }
    }

    pub(crate) fn run_pre(&self, entry: &mut Entry) -> CallbackAction {
        self.pre.as_ref().map_or(CallbackAction::Continue, |cb| cb(entry))
    }

    pub(crate) fn run_post(&self, entry: &mut Entry) -> CallbackAction {
        self.post.as_ref().map_or(CallbackAction::Continue, |cb| cb(entry))
    }
}

impl fmt::Debug for OptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSet")
            .field("selection", &self.selection)
            .field("paths", &self.paths)
            .field("temp_file", &self.temp_file)
            .field("store_only", &self.store_only)
            .field("overwrite", &self.overwrite)
            .field("allow_escape", &self.allow_escape)
            .field("strict", &self.strict)
            .field("comment", &self.comment)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{CompressionMethod, EntryKind, EntryStatus};
    use std::time::SystemTime;

    fn entry(index: usize, name: &str) -> Entry {
        Entry {
            index,
            filename: name.to_string(),
            stored_filename: name.to_string(),
            kind: EntryKind::File,
            compression_method: CompressionMethod::Stored,
            crc32: 0,
            uncompressed_size: 0,
            compressed_size: 0,
            modified: SystemTime::now(),
            flags: 0,
            external_attributes: 0,
            local_header_offset: 0,
            comment: String::new(),
            status: EntryStatus::Ok,
        }
    }

    #[test]
    fn test_parse_index_list() {
        let ranges = IndexRange::parse_list("7-, 0-2,5").unwrap();
        assert_eq!(
            ranges,
            vec![IndexRange::new(0, 2), IndexRange::single(5), IndexRange::open(7)]
        );
        assert!(ranges[2].contains(1_000));
    }

    #[test]
    fn test_parse_index_list_errors() {
        assert!(IndexRange::parse_list("3-1").is_err());
        assert!(IndexRange::parse_list("a-b").is_err());
        assert!(IndexRange::parse_list(" , ").is_err());
    }

    #[test]
    fn test_name_matching() {
        let filter = SelectionFilter::Names(vec!["docs/".into(), "bin".into(), "a.txt".into()]);
        assert!(filter.matches(&entry(0, "a.txt")));
        assert!(filter.matches(&entry(1, "docs/readme.md")));
        assert!(filter.matches(&entry(2, "bin/")));
        assert!(!filter.matches(&entry(3, "bin/tool")));
        assert!(!filter.matches(&entry(4, "b/a.txt")));
    }

    #[test]
    fn test_regex_and_index_matching() {
        let filter = SelectionFilter::Regex(Regex::new(r"\.rs$").unwrap());
        assert!(filter.matches(&entry(0, "src/lib.rs")));
        assert!(!filter.matches(&entry(0, "Cargo.toml")));

        let filter = SelectionFilter::Indices(vec![IndexRange::new(1, 2)]);
        assert!(!filter.matches(&entry(0, "x")));
        assert!(filter.matches(&entry(2, "x")));
    }

    #[test]
    fn test_two_selections_conflict() {
        let options = OptionSet::new()
            .by_name(["a"])
            .by_regex(Regex::new("b").unwrap());
        assert!(matches!(options.validate(), Err(ArchiveError::InvalidOption(_))));
    }

    #[test]
    fn test_store_only_with_temp_file_conflicts() {
        let options = OptionSet::new()
            .store_only(true)
            .temp_file(TempFileMode::Always);
        assert!(matches!(options.validate(), Err(ArchiveError::InvalidOption(_))));

        assert!(OptionSet::new().store_only(true).validate().is_ok());
    }

    #[test]
    fn test_spool_threshold() {
        let options = OptionSet::new().temp_file(TempFileMode::Threshold(10));
        assert!(!options.spools(10));
        assert!(options.spools(11));
        assert!(OptionSet::new().temp_file(TempFileMode::Always).spools(0));
        assert!(!OptionSet::new().spools(1024));
    }

    #[test]
    fn test_comment_rules() {
        assert_eq!(CommentRule::Append(" b".into()).apply(b"a"), b"a b");
        assert_eq!(CommentRule::Prepend("b ".into()).apply(b"a"), b"b a");
        assert_eq!(CommentRule::Set("c".into()).apply(b"a"), b"c");
    }
}
