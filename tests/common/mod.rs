//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rezip::{Entry, EntryStatus, OptionSet, Source, ZipArchive};
use tempfile::TempDir;

/// Writes `content` to `dir/rel`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Creates a small tree under `dir/data`:
///
/// ```text
/// data/a.txt
/// data/sub/b.txt
/// data/sub/deeper/c.bin
/// ```
pub fn sample_tree(dir: &Path) -> PathBuf {
    let root = dir.join("data");
    write_file(&root, "a.txt", b"alpha");
    write_file(&root, "sub/b.txt", &b"bravo ".repeat(500));
    write_file(&root, "sub/deeper/c.bin", &(0..=255u8).cycle().take(4096).collect::<Vec<_>>());
    root
}

/// Archive handle at `dir/name`.
pub fn archive_at(dir: &TempDir, name: &str) -> ZipArchive {
    ZipArchive::new(dir.path().join(name))
}

/// Creates `dir/name` from in-memory `(name, content)` pairs.
pub fn create_virtual(dir: &TempDir, name: &str, entries: &[(&str, &[u8])]) -> ZipArchive {
    let archive = archive_at(dir, name);
    let sources: Vec<Source> = entries
        .iter()
        .map(|(name, content)| Source::virtual_file(*name, content.to_vec()))
        .collect();
    archive.create(&sources, &OptionSet::new()).unwrap();
    archive
}

/// Stored names of entries, in order.
pub fn names(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|e| e.stored_filename.clone()).collect()
}

/// Stored names of entries that finished with `EntryStatus::Ok`.
pub fn ok_names(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Ok)
        .map(|e| e.stored_filename.clone())
        .collect()
}

/// Finds an entry by stored name.
pub fn find<'a>(entries: &'a [Entry], name: &str) -> &'a Entry {
    entries
        .iter()
        .find(|e| e.stored_filename == name)
        .unwrap_or_else(|| panic!("no entry named {name}"))
}
