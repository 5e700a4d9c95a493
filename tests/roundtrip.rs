//! Create, list and extract roundtrip tests.

mod common;

use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::*;
use rezip::zip::CompressionMethod;
use rezip::{
    ArchiveError, ArchiveStatus, CommentRule, EntryKind, EntryStatus, OptionSet, Source,
    TempFileMode,
};
use tempfile::TempDir;

// =============================================================================
// Concrete scenario
// =============================================================================

#[test]
fn test_store_then_deflate_listing() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "out.zip");

    archive
        .create(
            &[Source::virtual_file("a.txt", "hi")],
            &OptionSet::new().store_only(true),
        )
        .unwrap();
    archive
        .add(&[Source::virtual_file("b/c.txt", "world")], &OptionSet::new())
        .unwrap();

    let entries = archive.list().unwrap();
    assert_eq!(names(&entries), ["a.txt", "b/c.txt"]);

    assert_eq!(entries[0].uncompressed_size, 2);
    assert_eq!(entries[0].crc32, crc32fast::hash(b"hi"));
    assert_eq!(entries[0].compression_method, CompressionMethod::Stored);

    assert_eq!(entries[1].uncompressed_size, 5);
    assert_eq!(entries[1].crc32, crc32fast::hash(b"world"));
    assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
}

// =============================================================================
// Filesystem roundtrip
// =============================================================================

#[test]
fn test_directory_roundtrip() {
    let dir = TempDir::new().unwrap();
    let root = sample_tree(dir.path());
    let archive = archive_at(&dir, "tree.zip");

    let added = archive
        .create(
            &[Source::path(&root)],
            &OptionSet::new().remove_path(dir.path().to_string_lossy()),
        )
        .unwrap();
    assert!(added.iter().all(|e| e.status == EntryStatus::Ok));

    let entries = archive.list().unwrap();
    assert_eq!(
        names(&entries),
        [
            "data/",
            "data/a.txt",
            "data/sub/",
            "data/sub/b.txt",
            "data/sub/deeper/",
            "data/sub/deeper/c.bin",
        ]
    );
    assert!(find(&entries, "data/sub/").is_folder());

    let out = dir.path().join("out");
    let extracted = archive.extract(&out, &OptionSet::new()).unwrap();
    assert_eq!(ok_names(&extracted).len(), entries.len());

    for rel in ["a.txt", "sub/b.txt", "sub/deeper/c.bin"] {
        let original = fs::read(root.join(rel)).unwrap();
        let restored = fs::read(out.join("data").join(rel)).unwrap();
        assert_eq!(original, restored, "{rel}");
        let entry = find(&entries, &format!("data/{rel}"));
        assert_eq!(entry.crc32, crc32fast::hash(&original));
    }
    assert!(out.join("data/sub/deeper").is_dir());
}

#[test]
fn test_single_files_keep_relative_names() {
    let dir = TempDir::new().unwrap();
    let root = sample_tree(dir.path());
    let archive = archive_at(&dir, "files.zip");

    archive
        .create(
            &[Source::path(root.join("a.txt")), Source::path(root.join("sub/b.txt"))],
            &OptionSet::new().remove_path(root.to_string_lossy()),
        )
        .unwrap();

    assert_eq!(names(&archive.list().unwrap()), ["a.txt", "sub/b.txt"]);
}

#[test]
fn test_listing_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "list.zip", &[("one", b"1"), ("two", b"22"), ("three", b"333")]);

    let first = archive.list().unwrap();
    let second = archive.list().unwrap();
    assert_eq!(first, second);
    assert_eq!(names(&first), ["one", "two", "three"]);
}

#[test]
fn test_missing_source_is_an_error() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "missing.zip");

    let err = archive
        .create(&[Source::path(dir.path().join("nope"))], &OptionSet::new())
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound));
    assert!(!archive.path().exists());
}

#[cfg(unix)]
#[test]
fn test_special_files_are_skipped() {
    use std::os::unix::net::UnixListener;
    use std::process::Command;
    use std::sync::mpsc;
    use std::thread;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("tree");
    write_file(&root, "a.txt", b"alpha");
    let fifo = root.join("pipe");
    let status = Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());
    let _socket = UnixListener::bind(root.join("sock")).unwrap();

    let archive = archive_at(&dir, "special.zip");
    let (tx, rx) = mpsc::channel();
    let worker = archive.clone();
    let sources = [Source::path(&root), Source::path(&fifo)];
    let prefix = dir.path().to_string_lossy().into_owned();
    thread::spawn(move || {
        let result = worker.create(&sources, &OptionSet::new().remove_path(prefix));
        let _ = tx.send(result.map(|entries| names(&entries)));
    });

    let added = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("create blocked on a special file")
        .unwrap();
    assert_eq!(added, ["tree/", "tree/a.txt"]);
    assert_eq!(names(&archive.list().unwrap()), ["tree/", "tree/a.txt"]);
}

// =============================================================================
// Virtual entries and metadata
// =============================================================================

#[test]
fn test_virtual_entry_metadata() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "meta.zip");
    let when = UNIX_EPOCH + Duration::from_secs(1_600_000_000);

    archive
        .create(
            &[Source::virtual_file("notes/todo.txt", "buy milk")
                .modified(when)
                .with_comment("shopping")],
            &OptionSet::new(),
        )
        .unwrap();

    let entries = archive.list().unwrap();
    let entry = &entries[0];
    assert_eq!(entry.stored_filename, "notes/todo.txt");
    assert_eq!(entry.comment, "shopping");
    assert_eq!(entry.kind, EntryKind::File);

    let drift = match entry.modified.duration_since(when) {
        Ok(d) => d,
        Err(e) => e.duration(),
    };
    assert!(drift <= Duration::from_secs(2), "drift {drift:?}");
}

#[test]
fn test_empty_payloads() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "empty.zip", &[("empty.txt", b"")]);

    let extracted = archive.extract_to_memory(&OptionSet::new()).unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].0.status, EntryStatus::Ok);
    assert!(extracted[0].1.is_empty());
    assert_eq!(extracted[0].0.crc32, 0);
}

#[test]
fn test_leading_slash_is_stripped() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "abs.zip", &[("/etc/conf", b"x"), ("./a/../b", b"y")]);
    assert_eq!(names(&archive.list().unwrap()), ["etc/conf", "b"]);
}

#[test]
fn test_add_path_and_junk_paths_on_create() {
    let dir = TempDir::new().unwrap();
    let root = sample_tree(dir.path());
    let archive = archive_at(&dir, "junk.zip");

    archive
        .create(
            &[Source::path(root.join("sub/deeper/c.bin")), Source::path(root.join("a.txt"))],
            &OptionSet::new().remove_all_path(true).add_path("pkg"),
        )
        .unwrap();

    assert_eq!(names(&archive.list().unwrap()), ["pkg/c.bin", "pkg/a.txt"]);
}

// =============================================================================
// Output modes
// =============================================================================

#[test]
fn test_extract_to_memory_and_writer() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "mem.zip", &[("a", b"hello "), ("b", b"world")]);

    let in_memory = archive.extract_to_memory(&OptionSet::new()).unwrap();
    let contents: Vec<&[u8]> = in_memory.iter().map(|(_, data)| data.as_slice()).collect();
    assert_eq!(contents, [b"hello ".as_slice(), b"world".as_slice()]);

    let mut out = Vec::new();
    let entries = archive.extract_to_writer(&mut out, &OptionSet::new()).unwrap();
    assert_eq!(out, b"hello world");
    assert_eq!(ok_names(&entries), ["a", "b"]);
}

// =============================================================================
// Temporary spool files
// =============================================================================

#[test]
fn test_spooled_deflate_roundtrip() {
    let dir = TempDir::new().unwrap();
    let root = sample_tree(dir.path());
    let archive = archive_at(&dir, "spool.zip");

    archive
        .create(
            &[Source::path(&root), Source::virtual_file("v.txt", "virtual".repeat(100))],
            &OptionSet::new()
                .remove_path(dir.path().to_string_lossy())
                .temp_file(TempFileMode::Always),
        )
        .unwrap();

    let extracted = archive.extract_to_memory(&OptionSet::new()).unwrap();
    for (entry, data) in &extracted {
        assert_eq!(entry.status, EntryStatus::Ok, "{}", entry.stored_filename);
        if entry.stored_filename == "data/sub/b.txt" {
            assert_eq!(data, &b"bravo ".repeat(500));
            assert!(entry.compressed_size < entry.uncompressed_size);
        }
        if entry.stored_filename == "v.txt" {
            assert_eq!(data, &"virtual".repeat(100).into_bytes());
        }
    }
}

#[test]
fn test_threshold_spool_matches_in_memory() {
    let dir = TempDir::new().unwrap();
    let content = b"0123456789abcdef".repeat(64);

    let spooled = archive_at(&dir, "spooled.zip");
    spooled
        .create(
            &[Source::virtual_file("x", content.clone())],
            &OptionSet::new().temp_file(TempFileMode::Threshold(16)),
        )
        .unwrap();
    let plain = archive_at(&dir, "plain.zip");
    plain
        .create(
            &[Source::virtual_file("x", content.clone())],
            &OptionSet::new().temp_file(TempFileMode::Never),
        )
        .unwrap();

    let a = &spooled.list().unwrap()[0];
    let b = &plain.list().unwrap()[0];
    assert_eq!(a.crc32, b.crc32);
    assert_eq!(a.uncompressed_size, b.uncompressed_size);
    assert_eq!(spooled.extract_to_memory(&OptionSet::new()).unwrap()[0].1, content);
}

#[test]
fn test_store_only_with_temp_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "conflict.zip");

    let err = archive
        .create(
            &[Source::virtual_file("x", "y")],
            &OptionSet::new().store_only(true).temp_file(TempFileMode::Always),
        )
        .unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidOption(_)));
    assert!(!archive.path().exists());
}

// =============================================================================
// Properties and comments
// =============================================================================

#[test]
fn test_properties() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "props.zip");

    let props = archive.properties().unwrap();
    assert_eq!(props.status, ArchiveStatus::NotExist);
    assert_eq!(props.entry_count, 0);

    archive
        .create(
            &[Source::virtual_file("a", "1"), Source::virtual_file("b", "2")],
            &OptionSet::new().comment(CommentRule::Set("release 1".into())),
        )
        .unwrap();

    let props = archive.properties().unwrap();
    assert_eq!(props.status, ArchiveStatus::Ok);
    assert_eq!(props.entry_count, 2);
    assert_eq!(props.comment, "release 1");
}

#[test]
fn test_reproducible_output() {
    let dir = TempDir::new().unwrap();
    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
    let sources = [
        Source::virtual_file("a", "alpha").modified(when),
        Source::virtual_file("b", "bravo").modified(when),
    ];

    let first = archive_at(&dir, "one.zip");
    let second = archive_at(&dir, "two.zip");
    first.create(&sources, &OptionSet::new()).unwrap();
    second.create(&sources, &OptionSet::new()).unwrap();

    assert_eq!(
        fs::read(first.path()).unwrap(),
        fs::read(second.path()).unwrap()
    );
}
