//! Extraction policy, path rule and callback tests.

mod common;

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::*;
use filetime::FileTime;
use rezip::{
    ArchiveError, CallbackAction, EntryStatus, IndexRange, OptionSet, Overwrite, Source,
    ZipArchive,
};
use tempfile::TempDir;

fn tree_archive(dir: &TempDir) -> ZipArchive {
    let root = sample_tree(dir.path());
    let archive = archive_at(dir, "tree.zip");
    archive
        .create(
            &[Source::path(&root)],
            &OptionSet::new().remove_path(dir.path().to_string_lossy()),
        )
        .unwrap();
    archive
}

fn set_mtime(path: &std::path::Path, time: SystemTime) {
    filetime::set_file_mtime(path, FileTime::from_system_time(time)).unwrap();
}

// =============================================================================
// Overwrite policy
// =============================================================================

#[test]
fn test_reextract_over_own_output() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");

    archive.extract(&out, &OptionSet::new()).unwrap();
    let again = archive.extract(&out, &OptionSet::new()).unwrap();
    assert_eq!(again[0].status, EntryStatus::Ok);
}

#[test]
fn test_newer_existing_file_is_kept() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");
    let target = write_file(&out, "a.txt", b"local edit");
    set_mtime(&target, SystemTime::now() + Duration::from_secs(86_400));

    let results = archive.extract(&out, &OptionSet::new()).unwrap();
    assert_eq!(results[0].status, EntryStatus::NewerExist);
    assert_eq!(fs::read(&target).unwrap(), b"local edit");

    let results = archive
        .extract(&out, &OptionSet::new().overwrite(Overwrite::Always))
        .unwrap();
    assert_eq!(results[0].status, EntryStatus::Ok);
    assert_eq!(fs::read(&target).unwrap(), b"alpha");
}

#[test]
fn test_older_existing_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");
    let target = write_file(&out, "a.txt", b"stale");
    set_mtime(&target, UNIX_EPOCH + Duration::from_secs(1_000_000_000));

    let results = archive.extract(&out, &OptionSet::new()).unwrap();
    assert_eq!(results[0].status, EntryStatus::Ok);
    assert_eq!(fs::read(&target).unwrap(), b"alpha");
}

#[test]
fn test_never_overwrite_skips() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
    let out = dir.path().join("out");
    let target = write_file(&out, "a.txt", b"mine");
    set_mtime(&target, UNIX_EPOCH + Duration::from_secs(1_000_000_000));

    let results = archive
        .extract(&out, &OptionSet::new().overwrite(Overwrite::Never).strict(true))
        .unwrap();
    assert_eq!(results[0].status, EntryStatus::Skipped);
    assert_eq!(results[1].status, EntryStatus::Ok);
    assert_eq!(fs::read(&target).unwrap(), b"mine");
}

#[test]
fn test_directory_in_the_way() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");
    fs::create_dir_all(out.join("a.txt")).unwrap();

    let results = archive
        .extract(&out, &OptionSet::new().overwrite(Overwrite::Always))
        .unwrap();
    assert_eq!(results[0].status, EntryStatus::AlreadyADirectory);
}

#[test]
fn test_write_protected_file() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "a.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");
    let target = write_file(&out, "a.txt", b"locked");
    let mut perms = fs::metadata(&target).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&target, perms.clone()).unwrap();

    let results = archive
        .extract(&out, &OptionSet::new().overwrite(Overwrite::Always))
        .unwrap();
    assert_eq!(results[0].status, EntryStatus::WriteProtected);
    assert_eq!(fs::read(&target).unwrap(), b"locked");

    let err = archive
        .extract(&out, &OptionSet::new().overwrite(Overwrite::Always).strict(true))
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::Entry {
            status: EntryStatus::WriteProtected,
            ..
        }
    ));

    perms.set_readonly(false);
    fs::set_permissions(&target, perms).unwrap();
}

#[test]
fn test_modification_time_is_restored() {
    let dir = TempDir::new().unwrap();
    let archive = archive_at(&dir, "t.zip");
    let when = UNIX_EPOCH + Duration::from_secs(1_400_000_000);
    archive
        .create(&[Source::virtual_file("t.txt", "time").modified(when)], &OptionSet::new())
        .unwrap();
    let entry = archive.list().unwrap().remove(0);

    let out = dir.path().join("out");
    archive.extract(&out, &OptionSet::new()).unwrap();
    let restored = fs::metadata(out.join("t.txt")).unwrap().modified().unwrap();
    assert_eq!(
        FileTime::from_system_time(restored).unix_seconds(),
        FileTime::from_system_time(entry.modified).unix_seconds()
    );
}

// =============================================================================
// Destination paths
// =============================================================================

#[test]
fn test_escaping_entries_are_filtered() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "evil.zip", &[("../evil.txt", b"boo"), ("fine.txt", b"ok")]);
    assert_eq!(names(&archive.list().unwrap()), ["../evil.txt", "fine.txt"]);

    let out = dir.path().join("out");
    let inner = out.join("inner");
    fs::create_dir_all(&inner).unwrap();

    let results = archive.extract(&inner, &OptionSet::new()).unwrap();
    assert_eq!(results[0].status, EntryStatus::Filtered);
    assert_eq!(results[1].status, EntryStatus::Ok);
    assert!(!out.join("evil.txt").exists());

    archive
        .extract(&inner, &OptionSet::new().allow_escape(true))
        .unwrap();
    assert_eq!(fs::read(out.join("evil.txt")).unwrap(), b"boo");
}

#[test]
fn test_remove_and_add_path_on_extract() {
    let dir = TempDir::new().unwrap();
    let archive = tree_archive(&dir);
    let out = dir.path().join("out");

    let results = archive
        .extract(
            &out,
            &OptionSet::new()
                .by_name(["data/sub/"])
                .remove_path("data")
                .add_path("restored"),
        )
        .unwrap();

    assert_eq!(
        ok_names(&results),
        ["data/sub/", "data/sub/b.txt", "data/sub/deeper/", "data/sub/deeper/c.bin"]
    );
    assert_eq!(results[1].filename, "restored/sub/b.txt");
    assert!(out.join("restored/sub/deeper/c.bin").is_file());
    assert!(!out.join("data").exists());
}

#[test]
fn test_junk_paths_flattens_files() {
    let dir = TempDir::new().unwrap();
    let archive = tree_archive(&dir);
    let out = dir.path().join("out");

    let results = archive
        .extract(&out, &OptionSet::new().remove_all_path(true))
        .unwrap();

    let filtered = results
        .iter()
        .filter(|e| e.status == EntryStatus::Filtered)
        .count();
    assert_eq!(filtered, 3);
    for name in ["a.txt", "b.txt", "c.bin"] {
        assert!(out.join(name).is_file(), "{name}");
    }
    assert!(!out.join("data").exists());
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn test_extract_by_index() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "idx.zip", &[("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")]);
    let out = dir.path().join("out");

    let results = archive
        .extract_by_index(IndexRange::parse_list("1,3-").unwrap(), &out, OptionSet::new())
        .unwrap();
    assert_eq!(names(&results), ["b", "d"]);
    assert!(!out.join("a").exists());
    assert!(out.join("d").exists());

    let err = archive
        .extract_by_index(vec![IndexRange::single(0)], &out, OptionSet::new().by_name(["a"]))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidOption(_)));
}

#[test]
fn test_folder_name_without_slash_selects_folder_entry() {
    let dir = TempDir::new().unwrap();
    let archive = tree_archive(&dir);

    let picked = archive
        .extract_to_memory(&OptionSet::new().by_name(["data/sub", "data/a.txt"]))
        .unwrap();
    let picked: Vec<&str> = picked.iter().map(|(e, _)| e.stored_filename.as_str()).collect();
    assert_eq!(picked, ["data/a.txt", "data/sub/"]);
}

// =============================================================================
// Callbacks
// =============================================================================

#[test]
fn test_pre_callback_renames_destination() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "cb.zip", &[("a.txt", b"alpha")]);
    let out = dir.path().join("out");

    let options = OptionSet::new().pre_callback(|entry| {
        entry.filename = format!("renamed/{}", entry.filename);
        CallbackAction::Continue
    });
    let results = archive.extract(&out, &options).unwrap();

    assert_eq!(results[0].filename, "renamed/a.txt");
    assert_eq!(results[0].stored_filename, "a.txt");
    assert_eq!(fs::read(out.join("renamed/a.txt")).unwrap(), b"alpha");
}

#[test]
fn test_pre_callback_skip_and_abort() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "cb.zip", &[("a", b"1"), ("b", b"2"), ("c", b"3"), ("d", b"4")]);
    let out = dir.path().join("out");

    let options = OptionSet::new().pre_callback(|entry| match entry.stored_filename.as_str() {
        "b" => CallbackAction::Skip,
        "c" => CallbackAction::Abort,
        _ => CallbackAction::Continue,
    });
    let results = archive.extract(&out, &options).unwrap();

    let statuses: Vec<EntryStatus> = results.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        [EntryStatus::Ok, EntryStatus::Skipped, EntryStatus::Aborted]
    );
    assert!(out.join("a").exists());
    assert!(!out.join("b").exists());
    assert!(!out.join("c").exists());
    assert!(!out.join("d").exists());
}

#[test]
fn test_post_callback_sees_results_and_aborts() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "cb.zip", &[("a", b"1"), ("b", b"22"), ("c", b"333")]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);

    let options = OptionSet::new().post_callback(move |entry| {
        log.borrow_mut().push((entry.stored_filename.clone(), entry.uncompressed_size));
        if entry.stored_filename == "b" {
            CallbackAction::Abort
        } else {
            CallbackAction::Continue
        }
    });
    let results = archive.extract_to_memory(&options).unwrap();

    assert_eq!(
        *seen.borrow(),
        [("a".to_string(), 1), ("b".to_string(), 2)]
    );
    assert_eq!(results.len(), 2);
    assert_eq!(results[1].0.status, EntryStatus::Aborted);
    // the aborting entry was already extracted
    assert_eq!(results[1].1, b"22");
}

// =============================================================================
// Strict mode
// =============================================================================

#[test]
fn test_strict_mode_escalates_first_failure() {
    let dir = TempDir::new().unwrap();
    let archive = create_virtual(&dir, "s.zip", &[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
    let out = dir.path().join("out");
    let target = write_file(&out, "a.txt", b"newer");
    set_mtime(&target, SystemTime::now() + Duration::from_secs(86_400));

    let err = archive
        .extract(&out, &OptionSet::new().strict(true))
        .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::Entry {
            status: EntryStatus::NewerExist,
            ref name,
        } if name == "a.txt"
    ));
    assert!(!out.join("b.txt").exists());
}
