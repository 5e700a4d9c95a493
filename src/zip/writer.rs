//! Archive mutation.
//!
//! Every operation here builds a complete new archive in a temporary file
//! next to the target and swaps it in at the end. Untouched entries are
//! copied as raw bytes (local header, payload and any data descriptor)
//! without being decompressed, and the central directory is always
//! rewritten in full.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::{ArchiveError, Result};
use crate::io::{LocalFileReader, OffsetWriter, ReadAt, ReplacementFile};

use super::central_dir::CentralDirectory;
use super::compress::{self, DeflateSpool};
use super::entry::{Entry, EntryKind, EntryStatus};
use super::options::{CallbackAction, OptionSet};
use super::parser::ZipParser;
use super::path::reduce;
use super::structures::*;

/// Longest stored filename accepted.
pub const MAX_NAME_LEN: usize = 255;

/// Something to put into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A file or directory on disk. Directories are added recursively;
    /// symbolic links are skipped.
    Path(PathBuf),
    /// In-memory content stored under `name`.
    Virtual {
        name: String,
        content: Vec<u8>,
        modified: Option<SystemTime>,
        comment: Option<String>,
    },
}

impl Source {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    pub fn virtual_file(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Source::Virtual {
            name: name.into(),
            content: content.into(),
            modified: None,
            comment: None,
        }
    }

    /// Set the modification time of a virtual file.
    pub fn modified(mut self, time: SystemTime) -> Self {
        if let Source::Virtual { modified, .. } = &mut self {
            *modified = Some(time);
        }
        self
    }

    /// Set the entry comment of a virtual file.
    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        if let Source::Virtual { comment, .. } = &mut self {
            *comment = Some(text.into());
        }
        self
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::path(path)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

enum Payload {
    Folder,
    File(PathBuf),
    Memory(Vec<u8>),
}

/// An entry waiting to be written.
struct Pending {
    filename: String,
    kind: EntryKind,
    payload: Payload,
    size: u64,
    modified: SystemTime,
    comment: String,
}

impl Pending {
    fn from_fs(path: &Path, meta: &Metadata) -> Self {
        let (kind, payload) = if meta.is_dir() {
            (EntryKind::Folder, Payload::Folder)
        } else {
            (EntryKind::File, Payload::File(path.to_path_buf()))
        };
        Self {
            filename: archive_name(path),
            kind,
            payload,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            comment: String::new(),
        }
    }
}

fn archive_name(path: &Path) -> String {
    let name = path.to_string_lossy();
    if cfg!(windows) {
        name.replace('\\', "/")
    } else {
        name.into_owned()
    }
}

/// Turn sources into a flat list of pending entries, directories first.
fn expand_sources(sources: &[Source]) -> Result<Vec<Pending>> {
    let mut pending = Vec::new();
    for source in sources {
        match source {
            Source::Path(path) => {
                let meta = fs::symlink_metadata(path)?;
                if meta.file_type().is_symlink() {
                    log::debug!("skipping symlink {}", path.display());
                    continue;
                }
                if !meta.is_dir() {
                    if meta.is_file() {
                        pending.push(Pending::from_fs(path, &meta));
                    } else {
                        log::debug!("skipping special file {}", path.display());
                    }
                    continue;
                }
                for item in WalkDir::new(path).follow_links(false).sort_by_file_name() {
                    let item = item.map_err(io::Error::from)?;
                    if item.path_is_symlink() {
                        log::debug!("skipping symlink {}", item.path().display());
                        continue;
                    }
                    let meta = item.metadata().map_err(io::Error::from)?;
                    if !meta.is_file() && !meta.is_dir() {
                        log::debug!("skipping special file {}", item.path().display());
                        continue;
                    }
                    pending.push(Pending::from_fs(item.path(), &meta));
                }
            }
            Source::Virtual {
                name,
                content,
                modified,
                comment,
            } => pending.push(Pending {
                filename: name.clone(),
                kind: EntryKind::Virtual,
                payload: Payload::Memory(content.clone()),
                size: content.len() as u64,
                modified: modified.unwrap_or_else(SystemTime::now),
                comment: comment.clone().unwrap_or_default(),
            }),
        }
    }
    Ok(pending)
}

/// Payload ready to be written after its local header.
enum Prepared {
    Empty,
    Bytes { data: Vec<u8>, crc32: u32, size: u64 },
    Spool(DeflateSpool),
    /// Stored file too large for memory; copied again when written.
    Stream { path: PathBuf, crc32: u32, size: u64 },
}

impl Prepared {
    /// (crc32, uncompressed size, compressed size)
    fn sizes(&self) -> (u32, u64, u64) {
        match self {
            Prepared::Empty => (0, 0, 0),
            Prepared::Bytes { data, crc32, size } => (*crc32, *size, data.len() as u64),
            Prepared::Spool(spool) => (spool.crc32, spool.uncompressed_size, spool.compressed_size),
            Prepared::Stream { crc32, size, .. } => (*crc32, *size, *size),
        }
    }
}

/// Read and compress a payload. Nothing is written to the archive yet, so
/// a failure here only affects this entry.
fn prepare(pending: &Pending, method: CompressionMethod, options: &OptionSet) -> io::Result<Prepared> {
    let spool = options.spools(pending.size);
    match &pending.payload {
        Payload::Folder => Ok(Prepared::Empty),
        Payload::Memory(content) if spool && method == CompressionMethod::Deflate => {
            Ok(Prepared::Spool(DeflateSpool::new(&mut content.as_slice())?))
        }
        Payload::Memory(content) => {
            let (data, crc32) = compress::compress(content, method)?;
            Ok(Prepared::Bytes {
                data,
                crc32,
                size: content.len() as u64,
            })
        }
        Payload::File(path) if spool && method == CompressionMethod::Deflate => {
            Ok(Prepared::Spool(DeflateSpool::new(&mut File::open(path)?)?))
        }
        Payload::File(path) if spool => {
            let (crc32, size) = compress::copy_with_crc(&mut File::open(path)?, &mut io::sink())?;
            Ok(Prepared::Stream {
                path: path.clone(),
                crc32,
                size,
            })
        }
        Payload::File(path) => {
            let content = fs::read(path)?;
            let (data, crc32) = compress::compress(&content, method)?;
            Ok(Prepared::Bytes {
                data,
                crc32,
                size: content.len() as u64,
            })
        }
    }
}

/// Write one local header and payload, returning its central directory record.
fn emit<W: Write>(
    writer: &mut OffsetWriter<W>,
    entry: &mut Entry,
    prepared: Prepared,
) -> Result<CentralFileHeader> {
    let (crc32, uncompressed_size, compressed_size) = prepared.sizes();
    let (mod_time, mod_date) = to_dos_datetime(entry.modified);
    let offset = writer.offset();

    let header = CentralFileHeader {
        version_made_by: VERSION_MADE_BY,
        version_needed: VERSION_NEEDED,
        flags: 0,
        method: entry.compression_method.as_u16(),
        mod_time,
        mod_date,
        crc32,
        compressed_size: field_u32("compressed size", compressed_size)?,
        uncompressed_size: field_u32("uncompressed size", uncompressed_size)?,
        disk_start: 0,
        internal_attrs: 0,
        external_attrs: if entry.is_folder() { ATTR_DIRECTORY } else { 0 },
        local_header_offset: field_u32("local header offset", offset)?,
        file_name: entry.stored_filename.as_bytes().to_vec(),
        extra: Vec::new(),
        comment: entry.comment.as_bytes().to_vec(),
    };
    header.to_local().encode(writer)?;

    match prepared {
        Prepared::Empty => {}
        Prepared::Bytes { data, .. } => writer.write_all(&data)?,
        Prepared::Spool(mut spool) => {
            spool.copy_to(writer)?;
        }
        Prepared::Stream { path, crc32, size } => {
            let mut file = File::open(&path)?.take(size);
            let copied = compress::copy_with_crc(&mut file, writer)?;
            if copied != (crc32, size) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} changed while being added", path.display()),
                )
                .into());
            }
        }
    }

    entry.crc32 = crc32;
    entry.uncompressed_size = uncompressed_size;
    entry.compressed_size = compressed_size;
    entry.local_header_offset = offset;
    Ok(header)
}

/// Normalize a stored name, keeping the trailing slash on folders.
fn normalize_stored(name: &str, is_folder: bool) -> String {
    let mut name = reduce(name).trim_start_matches('/').to_string();
    if is_folder && !name.is_empty() {
        name.push('/');
    }
    name
}

fn name_status(name: &str) -> EntryStatus {
    if name.is_empty() {
        EntryStatus::Filtered
    } else if name.len() > MAX_NAME_LEN {
        EntryStatus::FilenameTooLong
    } else {
        EntryStatus::Ok
    }
}

fn check_strict(options: &OptionSet, entry: &Entry) -> Result<()> {
    if options.strict && entry.status.is_error() {
        return Err(ArchiveError::Entry {
            name: entry.filename.clone(),
            status: entry.status,
        });
    }
    Ok(())
}

/// Append pending entries at the writer's position, recording a central
/// directory record for each one written.
fn write_entries<W: Write>(
    writer: &mut OffsetWriter<W>,
    pending: Vec<Pending>,
    options: &OptionSet,
    headers: &mut Vec<CentralFileHeader>,
) -> Result<Vec<Entry>> {
    let mut results = Vec::with_capacity(pending.len());

    for item in pending {
        let is_folder = item.kind == EntryKind::Folder;
        let method = if is_folder || options.store_only {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        };
        let mut entry = Entry {
            index: headers.len(),
            filename: item.filename.clone(),
            stored_filename: options.paths.stored_name(&item.filename, is_folder),
            kind: item.kind,
            compression_method: method,
            crc32: 0,
            uncompressed_size: item.size,
            compressed_size: 0,
            modified: item.modified,
            flags: 0,
            external_attributes: if is_folder { ATTR_DIRECTORY } else { 0 },
            local_header_offset: writer.offset(),
            comment: item.comment.clone(),
            status: EntryStatus::Ok,
        };

        entry.status = name_status(&entry.stored_filename);
        if entry.status != EntryStatus::Ok {
            check_strict(options, &entry)?;
            results.push(entry);
            continue;
        }

        match options.run_pre(&mut entry) {
            CallbackAction::Continue => {}
            CallbackAction::Skip => {
                entry.status = EntryStatus::Skipped;
                results.push(entry);
                continue;
            }
            CallbackAction::Abort => {
                entry.status = EntryStatus::Aborted;
                results.push(entry);
                break;
            }
        }

        // The callback may have renamed the entry.
        entry.stored_filename = normalize_stored(&entry.stored_filename, is_folder);
        entry.status = name_status(&entry.stored_filename);
        if entry.status != EntryStatus::Ok {
            check_strict(options, &entry)?;
            results.push(entry);
            continue;
        }

        let prepared = match prepare(&item, method, options) {
            Ok(prepared) => prepared,
            Err(e) => {
                log::warn!("cannot read {}: {}", item.filename, e);
                entry.status = EntryStatus::ReadError;
                check_strict(options, &entry)?;
                results.push(entry);
                continue;
            }
        };

        headers.push(emit(writer, &mut entry, prepared)?);

        let aborted = options.run_post(&mut entry) == CallbackAction::Abort;
        if aborted {
            entry.status = EntryStatus::Aborted;
        }
        results.push(entry);
        if aborted {
            break;
        }
    }

    Ok(results)
}

/// Write a new archive at `path` holding `sources`, replacing any file there.
pub fn create(path: &Path, sources: &[Source], options: &OptionSet) -> Result<Vec<Entry>> {
    options.validate()?;
    let pending = expand_sources(sources)?;

    let replacement = ReplacementFile::new(path)?;
    let mut writer = replacement.writer();
    let mut dir = CentralDirectory {
        comment: options
            .comment
            .as_ref()
            .map(|rule| rule.apply(b""))
            .unwrap_or_default(),
        ..Default::default()
    };

    let results = write_entries(&mut writer, pending, options, &mut dir.headers)?;
    dir.write(&mut writer)?;
    drop(writer);
    replacement.commit()?;

    log::debug!("created {} with {} entries", path.display(), dir.len());
    Ok(results)
}

/// True when `path` does not exist or is a zero-length file.
fn is_missing_or_empty(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Append `sources` to the archive at `path`.
///
/// A missing or empty file is created instead.
pub fn add(path: &Path, sources: &[Source], options: &OptionSet) -> Result<Vec<Entry>> {
    if is_missing_or_empty(path)? {
        return create(path, sources, options);
    }
    options.validate()?;
    let pending = expand_sources(sources)?;

    let parser = ZipParser::new(LocalFileReader::new(path)?);
    let mut dir = parser.read_central_directory()?;
    if let Some(rule) = &options.comment {
        dir.comment = rule.apply(&dir.comment);
    }

    let replacement = ReplacementFile::new(path)?;
    let mut writer = replacement.writer();
    parser.reader().copy_range(0, dir.offset, &mut writer)?;

    let results = write_entries(&mut writer, pending, options, &mut dir.headers)?;
    dir.write(&mut writer)?;
    drop(writer);
    drop(parser);
    replacement.commit()?;

    log::debug!("archive {} now has {} entries", path.display(), dir.len());
    Ok(results)
}

/// Remove the selected entries from the archive at `path`.
///
/// Returns the removed entries. Removing every entry still leaves a valid,
/// empty archive.
pub fn delete(path: &Path, options: &OptionSet) -> Result<Vec<Entry>> {
    options.validate()?;

    let parser = ZipParser::new(LocalFileReader::new(path)?);
    let dir = parser.read_central_directory()?;
    let (removed, kept): (Vec<Entry>, Vec<Entry>) = dir
        .entries()
        .into_iter()
        .partition(|entry| options.selection.matches(entry));
    if removed.is_empty() {
        return Ok(removed);
    }

    let replacement = ReplacementFile::new(path)?;
    let mut writer = replacement.writer();
    let mut rebuilt = CentralDirectory {
        comment: dir.comment.clone(),
        ..Default::default()
    };

    for entry in &kept {
        let mut header = dir.headers[entry.index].clone();
        let len = parser.raw_entry_len(&header)?;
        header.local_header_offset = field_u32("local header offset", writer.offset())?;
        parser
            .reader()
            .copy_range(entry.local_header_offset, len, &mut writer)?;
        rebuilt.headers.push(header);
    }

    rebuilt.write(&mut writer)?;
    drop(writer);
    drop(parser);
    replacement.commit()?;

    log::debug!(
        "deleted {} of {} entries from {}",
        removed.len(),
        dir.len(),
        path.display()
    );
    Ok(removed)
}

/// Append every entry of `other` to the archive at `path`.
///
/// When `path` is missing, zero-length or holds no entries, it becomes a
/// copy of `other`.
pub fn merge(path: &Path, other: &Path) -> Result<()> {
    let other_parser = ZipParser::new(LocalFileReader::new(other)?);
    if is_missing_or_empty(path)? {
        drop(other_parser);
        return duplicate(other, path);
    }

    let other_dir = other_parser.read_central_directory()?;
    let parser = ZipParser::new(LocalFileReader::new(path)?);
    let dir = parser.read_central_directory()?;

    if other_dir.is_empty() {
        return Ok(());
    }
    if dir.is_empty() {
        drop(parser);
        drop(other_parser);
        return duplicate(other, path);
    }

    let replacement = ReplacementFile::new(path)?;
    let mut writer = replacement.writer();
    parser.reader().copy_range(0, dir.offset, &mut writer)?;
    let base = writer.offset();
    other_parser
        .reader()
        .copy_range(0, other_dir.offset, &mut writer)?;

    let mut merged = CentralDirectory {
        headers: dir.headers,
        comment: match (dir.comment.is_empty(), other_dir.comment.is_empty()) {
            (_, true) => dir.comment,
            (true, false) => other_dir.comment,
            (false, false) => [&dir.comment[..], &b" "[..], &other_dir.comment[..]].concat(),
        },
        ..Default::default()
    };
    for mut header in other_dir.headers {
        header.local_header_offset =
            field_u32("local header offset", base + header.local_header_offset as u64)?;
        merged.headers.push(header);
    }

    merged.write(&mut writer)?;
    drop(writer);
    drop(parser);
    drop(other_parser);
    replacement.commit()?;

    log::debug!("merged {} into {}", other.display(), path.display());
    Ok(())
}

/// Copy the archive at `source` to `target` byte for byte.
pub fn duplicate(source: &Path, target: &Path) -> Result<()> {
    let mut input = File::open(source)?;
    let replacement = ReplacementFile::new(target)?;
    let mut writer = replacement.writer();
    io::copy(&mut input, &mut writer)?;
    writer.flush()?;
    drop(writer);
    drop(input);
    replacement.commit()?;
    Ok(())
}
