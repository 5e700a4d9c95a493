use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use filetime::FileTime;

use crate::error::{ArchiveError, Result};
use crate::io::{RangeReader, ReadAt};

use super::compress;
use super::entry::{Entry, EntryStatus};
use super::options::{CallbackAction, OptionSet, Overwrite};
use super::parser::ZipParser;
use super::path::{escapes_base, reduce};
use super::structures::{CompressionMethod, FLAG_ENCRYPTED};

const MAX_PREALLOC: u64 = 1 << 20;

/// Where extracted bytes go.
enum Sink<'a> {
    Dir(&'a Path),
    Memory(Vec<Vec<u8>>),
    Stream(&'a mut dyn Write),
}

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub fn list_files(&self) -> Result<Vec<Entry>> {
        Ok(self.parser.read_central_directory()?.entries())
    }

    /// Extract the selected entries under `dest`, creating it if needed.
    pub fn extract_to_dir(&self, dest: &Path, options: &OptionSet) -> Result<Vec<Entry>> {
        self.extract(&mut Sink::Dir(dest), options)
    }

    /// Extract the selected entries into memory.
    ///
    /// Every processed entry is paired with its bytes; entries that were not
    /// extracted, and folders, come with an empty buffer.
    pub fn extract_to_memory(&self, options: &OptionSet) -> Result<Vec<(Entry, Vec<u8>)>> {
        let mut sink = Sink::Memory(Vec::new());
        let entries = self.extract(&mut sink, options)?;
        let buffers = match sink {
            Sink::Memory(buffers) => buffers,
            _ => Vec::new(),
        };
        Ok(entries.into_iter().zip(buffers).collect())
    }

    /// Write the selected entries' contents, one after another, to `writer`.
    pub fn extract_to_writer(&self, writer: &mut dyn Write, options: &OptionSet) -> Result<Vec<Entry>> {
        self.extract(&mut Sink::Stream(writer), options)
    }

    fn extract(&self, sink: &mut Sink<'_>, options: &OptionSet) -> Result<Vec<Entry>> {
        options.validate()?;
        let dir = self.parser.read_central_directory()?;

        let mut results = Vec::new();
        for mut entry in dir.entries() {
            if !options.selection.matches(&entry) {
                continue;
            }

            let data = self.extract_entry(&mut entry, sink, options)?;
            if let Sink::Memory(buffers) = sink {
                buffers.push(data);
            }

            if options.strict && entry.status.is_error() {
                return Err(ArchiveError::Entry {
                    name: entry.stored_filename,
                    status: entry.status,
                });
            }
            let aborted = entry.status == EntryStatus::Aborted;
            results.push(entry);
            if aborted {
                log::debug!("extraction aborted by callback");
                break;
            }
        }
        Ok(results)
    }

    /// Process one entry, recording the outcome in `entry.status`.
    ///
    /// Only archive-level failures are returned as errors.
    fn extract_entry(&self, entry: &mut Entry, sink: &mut Sink<'_>, options: &OptionSet) -> Result<Vec<u8>> {
        let local = self.parser.read_local_header(entry.local_header_offset)?;
        if CompressionMethod::from_u16(local.method) != entry.compression_method
            || String::from_utf8_lossy(&local.file_name) != entry.stored_filename
        {
            log::warn!(
                "local header of {} does not match its central directory record",
                entry.stored_filename
            );
            entry.status = EntryStatus::ReadError;
            return Ok(Vec::new());
        }
        if entry.is_encrypted() || local.flags & FLAG_ENCRYPTED != 0 {
            entry.status = EntryStatus::UnsupportedEncryption;
            return Ok(Vec::new());
        }
        if !entry.compression_method.is_supported() {
            entry.status = EntryStatus::UnsupportedCompression;
            return Ok(Vec::new());
        }
        let data_offset = entry.local_header_offset + local.encoded_len();

        if options.paths.remove_all_path && entry.is_folder() {
            entry.status = EntryStatus::Filtered;
            return Ok(Vec::new());
        }
        entry.filename = options.paths.apply(&entry.stored_filename);
        if entry.filename.is_empty() {
            entry.status = EntryStatus::Filtered;
            return Ok(Vec::new());
        }

        match options.run_pre(entry) {
            CallbackAction::Continue => {}
            CallbackAction::Skip => {
                entry.status = EntryStatus::Skipped;
                return Ok(Vec::new());
            }
            CallbackAction::Abort => {
                entry.status = EntryStatus::Aborted;
                return Ok(Vec::new());
            }
        }
        entry.filename = reduce(&entry.filename);
        if entry.filename.is_empty() {
            entry.status = EntryStatus::Filtered;
            return Ok(Vec::new());
        }

        let payload = RangeReader::new(self.parser.reader(), data_offset, entry.compressed_size);
        let mut data = Vec::new();
        entry.status = match sink {
            Sink::Dir(base) => write_file(base, entry, payload, options),
            Sink::Memory(_) => match read_payload(entry, payload) {
                Ok(bytes) => {
                    data = bytes;
                    EntryStatus::Ok
                }
                Err(status) => status,
            },
            Sink::Stream(writer) => stream_payload(entry, payload, &mut **writer),
        };

        if entry.status == EntryStatus::Ok && options.run_post(entry) == CallbackAction::Abort {
            entry.status = EntryStatus::Aborted;
        }
        Ok(data)
    }
}

fn crc_matches(entry: &Entry, crc32: u32, len: u64) -> bool {
    if crc32 == entry.crc32 && len == entry.uncompressed_size {
        return true;
    }
    log::warn!(
        "{}: checksum mismatch (expected {:08x}, got {:08x})",
        entry.stored_filename,
        entry.crc32,
        crc32
    );
    false
}

fn read_payload<P: Read>(entry: &Entry, mut payload: P) -> std::result::Result<Vec<u8>, EntryStatus> {
    if entry.is_folder() {
        return Ok(Vec::new());
    }
    let mut raw = Vec::with_capacity(entry.compressed_size.min(MAX_PREALLOC) as usize);
    let data = payload
        .read_to_end(&mut raw)
        .and_then(|_| compress::decompress(&raw, entry.compression_method, entry.uncompressed_size))
        .map_err(|e| {
            log::warn!("{}: {}", entry.stored_filename, e);
            EntryStatus::ReadError
        })?;
    if !crc_matches(entry, crc32fast::hash(&data), data.len() as u64) {
        return Err(EntryStatus::ReadError);
    }
    Ok(data)
}

fn stream_payload<P: Read>(entry: &Entry, payload: P, writer: &mut dyn Write) -> EntryStatus {
    if entry.is_folder() {
        return EntryStatus::Ok;
    }
    match compress::inflate_stream(payload, entry.compression_method, writer) {
        Ok((crc32, len)) if crc_matches(entry, crc32, len) => EntryStatus::Ok,
        Ok(_) => EntryStatus::ReadError,
        Err(e) => {
            log::warn!("{}: {}", entry.stored_filename, e);
            EntryStatus::ReadError
        }
    }
}

/// Apply the overwrite policy to an existing destination.
fn check_existing(dest: &Path, entry: &Entry, policy: Overwrite) -> Option<EntryStatus> {
    let meta = fs::metadata(dest).ok()?;
    if meta.is_dir() {
        return Some(EntryStatus::AlreadyADirectory);
    }
    if meta.permissions().readonly() {
        return Some(EntryStatus::WriteProtected);
    }
    match policy {
        Overwrite::Always => None,
        Overwrite::Never => Some(EntryStatus::Skipped),
        Overwrite::IfNotNewer => meta
            .modified()
            .ok()
            .filter(|existing| *existing > entry.modified)
            .map(|_| EntryStatus::NewerExist),
    }
}

fn write_file<P: Read>(base: &Path, entry: &Entry, payload: P, options: &OptionSet) -> EntryStatus {
    if !options.allow_escape && escapes_base(&entry.filename) {
        log::warn!("{}: refusing to write outside {}", entry.filename, base.display());
        return EntryStatus::Filtered;
    }
    let dest = base.join(&entry.filename);

    if entry.is_folder() {
        return match fs::create_dir_all(&dest) {
            Ok(()) => EntryStatus::Ok,
            Err(e) => {
                log::warn!("cannot create {}: {}", dest.display(), e);
                EntryStatus::PathCreationFail
            }
        };
    }

    if let Some(status) = check_existing(&dest, entry, options.overwrite) {
        return status;
    }
    if let Some(parent) = dest.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            log::warn!("cannot create {}: {}", parent.display(), e);
            return EntryStatus::PathCreationFail;
        }
    }
    let file = match File::create(&dest) {
        Ok(file) => file,
        Err(e) => {
            log::warn!("cannot create {}: {}", dest.display(), e);
            return EntryStatus::WriteError;
        }
    };

    let status = match compress::inflate_stream(payload, entry.compression_method, BufWriter::new(file)) {
        Ok((crc32, len)) if crc_matches(entry, crc32, len) => EntryStatus::Ok,
        Ok(_) => EntryStatus::ReadError,
        Err(e) => {
            log::warn!("{}: {}", dest.display(), e);
            match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
                    EntryStatus::ReadError
                }
                _ => EntryStatus::WriteError,
            }
        }
    };
    if status != EntryStatus::Ok {
        if let Err(e) = fs::remove_file(&dest) {
            log::debug!("cannot remove partial {}: {}", dest.display(), e);
        }
        return status;
    }

    if let Err(e) = filetime::set_file_mtime(&dest, FileTime::from_system_time(entry.modified)) {
        log::warn!("cannot set modification time of {}: {}", dest.display(), e);
    }
    EntryStatus::Ok
}
