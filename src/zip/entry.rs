use std::fmt;
use std::time::SystemTime;

use super::structures::{
    CentralFileHeader, CompressionMethod, FLAG_ENCRYPTED, from_dos_datetime,
};

/// What an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file, read from the filesystem or from an archive.
    File,
    /// Directory entry; its stored name ends with `/`.
    Folder,
    /// File whose content came from memory rather than the filesystem.
    Virtual,
}

/// Outcome of one entry within one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Ok,
    /// A path rule reduced the name to nothing, or it would escape the destination.
    Filtered,
    /// Stored name longer than 255 bytes.
    FilenameTooLong,
    UnsupportedCompression,
    UnsupportedEncryption,
    /// A directory already exists where the file should go.
    AlreadyADirectory,
    /// The existing destination file is read-only.
    WriteProtected,
    /// The existing destination file is newer than the entry.
    NewerExist,
    PathCreationFail,
    WriteError,
    ReadError,
    /// A callback stopped the operation at this entry.
    Aborted,
    /// A callback or the overwrite policy skipped this entry.
    Skipped,
}

impl EntryStatus {
    /// Whether this status counts as a failure for strict mode.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            EntryStatus::Ok | EntryStatus::Filtered | EntryStatus::Aborted | EntryStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Ok => "ok",
            EntryStatus::Filtered => "filtered",
            EntryStatus::FilenameTooLong => "filename_too_long",
            EntryStatus::UnsupportedCompression => "unsupported_compression",
            EntryStatus::UnsupportedEncryption => "unsupported_encryption",
            EntryStatus::AlreadyADirectory => "already_a_directory",
            EntryStatus::WriteProtected => "write_protected",
            EntryStatus::NewerExist => "newer_exist",
            EntryStatus::PathCreationFail => "path_creation_fail",
            EntryStatus::WriteError => "write_error",
            EntryStatus::ReadError => "read_error",
            EntryStatus::Aborted => "aborted",
            EntryStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One member of an archive, as listed or as processed by an operation.
///
/// `filename` is the source path when adding and the destination path when
/// extracting; `stored_filename` is always the name inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Position in the central directory.
    pub index: usize,
    pub filename: String,
    pub stored_filename: String,
    pub kind: EntryKind,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub modified: SystemTime,
    pub flags: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    pub comment: String,
    pub status: EntryStatus,
}

impl Entry {
    /// Build the listing view of a central directory record.
    pub fn from_central(index: usize, header: &CentralFileHeader) -> Self {
        let stored_filename = String::from_utf8_lossy(&header.file_name).into_owned();
        let kind = if header.is_directory() {
            EntryKind::Folder
        } else {
            EntryKind::File
        };
        Self {
            index,
            filename: stored_filename.clone(),
            stored_filename,
            kind,
            compression_method: CompressionMethod::from_u16(header.method),
            crc32: header.crc32,
            uncompressed_size: header.uncompressed_size as u64,
            compressed_size: header.compressed_size as u64,
            modified: from_dos_datetime(header.mod_time, header.mod_date),
            flags: header.flags,
            external_attributes: header.external_attrs,
            local_header_offset: header.local_header_offset as u64,
            comment: String::from_utf8_lossy(&header.comment).into_owned(),
            status: EntryStatus::Ok,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}
