//! # rezip
//!
//! A ZIP archive engine: create, add, list, extract, delete, merge and
//! duplicate archives using STORED and DEFLATE entries.
//!
//! Every rewrite builds a complete replacement archive next to the
//! original and renames it into place, so an archive on disk is always
//! either the old version or the new one.
//!
//! ## Features
//!
//! - Archive files, directories (recursively) and in-memory content
//! - Append to existing archives without recompressing their entries
//! - Delete and merge by raw copy of the surviving entry blocks
//! - Extract to a directory, to memory or to any writer
//! - Select entries by name, regular expression or index range
//! - Per-entry callbacks that can rename, skip or abort
//!
//! ## Example
//!
//! ```no_run
//! use rezip::{OptionSet, Source, ZipArchive};
//!
//! let archive = ZipArchive::new("release.zip");
//! archive.create(
//!     &[Source::path("target/doc"), Source::virtual_file("VERSION", "1.0.0\n")],
//!     &OptionSet::new().remove_path("target"),
//! )?;
//!
//! let extracted = archive.extract("/tmp/release", &OptionSet::new().by_name(["doc/"]))?;
//! for entry in &extracted {
//!     println!("{}: {}", entry.filename, entry.status);
//! }
//! # Ok::<(), rezip::ArchiveError>(())
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{ArchiveError, Result};
pub use io::{LocalFileReader, ReadAt};
pub use zip::{
    ArchiveProperties, ArchiveStatus, CallbackAction, CommentRule, Entry, EntryKind, EntryStatus,
    IndexRange, OptionSet, Overwrite, SelectionFilter, Source, TempFileMode, ZipArchive,
    ZipExtractor,
};
