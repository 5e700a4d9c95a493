//! ZIP archive reading and rewriting.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed records of the format (local header, central
//!   directory header, EOCD) and DOS date/time conversion
//! - [`ZipParser`]: locates the EOCD and decodes the central directory
//! - [`CentralDirectory`]: the entry table, read and rewritten as a whole
//! - [`ZipExtractor`]: extraction to a directory, memory or a stream
//! - [`writer`]: create, add, delete, merge and duplicate
//! - [`ZipArchive`]: path-based facade over all of the above
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Archives are read from the end: EOCD first, then the central directory.
//! Rewrites copy the untouched entry blocks verbatim into a replacement
//! file and finish with a fresh central directory.
//!
//! ## Limitations
//!
//! - STORED and DEFLATE only
//! - No encryption support
//! - No ZIP64 or multi-disk archives

mod archive;
mod central_dir;
mod compress;
mod entry;
mod extractor;
mod options;
mod parser;
mod path;
pub mod structures;
pub mod writer;

pub use archive::{ArchiveProperties, ArchiveStatus, ZipArchive};
pub use central_dir::CentralDirectory;
pub use compress::{DeflateSpool, compress, copy_with_crc, decompress, inflate_stream};
pub use entry::{Entry, EntryKind, EntryStatus};
pub use extractor::ZipExtractor;
pub use options::{
    Callback, CallbackAction, CommentRule, DEFAULT_TEMP_FILE_THRESHOLD, IndexRange, OptionSet,
    Overwrite, SelectionFilter, TempFileMode,
};
pub use parser::ZipParser;
pub use path::{PathRules, escapes_base, reduce};
pub use structures::CompressionMethod;
pub use writer::Source;
