use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::LocalFileReader;

use super::entry::Entry;
use super::extractor::ZipExtractor;
use super::options::{IndexRange, OptionSet};
use super::parser::ZipParser;
use super::writer::{self, Source};

/// Whether an archive file is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Ok,
    NotExist,
}

/// Archive-level facts, as reported by [`ZipArchive::properties`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveProperties {
    pub entry_count: usize,
    pub comment: String,
    pub status: ArchiveStatus,
}

/// A ZIP archive on disk.
///
/// Holds only the path. Each operation opens the file, does its work and
/// releases the handle before returning, so nothing is kept open between
/// calls.
///
/// ```no_run
/// use rezip::{OptionSet, Source, ZipArchive};
///
/// let archive = ZipArchive::new("out.zip");
/// archive.create(&[Source::path("docs")], &OptionSet::new())?;
/// for entry in archive.list()? {
///     println!("{} ({} bytes)", entry.stored_filename, entry.uncompressed_size);
/// }
/// # Ok::<(), rezip::ArchiveError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipArchive {
    path: PathBuf,
}

impl ZipArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn extractor(&self) -> Result<ZipExtractor<LocalFileReader>> {
        Ok(ZipExtractor::new(LocalFileReader::new(&self.path)?))
    }

    /// Write a fresh archive holding `sources`, replacing any existing file.
    pub fn create(&self, sources: &[Source], options: &OptionSet) -> Result<Vec<Entry>> {
        writer::create(&self.path, sources, options)
    }

    /// Append `sources`, creating the archive if it is missing or empty.
    pub fn add(&self, sources: &[Source], options: &OptionSet) -> Result<Vec<Entry>> {
        writer::add(&self.path, sources, options)
    }

    /// Every entry, in central directory order.
    pub fn list(&self) -> Result<Vec<Entry>> {
        self.extractor()?.list_files()
    }

    pub fn properties(&self) -> Result<ArchiveProperties> {
        if !self.path.exists() {
            return Ok(ArchiveProperties {
                entry_count: 0,
                comment: String::new(),
                status: ArchiveStatus::NotExist,
            });
        }
        let dir = ZipParser::new(LocalFileReader::new(&self.path)?).read_central_directory()?;
        Ok(ArchiveProperties {
            entry_count: dir.len(),
            comment: String::from_utf8_lossy(&dir.comment).into_owned(),
            status: ArchiveStatus::Ok,
        })
    }

    /// Extract the selected entries under `dest`.
    pub fn extract(&self, dest: impl AsRef<Path>, options: &OptionSet) -> Result<Vec<Entry>> {
        self.extractor()?.extract_to_dir(dest.as_ref(), options)
    }

    /// Extract the entries at `indices`. Fails if `options` already selects
    /// entries some other way.
    pub fn extract_by_index(
        &self,
        indices: impl Into<Vec<IndexRange>>,
        dest: impl AsRef<Path>,
        options: OptionSet,
    ) -> Result<Vec<Entry>> {
        let options = options.by_index(indices);
        self.extract(dest, &options)
    }

    pub fn extract_to_memory(&self, options: &OptionSet) -> Result<Vec<(Entry, Vec<u8>)>> {
        self.extractor()?.extract_to_memory(options)
    }

    pub fn extract_to_writer(&self, writer: &mut dyn Write, options: &OptionSet) -> Result<Vec<Entry>> {
        self.extractor()?.extract_to_writer(writer, options)
    }

    /// Remove the selected entries, returning them.
    pub fn delete(&self, options: &OptionSet) -> Result<Vec<Entry>> {
        writer::delete(&self.path, options)
    }

    /// Append every entry of `other`.
    pub fn merge(&self, other: &ZipArchive) -> Result<()> {
        writer::merge(&self.path, &other.path)
    }

    /// Copy this archive to `path` and return a handle to the copy.
    pub fn duplicate(&self, path: impl Into<PathBuf>) -> Result<ZipArchive> {
        let copy = ZipArchive::new(path);
        writer::duplicate(&self.path, &copy.path)?;
        Ok(copy)
    }
}
