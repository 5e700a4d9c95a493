//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. For extraction or raw copies, read each file's Local File Header

use crate::error::{ArchiveError, Result};
use crate::io::{RangeReader, ReadAt};

use super::central_dir::CentralDirectory;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Owns its reader for the duration of one operation; dropping the
/// parser releases the underlying file handle.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: R,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: R) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The common case, an archive without a comment, is checked with a
    /// single read of the last 22 bytes. Otherwise the tail of the file is
    /// scanned backwards for the signature, over at most the largest
    /// comment plus the fixed record.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let fixed = EndOfCentralDirectory::SIZE as u64;

        if self.size >= fixed {
            let offset = self.size - fixed;
            let mut buf = [0u8; EndOfCentralDirectory::SIZE];
            self.reader.read_exact_at(offset, &mut buf)?;

            // Check for signature and zero-length comment
            if buf[0..4] == EndOfCentralDirectory::SIGNATURE.to_le_bytes() && buf[20..22] == [0, 0] {
                let eocd = EndOfCentralDirectory::decode(&mut &buf[..])?;
                return Ok((eocd, offset));
            }
        }

        let search_size = (MAX_COMMENT_SIZE + fixed).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf)?;

        // Shift bytes in from the right so `window` is always the
        // little-endian u32 starting at `i`.
        let mut window = 0u32;
        for i in (0..buf.len()).rev() {
            window = (window << 8) | buf[i] as u32;
            if window != EndOfCentralDirectory::SIGNATURE || i + EndOfCentralDirectory::SIZE > buf.len() {
                continue;
            }

            // A real EOCD's comment runs exactly to the end of the file.
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EndOfCentralDirectory::SIZE + comment_len == buf.len() {
                let eocd = EndOfCentralDirectory::decode(&mut &buf[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(ArchiveError::EocdNotFound)
    }

    /// Read the whole central directory.
    ///
    /// The directory must end exactly where the EOCD begins and hold
    /// exactly the number of records the EOCD declares.
    pub fn read_central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        if eocd.is_zip64() {
            return Err(ArchiveError::Zip64Unsupported);
        }
        if eocd.disk_number != 0 || eocd.disk_with_cd != 0 {
            return Err(ArchiveError::CorruptCentralDirectory(
                "multi-volume archives are not supported".into(),
            ));
        }

        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size != eocd_offset {
            return Err(ArchiveError::CorruptCentralDirectory(format!(
                "directory at {cd_offset} with {cd_size} bytes does not end at {eocd_offset}"
            )));
        }

        // Read the entire Central Directory in one request
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data)?;

        let mut cursor = cd_data.as_slice();
        let mut headers = Vec::with_capacity(eocd.total_entries as usize);
        for _ in 0..eocd.total_entries {
            headers.push(CentralFileHeader::decode(&mut cursor)?);
        }
        if !cursor.is_empty() {
            return Err(ArchiveError::CorruptCentralDirectory(format!(
                "{} unexpected bytes after {} records",
                cursor.len(),
                eocd.total_entries
            )));
        }

        log::debug!("central directory: {} entries at {}", headers.len(), cd_offset);
        Ok(CentralDirectory {
            headers,
            comment: eocd.comment,
            offset: cd_offset,
        })
    }

    /// Read and validate the Local File Header at `offset`.
    pub fn read_local_header(&self, offset: u64) -> Result<LocalFileHeader> {
        let mut reader = RangeReader::new(&self.reader, offset, self.size.saturating_sub(offset));
        LocalFileHeader::decode(&mut reader)
    }

    /// Length of an entry's complete on-disk block: local header, payload
    /// and trailing data descriptor if the entry has one.
    pub fn raw_entry_len(&self, header: &CentralFileHeader) -> Result<u64> {
        let offset = header.local_header_offset as u64;
        let mut len = self.read_local_header(offset)?.encoded_len() + header.compressed_size as u64;

        if header.flags & FLAG_DATA_DESCRIPTOR != 0 {
            let mut sig = [0u8; 4];
            self.reader.read_exact_at(offset + len, &mut sig)?;
            len += if u32::from_le_bytes(sig) == DATA_DESCRIPTOR_SIGNATURE {
                16
            } else {
                12
            };
        }
        Ok(len)
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }
}
