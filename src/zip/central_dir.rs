//! The authoritative entry table of an archive.

use std::io::Write;

use crate::error::{ArchiveError, Result};
use crate::io::OffsetWriter;

use super::entry::Entry;
use super::structures::{CentralFileHeader, EndOfCentralDirectory, field_u32};

/// Central directory records plus the archive comment.
///
/// Read in full when an archive is opened and written in full, followed
/// by a fresh EOCD, whenever an archive is rewritten.
#[derive(Debug, Clone, Default)]
pub struct CentralDirectory {
    pub headers: Vec<CentralFileHeader>,
    pub comment: Vec<u8>,
    /// Where the directory starts; everything before it is entry data.
    pub offset: u64,
}

impl CentralDirectory {
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Listing view of every record, in directory order.
    pub fn entries(&self) -> Vec<Entry> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, header)| Entry::from_central(index, header))
            .collect()
    }

    /// Write every record at the writer's current offset, then the EOCD
    /// describing exactly those bytes.
    pub fn write<W: Write>(&self, writer: &mut OffsetWriter<W>) -> Result<EndOfCentralDirectory> {
        if self.comment.len() > EndOfCentralDirectory::MAX_COMMENT_LEN {
            return Err(ArchiveError::FieldOverflow {
                field: "archive comment length",
                value: self.comment.len() as u64,
            });
        }
        let count = u16::try_from(self.headers.len())
            .ok()
            .filter(|&n| n != u16::MAX)
            .ok_or(ArchiveError::FieldOverflow {
                field: "entry count",
                value: self.headers.len() as u64,
            })?;

        let cd_offset = writer.offset();
        for header in &self.headers {
            header.encode(writer)?;
        }
        let cd_size = writer.offset() - cd_offset;

        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: count,
            total_entries: count,
            cd_size: field_u32("central directory size", cd_size)?,
            cd_offset: field_u32("central directory offset", cd_offset)?,
            comment: self.comment.clone(),
        };
        eocd.encode(writer)?;
        writer.flush()?;
        Ok(eocd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipParser;
    use crate::zip::structures::{ATTR_DIRECTORY, VERSION_MADE_BY, VERSION_NEEDED};

    fn header(name: &str, offset: u32, external_attrs: u32) -> CentralFileHeader {
        CentralFileHeader {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            flags: 0,
            method: 0,
            mod_time: 0,
            mod_date: 0x21,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_start: 0,
            internal_attrs: 0,
            external_attrs,
            local_header_offset: offset,
            file_name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        }
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = CentralDirectory {
            headers: vec![header("a.txt", 0, 0), header("b", 40, ATTR_DIRECTORY)],
            comment: b"release".to_vec(),
            offset: 0,
        };

        let mut writer = OffsetWriter::new(Vec::new(), 0);
        let eocd = dir.write(&mut writer).unwrap();
        assert_eq!(eocd.total_entries, 2);
        assert_eq!(eocd.cd_offset, 0);

        let bytes = writer.into_inner();
        assert_eq!(bytes.len() as u64, eocd.cd_size as u64 + eocd.encoded_len());

        let read = ZipParser::new(bytes).read_central_directory().unwrap();
        assert_eq!(read.headers, dir.headers);
        assert_eq!(read.comment, b"release");

        let entries = read.entries();
        assert!(!entries[0].is_folder());
        assert!(entries[1].is_folder());
    }

    #[test]
    fn test_empty_directory_is_valid() {
        let mut writer = OffsetWriter::new(Vec::new(), 0);
        CentralDirectory::default().write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        assert!(ZipParser::new(bytes).read_central_directory().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_comment() {
        let dir = CentralDirectory {
            comment: vec![0; 70_000],
            ..Default::default()
        };
        let mut writer = OffsetWriter::new(Vec::new(), 0);
        assert!(matches!(
            dir.write(&mut writer),
            Err(ArchiveError::FieldOverflow { .. })
        ));
    }
}
