use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::io::{self, Cursor, Read, Write};
use std::time::SystemTime;

use crate::error::{ArchiveError, Result};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CompressionMethod::Unknown(_))
    }
}

/// Version needed to extract: 2.0 (deflate, folders).
pub const VERSION_NEEDED: u16 = 20;
/// Version made by: MS-DOS compatible attributes, APPNOTE 2.0.
pub const VERSION_MADE_BY: u16 = 20;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose flag: sizes and CRC follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// Optional signature in front of a data descriptor.
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// MS-DOS directory bit in the external attributes.
pub const ATTR_DIRECTORY: u32 = 0x10;

fn read_fixed<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], record: &'static str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ArchiveError::Truncated(record)
        } else {
            ArchiveError::Io(e)
        }
    })
}

fn read_var<R: Read + ?Sized>(reader: &mut R, len: u16, record: &'static str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    read_fixed(reader, &mut buf, record)?;
    Ok(buf)
}

fn check_signature(actual: u32, expected: u32, record: &'static str) -> Result<()> {
    if actual != expected {
        return Err(ArchiveError::InvalidSignature {
            record,
            expected,
            actual,
        });
    }
    Ok(())
}

fn field_u16(field: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| ArchiveError::FieldOverflow {
        field,
        value: len as u64,
    })
}

/// Narrow a size or offset to its 32-bit format field.
pub(crate) fn field_u32(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| ArchiveError::FieldOverflow { field, value })
}

/// Local File Header (LFH) - 30 bytes plus name and extra field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    pub const SIGNATURE: u32 = 0x04034b50;
    pub const SIZE: usize = 30;

    /// Total encoded length including the variable-length trailers.
    pub fn encoded_len(&self) -> u64 {
        (Self::SIZE + self.file_name.len() + self.extra.len()) as u64
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let name_len = field_u16("file name length", self.file_name.len())?;
        let extra_len = field_u16("extra field length", self.extra.len())?;

        writer.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.method)?;
        writer.write_u16::<LittleEndian>(self.mod_time)?;
        writer.write_u16::<LittleEndian>(self.mod_date)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_u16::<LittleEndian>(extra_len)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra)?;
        Ok(())
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        read_fixed(reader, &mut buf, "local file header")?;

        let mut cursor = Cursor::new(&buf[..]);
        check_signature(
            cursor.read_u32::<LittleEndian>()?,
            Self::SIGNATURE,
            "local file header",
        )?;

        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let mod_time = cursor.read_u16::<LittleEndian>()?;
        let mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;

        let file_name = read_var(reader, name_len, "local file header")?;
        let extra = read_var(reader, extra_len, "local file header")?;

        Ok(Self {
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes plus name, extra and comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralFileHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralFileHeader {
    pub const SIGNATURE: u32 = 0x02014b50;
    pub const SIZE: usize = 46;

    pub fn encoded_len(&self) -> u64 {
        (Self::SIZE + self.file_name.len() + self.extra.len() + self.comment.len()) as u64
    }

    /// The local header this record describes, without the extra field.
    pub fn to_local(&self) -> LocalFileHeader {
        LocalFileHeader {
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method,
            mod_time: self.mod_time,
            mod_date: self.mod_date,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            file_name: self.file_name.clone(),
            extra: Vec::new(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn is_directory(&self) -> bool {
        self.external_attrs & ATTR_DIRECTORY != 0 || self.file_name.last() == Some(&b'/')
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let name_len = field_u16("file name length", self.file_name.len())?;
        let extra_len = field_u16("extra field length", self.extra.len())?;
        let comment_len = field_u16("file comment length", self.comment.len())?;

        writer.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.method)?;
        writer.write_u16::<LittleEndian>(self.mod_time)?;
        writer.write_u16::<LittleEndian>(self.mod_date)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(name_len)?;
        writer.write_u16::<LittleEndian>(extra_len)?;
        writer.write_u16::<LittleEndian>(comment_len)?;
        writer.write_u16::<LittleEndian>(self.disk_start)?;
        writer.write_u16::<LittleEndian>(self.internal_attrs)?;
        writer.write_u32::<LittleEndian>(self.external_attrs)?;
        writer.write_u32::<LittleEndian>(self.local_header_offset)?;
        writer.write_all(&self.file_name)?;
        writer.write_all(&self.extra)?;
        writer.write_all(&self.comment)?;
        Ok(())
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        read_fixed(reader, &mut buf, "central directory file header")?;

        let mut cursor = Cursor::new(&buf[..]);
        check_signature(
            cursor.read_u32::<LittleEndian>()?,
            Self::SIGNATURE,
            "central directory file header",
        )?;

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let mod_time = cursor.read_u16::<LittleEndian>()?;
        let mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let name_len = cursor.read_u16::<LittleEndian>()?;
        let extra_len = cursor.read_u16::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;
        let disk_start = cursor.read_u16::<LittleEndian>()?;
        let internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let local_header_offset = cursor.read_u32::<LittleEndian>()?;

        let file_name = read_var(reader, name_len, "central directory file header")?;
        let extra = read_var(reader, extra_len, "central directory file header")?;
        let comment = read_var(reader, comment_len, "central directory file header")?;

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start,
            internal_attrs,
            external_attrs,
            local_header_offset,
            file_name,
            extra,
            comment,
        })
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const SIZE: usize = 22;
    /// Largest comment the 16-bit length field can describe.
    pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

    pub fn encoded_len(&self) -> u64 {
        (Self::SIZE + self.comment.len()) as u64
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let comment_len = field_u16("archive comment length", self.comment.len())?;

        writer.write_u32::<LittleEndian>(Self::SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.disk_number)?;
        writer.write_u16::<LittleEndian>(self.disk_with_cd)?;
        writer.write_u16::<LittleEndian>(self.disk_entries)?;
        writer.write_u16::<LittleEndian>(self.total_entries)?;
        writer.write_u32::<LittleEndian>(self.cd_size)?;
        writer.write_u32::<LittleEndian>(self.cd_offset)?;
        writer.write_u16::<LittleEndian>(comment_len)?;
        writer.write_all(&self.comment)?;
        Ok(())
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        read_fixed(reader, &mut buf, "end of central directory")?;

        let mut cursor = Cursor::new(&buf[..]);
        check_signature(
            cursor.read_u32::<LittleEndian>()?,
            Self::SIGNATURE,
            "end of central directory",
        )?;

        let disk_number = cursor.read_u16::<LittleEndian>()?;
        let disk_with_cd = cursor.read_u16::<LittleEndian>()?;
        let disk_entries = cursor.read_u16::<LittleEndian>()?;
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let cd_size = cursor.read_u32::<LittleEndian>()?;
        let cd_offset = cursor.read_u32::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;
        let comment = read_var(reader, comment_len, "end of central directory")?;

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }
}

/// Pack a timestamp into DOS `(time, date)` fields, in local time.
///
/// Values outside the representable 1980..=2107 range are clamped.
pub fn to_dos_datetime(time: SystemTime) -> (u16, u16) {
    let local: DateTime<Local> = time.into();
    let (year, month, day, hour, minute, second) = match local.year() {
        y if y < 1980 => (1980, 1, 1, 0, 0, 0),
        y if y > 2107 => (2107, 12, 31, 23, 59, 58),
        y => (
            y as u32,
            local.month(),
            local.day(),
            local.hour(),
            local.minute(),
            local.second(),
        ),
    };
    let dos_time = (hour << 11) | (minute << 5) | (second / 2);
    let dos_date = ((year - 1980) << 9) | (month << 5) | day;
    (dos_time as u16, dos_date as u16)
}

/// Unpack DOS `(time, date)` fields as local time.
///
/// A zero date, or fields that do not name a real calendar instant,
/// decode to the current time. A zero time alone is midnight.
pub fn from_dos_datetime(time: u16, date: u16) -> SystemTime {
    if date == 0 {
        return SystemTime::now();
    }
    let year = 1980 + ((date >> 9) & 0x7F) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(SystemTime::from)
        .unwrap_or_else(SystemTime::now)
}
